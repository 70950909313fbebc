//! Bytecode compiler.
//!
//! Compiles a validated [`Module`] to a [`Program`]. The compiler only knows
//! the constructs the validator accepts; anything else is refused with the
//! same fail-closed diagnostic instead of being given a meaning.

use std::collections::HashSet;

use karel_types::ast::*;
use karel_types::{ErrorCode, KarelError, SourceFile, Span};

use crate::bytecode::{Chunk, Op, Program};
use crate::value::Value;

type CResult<T = ()> = Result<T, KarelError>;

/// Name of the module-body chunk.
pub const MAIN_CHUNK: &str = "<module>";

/// Compile a validated module.
pub fn compile(module: &Module, source: &SourceFile) -> CResult<Program> {
    let mut compiler = Compiler::new(source);
    collect_defs(&module.body, &mut compiler.user_functions);

    let mut main = ChunkBuilder::new(MAIN_CHUNK);
    compiler.stmts(&mut main, &module.body)?;
    main.emit_implicit_return(module.span);

    let main_index = compiler.chunks.len();
    compiler.chunks.push(main.chunk);
    tracing::debug!(
        chunks = compiler.chunks.len(),
        functions = compiler.user_functions.len(),
        "compiled program"
    );
    Ok(Program {
        chunks: compiler.chunks,
        main: main_index,
        user_functions: compiler.user_functions,
        source: source.clone(),
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════════════

struct Compiler<'a> {
    source: &'a SourceFile,
    /// Finished function chunks; the module chunk is appended last.
    chunks: Vec<Chunk>,
    user_functions: HashSet<String>,
}

/// A chunk under construction plus its open loops.
struct ChunkBuilder {
    chunk: Chunk,
    loops: Vec<LoopContext>,
}

struct LoopContext {
    /// Where `continue` jumps.
    head: usize,
    /// `break` jumps to patch once the loop's end is known.
    breaks: Vec<usize>,
    /// A `for` loop keeps its counter on the stack; `break` must drop it.
    holds_counter: bool,
}

impl ChunkBuilder {
    fn new(name: &str) -> Self {
        Self {
            chunk: Chunk::new(name),
            loops: Vec::new(),
        }
    }

    fn emit(&mut self, op: Op, span: Span) -> usize {
        self.chunk.emit(op, span)
    }

    fn emit_const(&mut self, value: Value, span: Span) {
        let idx = self.chunk.add_constant(value);
        self.emit(Op::Const(idx), span);
    }

    fn emit_implicit_return(&mut self, span: Span) {
        self.emit_const(Value::None, span);
        self.emit(Op::Return, span);
    }
}

impl<'a> Compiler<'a> {
    fn new(source: &'a SourceFile) -> Self {
        Self {
            source,
            chunks: Vec::new(),
            user_functions: HashSet::new(),
        }
    }

    fn unsupported(&self, what: &str, span: Span) -> KarelError {
        let line = self.source.line(span.start_line).unwrap_or("");
        KarelError::new(
            ErrorCode::UNSUPPORTED_CONSTRUCT,
            format!("{what} cannot be executed in a Karel program"),
            span,
            line,
        )
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    fn stmts(&mut self, b: &mut ChunkBuilder, body: &[Stmt]) -> CResult {
        body.iter().try_for_each(|stmt| self.stmt(b, stmt))
    }

    fn stmt(&mut self, b: &mut ChunkBuilder, stmt: &Stmt) -> CResult {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(b, expr)?;
                b.emit(Op::Pop, span);
                Ok(())
            }
            StmtKind::Pass => Ok(()),
            StmtKind::If(s) => self.if_stmt(b, s, span),
            StmtKind::While(s) => self.while_stmt(b, s, span),
            StmtKind::For(s) => self.for_stmt(b, s, span),
            StmtKind::FunctionDef(def) => self.function_def(b, def, span),
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.expr(b, expr)?,
                    None => b.emit_const(Value::None, span),
                }
                b.emit(Op::Return, span);
                Ok(())
            }
            StmtKind::Break => {
                let Some(ctx) = b.loops.last() else {
                    return Err(self.unsupported("'break' outside a loop", span));
                };
                if ctx.holds_counter {
                    b.emit(Op::Pop, span);
                }
                let jump = b.emit(Op::Jump(0), span);
                if let Some(ctx) = b.loops.last_mut() {
                    ctx.breaks.push(jump);
                }
                Ok(())
            }
            StmtKind::Continue => {
                let Some(head) = b.loops.last().map(|ctx| ctx.head) else {
                    return Err(self.unsupported("'continue' outside a loop", span));
                };
                b.emit(Op::Jump(head), span);
                Ok(())
            }
            _ => Err(self.unsupported("This statement", span)),
        }
    }

    fn if_stmt(&mut self, b: &mut ChunkBuilder, s: &IfStmt, span: Span) -> CResult {
        self.expr(b, &s.test)?;
        let to_else = b.emit(Op::JumpIfFalse(0), s.test.span);
        self.stmts(b, &s.body)?;
        if s.orelse.is_empty() {
            b.chunk.patch_here(to_else);
        } else {
            let to_end = b.emit(Op::Jump(0), span);
            b.chunk.patch_here(to_else);
            self.stmts(b, &s.orelse)?;
            b.chunk.patch_here(to_end);
        }
        Ok(())
    }

    fn while_stmt(&mut self, b: &mut ChunkBuilder, s: &WhileStmt, span: Span) -> CResult {
        if let Some(first) = s.orelse.first() {
            return Err(self.unsupported("A loop 'else' clause", first.span));
        }
        let head = b.chunk.offset();
        self.expr(b, &s.test)?;
        let exit = b.emit(Op::JumpIfFalse(0), s.test.span);
        self.loop_body(b, &s.body, head, false, span)?;
        b.chunk.patch_here(exit);
        self.close_loop(b);
        Ok(())
    }

    fn for_stmt(&mut self, b: &mut ChunkBuilder, s: &ForStmt, span: Span) -> CResult {
        if let Some(first) = s.orelse.first() {
            return Err(self.unsupported("A loop 'else' clause", first.span));
        }
        let Some(target) = s.target.as_name() else {
            return Err(self.unsupported("This loop target", s.target.span));
        };
        self.expr(b, &s.iter)?;
        let head = b.emit(Op::ForIter(0), s.iter.span);
        let name = b.chunk.add_name(target);
        b.emit(Op::Store(name), s.target.span);
        self.loop_body(b, &s.body, head, true, span)?;
        b.chunk.patch_here(head);
        self.close_loop(b);
        Ok(())
    }

    /// Compile a loop body that jumps back to `head`.
    fn loop_body(
        &mut self,
        b: &mut ChunkBuilder,
        body: &[Stmt],
        head: usize,
        holds_counter: bool,
        span: Span,
    ) -> CResult {
        b.loops.push(LoopContext {
            head,
            breaks: Vec::new(),
            holds_counter,
        });
        self.stmts(b, body)?;
        b.emit(Op::Jump(head), span);
        Ok(())
    }

    /// Point every `break` of the innermost loop at the current offset.
    fn close_loop(&mut self, b: &mut ChunkBuilder) {
        if let Some(ctx) = b.loops.pop() {
            for jump in ctx.breaks {
                b.chunk.patch_here(jump);
            }
        }
    }

    fn function_def(&mut self, b: &mut ChunkBuilder, def: &FunctionDef, span: Span) -> CResult {
        if !def.params.is_empty() {
            return Err(self.unsupported("A function with parameters", span));
        }
        let mut body = ChunkBuilder::new(&def.name.name);
        self.stmts(&mut body, &def.body)?;
        body.emit_implicit_return(span);

        let index = self.chunks.len();
        self.chunks.push(body.chunk);
        b.emit(Op::MakeFunction(index), span);
        let name = b.chunk.add_name(&def.name.name);
        b.emit(Op::Store(name), def.name.span);
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    fn expr(&mut self, b: &mut ChunkBuilder, expr: &Expr) -> CResult {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Constant(constant) => {
                let value = match constant {
                    Constant::None => Value::None,
                    Constant::Bool(v) => Value::Bool(*v),
                    Constant::Int(n) => Value::Int(*n),
                    Constant::Str(s) => Value::Str(s.as_str().into()),
                    other => {
                        return Err(self.unsupported(
                            &format!("A {} literal", other.type_name()),
                            span,
                        ))
                    }
                };
                b.emit_const(value, span);
                Ok(())
            }
            ExprKind::Name(name) => {
                let idx = b.chunk.add_name(name);
                b.emit(Op::Load(idx), span);
                Ok(())
            }
            ExprKind::BoolOp { op, values } => {
                let mut jumps = Vec::new();
                for (i, value) in values.iter().enumerate() {
                    self.expr(b, value)?;
                    if i + 1 < values.len() {
                        let jump = match op {
                            BoolOp::And => Op::JumpIfFalseOrPop(0),
                            BoolOp::Or => Op::JumpIfTrueOrPop(0),
                        };
                        jumps.push(b.emit(jump, span));
                    }
                }
                for jump in jumps {
                    b.chunk.patch_here(jump);
                }
                Ok(())
            }
            ExprKind::UnaryOp { op, operand } => {
                self.expr(b, operand)?;
                b.emit(Op::Unary(*op), span);
                Ok(())
            }
            ExprKind::BinOp { left, op, right } => {
                self.expr(b, left)?;
                self.expr(b, right)?;
                b.emit(Op::Binary(*op), span);
                Ok(())
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => self.compare(b, left, ops, comparators, span),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                if let Some(keyword) = keywords.first() {
                    return Err(self.unsupported("A keyword argument", keyword.span));
                }
                self.expr(b, func)?;
                for arg in args {
                    self.expr(b, arg)?;
                }
                b.emit(Op::Call(args.len()), span);
                Ok(())
            }
            _ => Err(self.unsupported("This expression", span)),
        }
    }

    /// `a < b < c` evaluates `b` once and stops at the first false link.
    fn compare(
        &mut self,
        b: &mut ChunkBuilder,
        left: &Expr,
        ops: &[CmpOp],
        comparators: &[Expr],
        span: Span,
    ) -> CResult {
        self.expr(b, left)?;
        let last = ops.len().saturating_sub(1);
        let mut cleanups = Vec::new();
        for (i, (op, right)) in ops.iter().zip(comparators).enumerate() {
            self.expr(b, right)?;
            if i < last {
                b.emit(Op::Dup, span);
                b.emit(Op::Rot3, span);
                b.emit(Op::Compare(*op), span);
                cleanups.push(b.emit(Op::JumpIfFalseOrPop(0), span));
            } else {
                b.emit(Op::Compare(*op), span);
            }
        }
        if !cleanups.is_empty() {
            let to_end = b.emit(Op::Jump(0), span);
            for jump in cleanups {
                b.chunk.patch_here(jump);
            }
            // Drop the leftover operand under the false result.
            b.emit(Op::Rot2, span);
            b.emit(Op::Pop, span);
            b.chunk.patch_here(to_end);
        }
        Ok(())
    }
}

/// Every `def` name at any depth.
fn collect_defs(body: &[Stmt], names: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                names.insert(def.name.name.clone());
                collect_defs(&def.body, names);
            }
            StmtKind::If(s) => {
                collect_defs(&s.body, names);
                collect_defs(&s.orelse, names);
            }
            StmtKind::While(s) => collect_defs(&s.body, names),
            StmtKind::For(s) => collect_defs(&s.body, names),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_src(source: &str) -> Program {
        let file = SourceFile::new(source);
        let module = karel_validator::analyze(&file, &Default::default()).unwrap();
        compile(&module, &file).unwrap()
    }

    fn main_ops(program: &Program) -> Vec<Op> {
        program.chunks[program.main]
            .code
            .iter()
            .map(|i| i.op)
            .collect()
    }

    #[test]
    fn test_call_statement() {
        let program = compile_src("move()");
        assert_eq!(
            main_ops(&program),
            vec![
                Op::Load(0),
                Op::Call(0),
                Op::Pop,
                Op::Const(0),
                Op::Return
            ]
        );
    }

    #[test]
    fn test_every_instruction_has_its_line() {
        let program = compile_src("move()\n\nturn_left()\n");
        let lines: Vec<u32> = program.chunks[program.main]
            .code
            .iter()
            .filter(|i| matches!(i.op, Op::Call(_)))
            .map(|i| i.span.start_line)
            .collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn test_function_gets_own_chunk() {
        let program = compile_src("def turn_right():\n    turn_left()\n    turn_left()\n    turn_left()\nturn_right()\n");
        assert_eq!(program.chunks.len(), 2);
        assert_eq!(&*program.chunks[0].name, "turn_right");
        assert_eq!(&*program.chunks[program.main].name, MAIN_CHUNK);
        assert!(program.user_functions.contains("turn_right"));
        assert!(main_ops(&program).contains(&Op::MakeFunction(0)));
    }

    #[test]
    fn test_break_in_for_drops_counter() {
        let program = compile_src("for i in range(3):\n    break\n");
        let ops = main_ops(&program);
        let brk = ops
            .iter()
            .position(|op| *op == Op::Pop)
            .expect("break pops the counter");
        assert!(matches!(ops[brk + 1], Op::Jump(_)));
    }

    #[test]
    fn test_jumps_are_in_bounds() {
        let program = compile_src(
            "while front_is_clear():\n    if beepers_present() and not facing_north():\n        continue\n    move()\nfor i in range(1, 2):\n    if 0 < i < 5:\n        break\n",
        );
        for chunk in &program.chunks {
            for instr in &chunk.code {
                if let Op::Jump(t)
                | Op::JumpIfFalse(t)
                | Op::JumpIfFalseOrPop(t)
                | Op::JumpIfTrueOrPop(t)
                | Op::ForIter(t) = instr.op
                {
                    assert!(t <= chunk.code.len(), "jump {t} out of bounds");
                }
            }
        }
    }

    #[test]
    fn test_unvalidated_construct_refused() {
        let file = SourceFile::new("x = 1");
        let module = karel_parser::parse(&file).unwrap();
        let err = compile(&module, &file).unwrap_err();
        assert_eq!(err.code, ErrorCode::UNSUPPORTED_CONSTRUCT);
        assert_eq!(err.line(), 1);
    }
}
