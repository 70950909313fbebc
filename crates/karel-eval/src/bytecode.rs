//! Bytecode instruction set.
//!
//! Stack-based: operands are popped from the stack, results pushed back.
//! Every instruction carries the span of the syntax node it came from, so a
//! fault or a robot command always reports its own source line.

use std::collections::HashSet;
use std::rc::Rc;

use karel_types::ast::{BinOp, CmpOp, UnaryOp};
use karel_types::{SourceFile, Span};

use crate::value::Value;

/// Bytecode instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // === Loads and stores ===
    /// Push a literal (index into the chunk's constants)
    Const(usize),
    /// Push the value bound to a name (index into the chunk's names)
    Load(usize),
    /// Pop and bind to a name in the current scope
    Store(usize),

    // === Stack manipulation ===
    /// Pop and discard top of stack
    Pop,
    /// Duplicate top of stack
    Dup,
    /// Swap the top two values
    Rot2,
    /// Move top of stack under the next two (`a b c` → `c a b`)
    Rot3,

    // === Operators ===
    /// Pop a, push `op a`
    Unary(UnaryOp),
    /// Pop b, pop a, push `a op b`
    Binary(BinOp),
    /// Pop b, pop a, push `a op b` as a bool
    Compare(CmpOp),

    // === Control flow ===
    /// Jump to an absolute offset
    Jump(usize),
    /// Pop; jump if falsy
    JumpIfFalse(usize),
    /// Jump if top is falsy, else pop it (`and`)
    JumpIfFalseOrPop(usize),
    /// Jump if top is truthy, else pop it (`or`)
    JumpIfTrueOrPop(usize),

    // === Loops ===
    /// Advance the range counter on top of the stack and push its next
    /// value; when exhausted, pop the counter and jump to the offset.
    ForIter(usize),

    // === Functions ===
    /// Call with N arguments (pops N and the callee, pushes the result).
    /// Calling a robot command suspends the machine.
    Call(usize),
    /// Push a user function for the given chunk, closing over the current
    /// scope
    MakeFunction(usize),
    /// Pop the return value and leave the current frame
    Return,
}

/// One instruction and the source it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instr {
    pub op: Op,
    pub span: Span,
}

/// The code of the module body or of one function.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub name: Rc<str>,
    pub code: Vec<Instr>,
    pub constants: Vec<Value>,
    pub names: Vec<Rc<str>>,
}

impl Chunk {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            code: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Emit an instruction, returning its offset.
    pub fn emit(&mut self, op: Op, span: Span) -> usize {
        self.code.push(Instr { op, span });
        self.code.len() - 1
    }

    /// Current instruction offset (for jump targets).
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Add a name reference, returning its index
    pub fn add_name(&mut self, name: &str) -> usize {
        if let Some(idx) = self.names.iter().position(|n| &**n == name) {
            return idx;
        }
        self.names.push(name.into());
        self.names.len() - 1
    }

    /// Add a literal. Not de-duplicated: `1 == True` but they are
    /// different literals.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Point a previously emitted jump at `target`.
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        if let Some(instr) = self.code.get_mut(at) {
            match &mut instr.op {
                Op::Jump(t)
                | Op::JumpIfFalse(t)
                | Op::JumpIfFalseOrPop(t)
                | Op::JumpIfTrueOrPop(t)
                | Op::ForIter(t) => *t = target,
                other => debug_assert!(false, "patched non-jump instruction {other:?}"),
            }
        }
    }

    /// Point a jump at the current end of the chunk.
    pub fn patch_here(&mut self, at: usize) {
        let here = self.offset();
        self.patch_jump(at, here);
    }
}

/// A compiled program.
#[derive(Debug, Clone)]
pub struct Program {
    /// The module body and every function body.
    pub chunks: Vec<Chunk>,
    /// Index of the module body in `chunks`.
    pub main: usize,
    /// Every `def` name, for telling "not yet defined" from "unknown".
    pub user_functions: HashSet<String>,
    pub source: SourceFile,
}

impl Program {
    /// The source line of a span, for diagnostics.
    pub fn source_line(&self, span: Span) -> &str {
        self.source.line(span.start_line).unwrap_or("")
    }

    /// Total instructions across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.code.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
