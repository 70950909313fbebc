//! Resumable stack machine.
//!
//! The machine runs until the program calls a robot command, then suspends
//! and hands the command to its caller. The caller applies it to the world
//! and [`resume`](Machine::resume)s with the result. One suspension is one
//! controller tick, and nothing here touches the world.

use std::rc::Rc;

use karel_types::{ErrorCode, KarelError, Span};
use karel_world::Primitive;

use crate::bytecode::{Instr, Op, Program};
use crate::config::ExecutionConfig;
use crate::namespace::{Namespace, Scope};
use crate::value::{Closure, OpError, RangeIter, Value};

/// Why [`Machine::advance`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// The program called a robot command at `span`.
    Command { primitive: Primitive, span: Span },
    /// The program ran to its end.
    Finished,
}

#[derive(Debug)]
struct Frame {
    chunk: usize,
    ip: usize,
    scope: Rc<Scope>,
    /// Stack height when the frame was entered.
    stack_base: usize,
}

/// A program in mid-run.
#[derive(Debug)]
pub struct Machine {
    program: Program,
    namespace: Namespace,
    frames: Vec<Frame>,
    stack: Vec<Value>,
    /// The command the machine is suspended on, until resumed.
    pending: Option<(Primitive, Span)>,
    finished: bool,
    gas_per_tick: u64,
    max_call_depth: usize,
}

impl Machine {
    pub fn new(program: Program, config: &ExecutionConfig) -> Self {
        let namespace = Namespace::new();
        let main = Frame {
            chunk: program.main,
            ip: 0,
            scope: Rc::clone(namespace.globals()),
            stack_base: 0,
        };
        Self {
            program,
            namespace,
            frames: vec![main],
            stack: Vec::new(),
            pending: None,
            finished: false,
            gas_per_tick: config.gas_per_tick,
            max_call_depth: config.max_call_depth,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of active user function calls.
    pub fn call_depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    /// Finish the pending robot command with its result.
    pub fn resume(&mut self, result: Value) {
        if self.pending.take().is_some() {
            self.stack.push(result);
        }
    }

    /// Run to the next robot command or to the end of the program, spending
    /// at most one tick's gas. Suspended on a command that has not been
    /// resumed, it reports that command again.
    pub fn advance(&mut self) -> Result<Suspend, KarelError> {
        if let Some((primitive, span)) = self.pending {
            return Ok(Suspend::Command { primitive, span });
        }
        let mut gas = self.gas_per_tick;
        while !self.finished {
            let instr = self.fetch()?;
            if gas == 0 {
                return Err(self
                    .fault(
                        ErrorCode::GAS_EXHAUSTED,
                        "program ran too long without a robot command",
                        instr.span,
                    )
                    .with_suggestion("Check for a loop that never calls a robot command"));
            }
            gas -= 1;
            if let Some(suspend) = self.step(instr)? {
                return Ok(suspend);
            }
        }
        Ok(Suspend::Finished)
    }

    /// Drop everything the program bound in its globals.
    pub fn clear_namespace(&self) {
        self.namespace.clear_transient();
    }

    // ══════════════════════════════════════════════════════════════════════
    // Execution
    // ══════════════════════════════════════════════════════════════════════

    fn frame(&self) -> Result<&Frame, KarelError> {
        self.frames
            .last()
            .ok_or_else(|| self.internal("no active frame", Span::point(1, 1)))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, KarelError> {
        if self.frames.is_empty() {
            return Err(self.internal("no active frame", Span::point(1, 1)));
        }
        let last = self.frames.len() - 1;
        Ok(&mut self.frames[last])
    }

    /// The instruction at the current frame's pointer, advancing it.
    fn fetch(&mut self) -> Result<Instr, KarelError> {
        let frame = self.frame()?;
        let instr = self
            .program
            .chunks
            .get(frame.chunk)
            .and_then(|chunk| chunk.code.get(frame.ip))
            .copied();
        let Some(instr) = instr else {
            return Err(self.internal("instruction pointer out of bounds", Span::point(1, 1)));
        };
        self.frame_mut()?.ip += 1;
        Ok(instr)
    }

    fn step(&mut self, instr: Instr) -> Result<Option<Suspend>, KarelError> {
        let span = instr.span;
        match instr.op {
            Op::Const(idx) => {
                let chunk = self.frame()?.chunk;
                let value = self.program.chunks[chunk].constants.get(idx).cloned();
                match value {
                    Some(value) => self.stack.push(value),
                    None => return Err(self.internal("unknown constant index", span)),
                }
            }
            Op::Load(idx) => {
                let name = self.name(idx)?;
                let value = self.frame()?.scope.lookup(&name);
                match value {
                    Some(value) => self.stack.push(value),
                    None => return Err(self.unbound(&name, span)),
                }
            }
            Op::Store(idx) => {
                let name = self.name(idx)?;
                let value = self.pop(span)?;
                self.frame()?.scope.define(name, value);
            }

            Op::Pop => {
                self.pop(span)?;
            }
            Op::Dup => {
                let top = self.peek(span)?.clone();
                self.stack.push(top);
            }
            Op::Rot2 => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(self.internal("stack underflow", span));
                }
                self.stack.swap(len - 1, len - 2);
            }
            Op::Rot3 => {
                let len = self.stack.len();
                if len < 3 {
                    return Err(self.internal("stack underflow", span));
                }
                self.stack[len - 3..].rotate_right(1);
            }

            Op::Unary(op) => {
                let operand = self.pop(span)?;
                let result = Value::unary(op, &operand);
                self.push_result(result, span)?;
            }
            Op::Binary(op) => {
                let right = self.pop(span)?;
                let left = self.pop(span)?;
                let result = Value::binary(op, &left, &right);
                self.push_result(result, span)?;
            }
            Op::Compare(op) => {
                let right = self.pop(span)?;
                let left = self.pop(span)?;
                let result = Value::compare(op, &left, &right);
                self.push_result(result, span)?;
            }

            Op::Jump(target) => self.jump(target)?,
            Op::JumpIfFalse(target) => {
                if !self.pop(span)?.is_truthy() {
                    self.jump(target)?;
                }
            }
            Op::JumpIfFalseOrPop(target) => {
                if self.peek(span)?.is_truthy() {
                    self.pop(span)?;
                } else {
                    self.jump(target)?;
                }
            }
            Op::JumpIfTrueOrPop(target) => {
                if self.peek(span)?.is_truthy() {
                    self.jump(target)?;
                } else {
                    self.pop(span)?;
                }
            }

            Op::ForIter(exit) => {
                let next = match self.stack.last_mut() {
                    Some(Value::RangeIter(counter)) => counter.next(),
                    Some(other) => {
                        let message = format!("'{}' object is not iterable", other.type_name());
                        return Err(self.fault(ErrorCode::TYPE_MISMATCH, message, span));
                    }
                    None => return Err(self.internal("stack underflow", span)),
                };
                match next {
                    Some(n) => self.stack.push(Value::Int(n)),
                    None => {
                        self.pop(span)?;
                        self.jump(exit)?;
                    }
                }
            }

            Op::Call(argc) => return self.call(argc, span),
            Op::MakeFunction(chunk) => {
                let name = match self.program.chunks.get(chunk) {
                    Some(c) => Rc::clone(&c.name),
                    None => return Err(self.internal("unknown function chunk", span)),
                };
                let closure = Closure {
                    name,
                    chunk,
                    parent: Rc::downgrade(&self.frame()?.scope),
                };
                self.stack.push(Value::Function(Rc::new(closure)));
            }
            Op::Return => {
                let value = self.pop(span)?;
                let Some(frame) = self.frames.pop() else {
                    return Err(self.internal("return with no active frame", span));
                };
                self.stack.truncate(frame.stack_base);
                if self.frames.is_empty() {
                    self.finished = true;
                    return Ok(Some(Suspend::Finished));
                }
                self.stack.push(value);
            }
        }
        Ok(None)
    }

    fn call(&mut self, argc: usize, span: Span) -> Result<Option<Suspend>, KarelError> {
        if self.stack.len() < argc + 1 {
            return Err(self.internal("stack underflow", span));
        }
        let args = self.stack.split_off(self.stack.len() - argc);
        let callee = self.pop(span)?;
        match callee {
            Value::Primitive(primitive) => {
                self.expect_no_args(primitive.name(), argc, span)?;
                self.pending = Some((primitive, span));
                Ok(Some(Suspend::Command { primitive, span }))
            }
            Value::Range => {
                let counter = RangeIter::from_args(&args).map(Value::RangeIter);
                self.push_result(counter, span)?;
                Ok(None)
            }
            Value::Function(closure) => {
                self.expect_no_args(&closure.name, argc, span)?;
                if self.call_depth() >= self.max_call_depth {
                    return Err(self
                        .fault(
                            ErrorCode::RECURSION_LIMIT,
                            format!(
                                "maximum recursion depth exceeded calling '{}()'",
                                closure.name
                            ),
                            span,
                        )
                        .with_suggestion("Make sure recursive functions stop calling themselves"));
                }
                let parent = closure
                    .parent
                    .upgrade()
                    .unwrap_or_else(|| Rc::clone(self.namespace.globals()));
                self.frames.push(Frame {
                    chunk: closure.chunk,
                    ip: 0,
                    scope: Scope::child(parent),
                    stack_base: self.stack.len(),
                });
                Ok(None)
            }
            other => Err(self.fault(
                ErrorCode::TYPE_MISMATCH,
                format!("'{}' object is not callable", other.type_name()),
                span,
            )),
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn name(&self, idx: usize) -> Result<Rc<str>, KarelError> {
        let chunk = self.frame()?.chunk;
        self.program.chunks[chunk]
            .names
            .get(idx)
            .cloned()
            .ok_or_else(|| self.internal("unknown name index", Span::point(1, 1)))
    }

    fn jump(&mut self, target: usize) -> Result<(), KarelError> {
        self.frame_mut()?.ip = target;
        Ok(())
    }

    fn pop(&mut self, span: Span) -> Result<Value, KarelError> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => Err(self.internal("stack underflow", span)),
        }
    }

    fn peek(&self, span: Span) -> Result<&Value, KarelError> {
        self.stack
            .last()
            .ok_or_else(|| self.internal("stack underflow", span))
    }

    fn push_result(&mut self, result: Result<Value, OpError>, span: Span) -> Result<(), KarelError> {
        match result {
            Ok(value) => {
                self.stack.push(value);
                Ok(())
            }
            Err(err) => Err(self.fault(err.code, err.message, span)),
        }
    }

    fn expect_no_args(&self, name: &str, argc: usize, span: Span) -> Result<(), KarelError> {
        if argc == 0 {
            Ok(())
        } else {
            Err(self.fault(
                ErrorCode::TYPE_MISMATCH,
                format!("{name}() takes no arguments ({argc} given)"),
                span,
            ))
        }
    }

    fn unbound(&self, name: &str, span: Span) -> KarelError {
        if self.program.user_functions.contains(name) {
            self.fault(
                ErrorCode::CALLED_BEFORE_DEFINITION,
                format!("function '{name}' called before it was defined"),
                span,
            )
            .with_suggestion(format!("Move 'def {name}():' above its first use"))
        } else {
            self.fault(
                ErrorCode::UNDEFINED_NAME,
                format!("name '{name}' is not defined"),
                span,
            )
        }
    }

    fn fault(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> KarelError {
        KarelError::new(code, message, span, self.program.source_line(span))
    }

    fn internal(&self, what: &str, span: Span) -> KarelError {
        tracing::warn!(what, line = span.start_line, "machine invariant broken");
        self.fault(
            ErrorCode::UNSUPPORTED_CONSTRUCT,
            format!("internal error: {what}"),
            span,
        )
    }
}
