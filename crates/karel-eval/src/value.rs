//! Runtime values and the operators over them.
//!
//! Karel programs cannot build data, so the value space is small: the
//! literals a program may write, the callables it may call, and the counter
//! a `for` loop walks.

use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use karel_types::ast::{BinOp, CmpOp, UnaryOp};
use karel_types::ErrorCode;
use karel_world::Primitive;

use crate::namespace::Scope;

/// A value on the machine's stack or bound to a name.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    /// One of the 22 robot commands.
    Primitive(Primitive),
    /// The counting builtin used by `for` loops.
    Range,
    /// A user function, bound when its `def` executes.
    Function(Rc<Closure>),
    /// The counter of a running `for` loop.
    RangeIter(RangeIter),
}

/// A user function: compiled body plus the scope its `def` ran in.
///
/// The defining scope is held weakly. A closure can only be reached by
/// calling it by name, and the validator forbids naming it any other way,
/// so it never outlives the scope it was defined in.
#[derive(Debug)]
pub struct Closure {
    pub name: Rc<str>,
    pub chunk: usize,
    pub(crate) parent: Weak<Scope>,
}

/// Python `range` semantics over `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeIter {
    next: i64,
    stop: i64,
    step: i64,
}

impl RangeIter {
    /// Build from one to three integer arguments.
    pub fn from_args(args: &[Value]) -> Result<Self, OpError> {
        let ints = args
            .iter()
            .map(|arg| {
                arg.as_int().ok_or_else(|| {
                    OpError::type_mismatch(format!(
                        "'{}' object cannot be interpreted as an integer",
                        arg.type_name()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => {
                return Err(OpError::type_mismatch(format!(
                    "range expected 1 to 3 arguments, got {}",
                    args.len()
                )))
            }
        };
        if step == 0 {
            return Err(OpError::new(
                ErrorCode::ARITHMETIC,
                "range() arg 3 must not be zero",
            ));
        }
        Ok(Self {
            next: start,
            stop,
            step,
        })
    }
}

impl Iterator for RangeIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let more = if self.step > 0 {
            self.next < self.stop
        } else {
            self.next > self.stop
        };
        if !more {
            return None;
        }
        let current = self.next;
        // On overflow the range is over: park the counter on its bound.
        self.next = current.checked_add(self.step).unwrap_or(self.stop);
        Some(current)
    }
}

/// A failed operation, before the machine attaches a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpError {
    pub code: ErrorCode,
    pub message: String,
}

impl OpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TYPE_MISMATCH, message)
    }

    fn overflow() -> Self {
        Self::new(ErrorCode::ARITHMETIC, "integer overflow")
    }

    fn zero_division() -> Self {
        Self::new(ErrorCode::ARITHMETIC, "integer division or modulo by zero")
    }
}

pub type OpResult = Result<Value, OpError>;

impl Value {
    /// Python's name for the value's type, used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Primitive(_) | Value::Range => "builtin_function_or_method",
            Value::Function(_) => "function",
            Value::RangeIter(_) => "range_iterator",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Primitive(_) | Value::Range | Value::Function(_) => true,
            Value::RangeIter(_) => true,
        }
    }

    /// Integer view: `bool` counts as `0`/`1`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    // ── Operators ──────────────────────────────────────────────────────

    pub fn unary(op: UnaryOp, operand: &Value) -> OpResult {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
            UnaryOp::USub => match operand.as_int() {
                Some(n) => n.checked_neg().map(Value::Int).ok_or_else(OpError::overflow),
                None => Err(bad_unary("-", operand)),
            },
            UnaryOp::UAdd => match operand.as_int() {
                Some(n) => Ok(Value::Int(n)),
                None => Err(bad_unary("+", operand)),
            },
            UnaryOp::Invert => Err(bad_unary("~", operand)),
        }
    }

    pub fn binary(op: BinOp, left: &Value, right: &Value) -> OpResult {
        if let (BinOp::Add, Value::Str(a), Value::Str(b)) = (op, left, right) {
            return Ok(Value::Str(format!("{a}{b}").into()));
        }
        let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
            return Err(bad_operands(op, left, right));
        };
        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mult => a.checked_mul(b),
            BinOp::FloorDiv => return floor_div(a, b),
            BinOp::Mod => return floor_mod(a, b),
            _ => return Err(bad_operands(op, left, right)),
        };
        result.map(Value::Int).ok_or_else(OpError::overflow)
    }

    pub fn compare(op: CmpOp, left: &Value, right: &Value) -> OpResult {
        let result = match op {
            CmpOp::Eq => left == right,
            CmpOp::NotEq => left != right,
            CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
                let ordering = order(left, right).ok_or_else(|| {
                    OpError::type_mismatch(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.as_str(),
                        left.type_name(),
                        right.type_name()
                    ))
                })?;
                match op {
                    CmpOp::Lt => ordering == Ordering::Less,
                    CmpOp::LtE => ordering != Ordering::Greater,
                    CmpOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }
            }
            CmpOp::Is | CmpOp::IsNot | CmpOp::In | CmpOp::NotIn => {
                return Err(OpError::type_mismatch(format!(
                    "operator '{}' is not supported",
                    op.as_str()
                )))
            }
        };
        Ok(Value::Bool(result))
    }
}

fn floor_div(a: i64, b: i64) -> OpResult {
    if b == 0 {
        return Err(OpError::zero_division());
    }
    let q = a.checked_div(b).ok_or_else(OpError::overflow)?;
    let adjust = a % b != 0 && ((a < 0) != (b < 0));
    Ok(Value::Int(if adjust { q - 1 } else { q }))
}

fn floor_mod(a: i64, b: i64) -> OpResult {
    if b == 0 {
        return Err(OpError::zero_division());
    }
    // i64::MIN % -1 overflows in Rust; the Python answer is 0.
    let r = a.checked_rem(b).unwrap_or(0);
    Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => Some(left.as_int()?.cmp(&right.as_int()?)),
    }
}

fn bad_unary(symbol: &str, operand: &Value) -> OpError {
    OpError::type_mismatch(format!(
        "bad operand type for unary {symbol}: '{}'",
        operand.type_name()
    ))
}

fn bad_operands(op: BinOp, left: &Value, right: &Value) -> OpError {
    OpError::type_mismatch(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.as_str(),
        left.type_name(),
        right.type_name()
    ))
}

/// Python `==`: numbers compare by value across `int`/`bool`, callables by
/// identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Range, Value::Range) => true,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::RangeIter(a), Value::RangeIter(b)) => a == b,
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Primitive(p) => write!(f, "<built-in function {}>", p.name()),
            Value::Range => write!(f, "<class 'range'>"),
            Value::Function(c) => write!(f, "<function {}>", c.name),
            Value::RangeIter(_) => write!(f, "<range_iterator>"),
        }
    }
}
