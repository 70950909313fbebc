use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// The source failed to tokenize or parse.
    Syntax,
    /// The source parsed but uses a construct or call outside the allowlist.
    Validation,
    /// A robot action was refused by the world.
    Execution,
    /// The program misbehaved at runtime (unbound name, limits, arithmetic).
    Runtime,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Validation => write!(f, "validation"),
            Self::Execution => write!(f, "execution"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

/// Numeric error code (E100–E499).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const INDENTATION: Self = Self(102);
    pub const UNEXPECTED_EOF: Self = Self(103);
    pub const INVALID_NUMBER: Self = Self(104);
    pub const INVALID_CHARACTER: Self = Self(105);
    pub const NESTING_TOO_DEEP: Self = Self(106);

    // ── Validation errors (E200–E299) ──
    pub const IMPORT_NOT_ALLOWED: Self = Self(200);
    pub const CLASS_NOT_ALLOWED: Self = Self(201);
    pub const PARAMETERS_NOT_ALLOWED: Self = Self(202);
    pub const ASSIGNMENT_NOT_ALLOWED: Self = Self(203);
    pub const CALL_NOT_ALLOWED: Self = Self(204);
    pub const COLLECTION_NOT_ALLOWED: Self = Self(205);
    pub const SUBSCRIPT_NOT_ALLOWED: Self = Self(206);
    pub const LAMBDA_NOT_ALLOWED: Self = Self(207);
    pub const EXCEPTION_HANDLING_NOT_ALLOWED: Self = Self(208);
    pub const WITH_NOT_ALLOWED: Self = Self(209);
    pub const ASYNC_NOT_ALLOWED: Self = Self(210);
    pub const SCOPE_DECLARATION_NOT_ALLOWED: Self = Self(211);
    pub const YIELD_NOT_ALLOWED: Self = Self(212);
    pub const DELETE_NOT_ALLOWED: Self = Self(213);
    pub const DUPLICATE_FUNCTION: Self = Self(214);
    pub const RESERVED_NAME: Self = Self(215);
    pub const WRONG_ARG_COUNT: Self = Self(216);
    pub const ATTRIBUTE_NOT_ALLOWED: Self = Self(217);
    pub const DECORATOR_NOT_ALLOWED: Self = Self(218);
    pub const LOOP_NOT_ALLOWED: Self = Self(219);
    pub const COMMAND_NOT_AVAILABLE: Self = Self(220);
    pub const UNSUPPORTED_CONSTRUCT: Self = Self(299);

    // ── Execution faults (E300–E399) ──
    pub const WALL_COLLISION: Self = Self(300);
    pub const BOUNDARY_VIOLATION: Self = Self(301);
    pub const NO_BEEPER_PRESENT: Self = Self(302);
    pub const BAG_EMPTY: Self = Self(303);

    // ── Runtime faults (E400–E499) ──
    pub const UNDEFINED_NAME: Self = Self(400);
    pub const CALLED_BEFORE_DEFINITION: Self = Self(401);
    pub const ARITHMETIC: Self = Self(402);
    pub const TYPE_MISMATCH: Self = Self(403);
    pub const GAS_EXHAUSTED: Self = Self(410);
    pub const RECURSION_LIMIT: Self = Self(411);
    pub const STEP_LIMIT: Self = Self(412);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Syntax,
            200..=299 => ErrorCategory::Validation,
            300..=399 => ErrorCategory::Execution,
            _ => ErrorCategory::Runtime,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured diagnostic, produced by every stage from lexing to execution.
///
/// Front ends render these directly; they never parse the message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{span}: {code} [{category}] {message}")]
pub struct KarelError {
    /// Error code (e.g., E203).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable message shown to the student.
    pub message: String,
    /// Source location.
    #[serde(flatten)]
    pub span: Span,
    /// The exact source line for context.
    pub source_line: String,
    /// Optional hint for fixing the problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl KarelError {
    /// Create a new error.
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// The 1-based line the error is reported on.
    pub fn line(&self) -> u32 {
        self.span.start_line
    }
}
