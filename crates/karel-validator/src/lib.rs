//! Karel validator: static allowlist check of a student program.
//!
//! The source is lexed and parsed, never executed. A program is accepted only
//! if every statement, expression and call in it is on the allowlist; the
//! first violation is reported with its line.
//!
//! ```
//! let ok = karel_validator::validate("move()\nturn_left()\n");
//! assert!(ok.valid);
//!
//! let bad = karel_validator::validate("x = 5");
//! assert!(!bad.valid);
//! assert_eq!(bad.line, Some(1));
//! ```

pub mod validator;

use karel_types::ast::Module;
use karel_types::{KarelError, SourceFile};
use serde::{Deserialize, Serialize};

pub use validator::{Validator, RANGE};

/// Per-exercise restrictions on the call set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Primitives the exercise exposes. `None` means all 22.
    #[serde(default)]
    pub allowed_commands: Option<Vec<String>>,
}

impl ValidationOptions {
    /// Restrict the program to the given primitives.
    pub fn only<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_commands: Some(commands.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether a primitive may be called under these options.
    pub fn allows(&self, primitive: &str) -> bool {
        match &self.allowed_commands {
            Some(commands) => commands.iter().any(|c| c == primitive),
            None => true,
        }
    }

    pub(crate) fn available_hint(&self) -> String {
        match &self.allowed_commands {
            Some(commands) if !commands.is_empty() => {
                format!("Available commands: {}", commands.join(", "))
            }
            _ => "No commands are available in this exercise".to_string(),
        }
    }
}

/// The outcome of validating one program.
///
/// Serialises to `{"valid": true}` or
/// `{"valid": false, "error": "...", "line": 3, "diagnostic": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<KarelError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
            line: None,
            diagnostic: None,
        }
    }

    pub fn rejected(error: KarelError) -> Self {
        Self {
            valid: false,
            error: Some(error.message.clone()),
            line: Some(error.line()),
            diagnostic: Some(error),
        }
    }
}

impl From<Result<Module, KarelError>> for ValidationResult {
    fn from(result: Result<Module, KarelError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(error) => Self::rejected(error),
        }
    }
}

/// Validate `source` with every primitive available.
pub fn validate(source: &str) -> ValidationResult {
    validate_with(source, &ValidationOptions::default())
}

/// Validate `source` under per-exercise options.
pub fn validate_with(source: &str, options: &ValidationOptions) -> ValidationResult {
    analyze(&SourceFile::new(source), options).into()
}

/// Parse and validate, returning the tree of an accepted program.
///
/// The evaluator compiles from this tree, so a program is never parsed
/// twice per run.
pub fn analyze(source: &SourceFile, options: &ValidationOptions) -> Result<Module, KarelError> {
    let module = karel_parser::parse(source).map_err(|err| {
        tracing::debug!(code = %err.code, line = err.line(), "syntax error: {}", err.message);
        err
    })?;
    Validator::new(source, options).check(&module).map_err(|err| {
        tracing::debug!(code = %err.code, line = err.line(), "program rejected: {}", err.message);
        err
    })?;
    Ok(module)
}
