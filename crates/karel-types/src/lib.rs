//! Shared types for the Karel toolchain.
//!
//! This crate defines the syntax tree, source spans and the structured
//! diagnostic type used by every stage: lexer, parser, validator and
//! evaluator.

mod error;
mod span;
pub mod ast;

pub use error::{ErrorCategory, ErrorCode, KarelError};
pub use span::{SourceFile, Span};

/// Result type used throughout the Karel toolchain.
pub type Result<T> = std::result::Result<T, KarelError>;
