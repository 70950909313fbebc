//! Karel parser: converts a token stream into a syntax tree.

mod parse_expr;
mod parse_stmt;
mod parser;

pub use parser::{ParseResult, Parser, MAX_NESTING_DEPTH};

use karel_lexer::Lexer;
use karel_types::SourceFile;

/// Lex and parse a whole program.
///
/// Returns the first syntax error encountered, from either stage.
pub fn parse(source_file: &SourceFile) -> ParseResult {
    let tokens = Lexer::new(source_file).lex()?;
    Parser::new(tokens, source_file).parse()
}
