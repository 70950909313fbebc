//! Core parser infrastructure: token cursor, error reporting, helpers.

use karel_lexer::token::{Token, TokenKind};
use karel_types::ast::{Ident, Module};
use karel_types::{ErrorCode, KarelError, SourceFile, Span};

/// Deepest nesting of blocks or parenthesised expressions accepted.
pub const MAX_NESTING_DEPTH: u32 = 100;

/// Result of one parse step.
pub(crate) type PResult<T> = Result<T, KarelError>;

/// Result of parsing a whole program.
pub type ParseResult = Result<Module, KarelError>;

/// The Karel parser.
///
/// Consumes a token stream produced by the lexer and builds a syntax tree
/// covering the full Python grammar. Stops at the first error.
pub struct Parser<'src> {
    /// The token stream. Never empty: the lexer always ends it with `Eof`.
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    /// Source file for error context.
    source_file: &'src SourceFile,
    /// Current block / bracket nesting depth.
    pub(crate) depth: u32,
}

impl<'src> Parser<'src> {
    /// Create a new parser from a token stream and source file.
    pub fn new(mut tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        if !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or(Span::point(1, 1));
            tokens.push(Token::new(TokenKind::Eof, span));
        }
        Self {
            tokens,
            pos: 0,
            source_file,
            depth: 0,
        }
    }

    /// Parse the whole token stream into a [`Module`].
    pub fn parse(mut self) -> ParseResult {
        let mut body = Vec::new();
        while !self.at_end() {
            body.extend(self.parse_statement()?);
        }
        let end = self.current_span();
        Ok(Module {
            body,
            span: Span::new(1, 1, end.end_line, end.end_col),
        })
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    /// Returns the kind of the current token.
    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Returns the span of the last consumed token that is not layout.
    ///
    /// `Dedent` tokens sit at the start of the following line, so a block's
    /// span ends at its last real token instead.
    pub(crate) fn previous_span(&self) -> Span {
        self.tokens[..self.pos.min(self.tokens.len())]
            .iter()
            .rev()
            .find(|t| {
                !matches!(
                    t.kind,
                    TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                )
            })
            .map(|t| t.span)
            .unwrap_or(Span::point(1, 1))
    }

    /// Returns the span of the current token.
    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Returns `true` if the current token is `Eof`.
    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Check if the current token matches the given kind exactly.
    pub(crate) fn check_exact(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check_exact(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns the token if matched.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> PResult<Token> {
        if self.check_exact(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{expected}'")))
        }
    }

    /// Expect an identifier token.
    pub(crate) fn expect_name(&mut self) -> PResult<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                let span = self.advance().span;
                Ok(Ident::new(name, span))
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    /// Expect the end of a simple statement line.
    pub(crate) fn expect_newline(&mut self) -> PResult<()> {
        if self.eat(&TokenKind::Newline) || self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of line"))
        }
    }

    // ── Nesting ───────────────────────────────────────────────────────────────

    /// Run `f` one nesting level deeper, failing past [`MAX_NESTING_DEPTH`].
    pub(crate) fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_at_current(
                ErrorCode::NESTING_TOO_DEEP,
                "too many nested blocks or brackets",
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Count one more link of an operator or trailer chain against the
    /// nesting budget. The caller restores `depth` when the chain ends.
    pub(crate) fn chain_link(&mut self) -> PResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_at_current(
                ErrorCode::NESTING_TOO_DEEP,
                "expression too complex: split it into smaller parts",
            ));
        }
        self.depth += 1;
        Ok(())
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Build an "expected X" error at the current token.
    pub(crate) fn unexpected(&self, expected: &str) -> KarelError {
        let found = self.peek_kind();
        let code = if self.at_end() {
            ErrorCode::UNEXPECTED_EOF
        } else if matches!(found, TokenKind::Indent | TokenKind::Dedent) {
            ErrorCode::INDENTATION
        } else {
            ErrorCode::UNEXPECTED_TOKEN
        };
        self.error_at_current(code, format!("invalid syntax: expected {expected}, found '{found}'"))
    }

    /// Build an error at the current token position.
    pub(crate) fn error_at_current(&self, code: ErrorCode, message: impl Into<String>) -> KarelError {
        self.error_at(code, message, self.current_span())
    }

    /// Build an error at a specific span.
    pub(crate) fn error_at(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> KarelError {
        let source_line = self.source_file.line(span.start_line).unwrap_or("");
        KarelError::new(code, message, span, source_line)
    }
}
