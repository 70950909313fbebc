//! Core lexer: converts Python-syntax source text to a token stream.
//!
//! Features:
//! - Every Python 3 keyword, operator and delimiter
//! - Indentation tracking with `Indent`/`Dedent` tokens (tabs advance to
//!   the next multiple of 8)
//! - Implicit line joining inside brackets and explicit `\` continuation
//! - Single, double and triple quoted strings with `r`, `b`, `u`, `f` prefixes
//! - Decimal, hex, octal and binary integers with `_` separators; floats
//! - `#` comments stripped
//! - Fail-fast: the first lexical error is returned with its line

use karel_types::{ErrorCode, KarelError, SourceFile, Span};

use crate::token::{Token, TokenKind};

/// Result of lexing: the token stream, or the first error encountered.
pub type LexResult = Result<Vec<Token>, KarelError>;

/// Width a tab advances the indentation column to a multiple of.
const TAB_SIZE: u32 = 8;

/// The Karel lexer.
///
/// The token stream it produces always ends with [`TokenKind::Eof`], is
/// preceded by a `Newline` when the last line held tokens, and closes
/// every open indentation level with a `Dedent`.
pub struct Lexer<'src> {
    /// The full source text as bytes.
    source: &'src [u8],
    /// Source file for error reporting.
    source_file: &'src SourceFile,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based, counted in characters).
    col: u32,
    /// Open indentation widths; the bottom entry is always 0.
    indent_stack: Vec<u32>,
    /// Open brackets with the span of each opener.
    brackets: Vec<(u8, Span)>,
    /// True when the next token starts a new logical line.
    at_line_start: bool,
    /// Tokens produced so far.
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source file.
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            source_file,
            pos: 0,
            line: 1,
            col: 1,
            indent_stack: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Lex the entire source file into a token stream.
    pub fn lex(mut self) -> LexResult {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                if !self.handle_indentation()? {
                    break;
                }
                continue;
            }

            self.skip_whitespace();
            let Some(ch) = self.peek() else {
                break;
            };

            match ch {
                b'#' => self.skip_comment(),
                b'\\' => self.scan_line_continuation()?,
                b'\n' => {
                    let start = self.current_span();
                    self.advance();
                    if self.brackets.is_empty() {
                        self.push_newline(start);
                        self.at_line_start = true;
                    }
                }
                _ => {
                    let token = self.scan_token()?;
                    self.tokens.push(token);
                }
            }
        }

        self.finish()
    }

    // ─────────────────────────────────────────────────────────────
    // Layout
    // ─────────────────────────────────────────────────────────────

    /// Measure the indentation of the line at the cursor and emit
    /// `Indent`/`Dedent` tokens. Blank and comment-only lines are consumed
    /// without producing tokens.
    ///
    /// Returns `false` once the end of the source is reached.
    fn handle_indentation(&mut self) -> Result<bool, KarelError> {
        let mut width = 0u32;
        while let Some(ch) = self.peek() {
            match ch {
                b' ' => width += 1,
                b'\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                b'\x0c' => width = 0,
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => return Ok(false),
            Some(b'\r') if self.peek_at(1) == Some(b'\n') => {
                self.advance();
                self.advance();
                return Ok(true);
            }
            Some(b'\n') => {
                self.advance();
                return Ok(true);
            }
            Some(b'#') => {
                self.skip_comment();
                if self.peek() == Some(b'\n') {
                    self.advance();
                }
                return Ok(true);
            }
            _ => {}
        }

        let span = self.current_span();
        let current = self.indent_stack.last().copied().unwrap_or(0);
        if width > current {
            self.indent_stack.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, span));
        } else {
            while width < self.indent_stack.last().copied().unwrap_or(0) {
                self.indent_stack.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, span));
            }
            if width != self.indent_stack.last().copied().unwrap_or(0) {
                return Err(self.error(
                    ErrorCode::INDENTATION,
                    "unindent does not match any outer indentation level",
                    span,
                ));
            }
        }

        self.at_line_start = false;
        Ok(true)
    }

    /// Emit a `Newline` unless the current logical line is empty.
    fn push_newline(&mut self, span: Span) {
        let needed = self.tokens.last().is_some_and(|t| {
            !matches!(
                t.kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
            )
        });
        if needed {
            self.tokens.push(Token::new(TokenKind::Newline, span));
        }
    }

    /// `\` followed by a line break joins the next physical line.
    fn scan_line_continuation(&mut self) -> Result<(), KarelError> {
        let span = self.current_span();
        self.advance();
        if self.peek() == Some(b'\r') {
            self.advance();
        }
        if self.peek() == Some(b'\n') {
            self.advance();
            if self.at_end() {
                return Err(self.error(
                    ErrorCode::UNEXPECTED_EOF,
                    "unexpected end of file after line continuation",
                    span,
                ));
            }
            Ok(())
        } else {
            Err(self.error(
                ErrorCode::INVALID_CHARACTER,
                "unexpected character after line continuation character",
                span,
            ))
        }
    }

    /// Close the stream: pending newline, dedents, then `Eof`.
    fn finish(mut self) -> LexResult {
        if let Some((opener, span)) = self.brackets.last().copied() {
            return Err(self.error(
                ErrorCode::UNEXPECTED_EOF,
                format!("'{}' was never closed", opener as char),
                span,
            ));
        }
        let end = self.current_span();
        self.push_newline(end);
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, end));
        }
        self.tokens.push(Token::new(TokenKind::Eof, end));
        Ok(self.tokens)
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // UTF-8 continuation bytes do not start a new column
            self.col += 1;
        }
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn current_span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(
            start_line,
            start_col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> KarelError {
        let source_line = self.source_file.line(span.start_line).unwrap_or("");
        KarelError::new(code, message, span, source_line)
    }

    fn text_from(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\r' | b'\x0c') = self.peek() {
            self.advance();
        }
    }

    /// Skip a `#` comment up to, but not including, the line break.
    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Token scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan one token starting at a non-blank character.
    fn scan_token(&mut self) -> Result<Token, KarelError> {
        let start_line = self.line;
        let start_col = self.col;
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, self.current_span()));
        };

        if ch.is_ascii_digit() || (ch == b'.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return self.scan_number(start, start_line, start_col);
        }
        if is_ident_start(ch) {
            return self.scan_identifier(start, start_line, start_col);
        }
        if ch == b'"' || ch == b'\'' {
            return self.scan_string(StringPrefix::default(), start_line, start_col);
        }

        self.advance();
        let kind = match ch {
            b'(' | b'[' | b'{' => {
                let span = self.span_from(start_line, start_col);
                self.brackets.push((ch, span));
                match ch {
                    b'(' => TokenKind::LParen,
                    b'[' => TokenKind::LSquare,
                    _ => TokenKind::LBrace,
                }
            }
            b')' | b']' | b'}' => {
                let span = self.span_from(start_line, start_col);
                self.close_bracket(ch, span)?;
                match ch {
                    b')' => TokenKind::RParen,
                    b']' => TokenKind::RSquare,
                    _ => TokenKind::RBrace,
                }
            }
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semi,
            b'~' => TokenKind::Tilde,
            b':' => {
                if self.eat_byte(b'=') {
                    TokenKind::ColonEqual
                } else {
                    TokenKind::Colon
                }
            }
            b'.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            b'=' => {
                if self.eat_byte(b'=') {
                    TokenKind::EqEqual
                } else {
                    TokenKind::Equal
                }
            }
            b'!' => {
                if self.eat_byte(b'=') {
                    TokenKind::NotEqual
                } else {
                    let span = self.span_from(start_line, start_col);
                    return Err(self
                        .error(ErrorCode::INVALID_CHARACTER, "invalid syntax '!'", span)
                        .with_suggestion("Use 'not' for negation, or '!=' for inequality"));
                }
            }
            b'-' => {
                if self.eat_byte(b'>') {
                    TokenKind::Arrow
                } else {
                    self.operator_or_aug("-", TokenKind::Minus)
                }
            }
            b'+' => self.operator_or_aug("+", TokenKind::Plus),
            b'%' => self.operator_or_aug("%", TokenKind::Percent),
            b'@' => self.operator_or_aug("@", TokenKind::At),
            b'&' => self.operator_or_aug("&", TokenKind::Amper),
            b'|' => self.operator_or_aug("|", TokenKind::Vbar),
            b'^' => self.operator_or_aug("^", TokenKind::Circumflex),
            b'*' => {
                if self.eat_byte(b'*') {
                    self.operator_or_aug("**", TokenKind::DoubleStar)
                } else {
                    self.operator_or_aug("*", TokenKind::Star)
                }
            }
            b'/' => {
                if self.eat_byte(b'/') {
                    self.operator_or_aug("//", TokenKind::DoubleSlash)
                } else {
                    self.operator_or_aug("/", TokenKind::Slash)
                }
            }
            b'<' => {
                if self.eat_byte(b'<') {
                    self.operator_or_aug("<<", TokenKind::LeftShift)
                } else if self.eat_byte(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.eat_byte(b'>') {
                    self.operator_or_aug(">>", TokenKind::RightShift)
                } else if self.eat_byte(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            _ => {
                let span = self.span_from(start_line, start_col);
                let shown = self.text_from(start);
                return Err(self.error(
                    ErrorCode::INVALID_CHARACTER,
                    format!("invalid character '{shown}'"),
                    span,
                ));
            }
        };

        Ok(Token::new(kind, self.span_from(start_line, start_col)))
    }

    fn eat_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// `op` followed by `=` is augmented assignment.
    fn operator_or_aug(&mut self, op: &'static str, plain: TokenKind) -> TokenKind {
        if self.eat_byte(b'=') {
            TokenKind::AugAssign(op)
        } else {
            plain
        }
    }

    fn close_bracket(&mut self, closer: u8, span: Span) -> Result<(), KarelError> {
        let expected = match closer {
            b')' => b'(',
            b']' => b'[',
            _ => b'{',
        };
        match self.brackets.pop() {
            Some((opener, _)) if opener == expected => Ok(()),
            Some((opener, _)) => Err(self.error(
                ErrorCode::UNEXPECTED_TOKEN,
                format!(
                    "closing parenthesis '{}' does not match opening parenthesis '{}'",
                    closer as char, opener as char
                ),
                span,
            )),
            None => Err(self.error(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("unmatched '{}'", closer as char),
                span,
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Numbers
    // ─────────────────────────────────────────────────────────────

    fn scan_number(
        &mut self,
        start: usize,
        start_line: u32,
        start_col: u32,
    ) -> Result<Token, KarelError> {
        let radix = match (self.peek(), self.peek_at(1)) {
            (Some(b'0'), Some(b'x' | b'X')) => Some(16),
            (Some(b'0'), Some(b'o' | b'O')) => Some(8),
            (Some(b'0'), Some(b'b' | b'B')) => Some(2),
            _ => None,
        };

        let kind = if let Some(radix) = radix {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while let Some(ch) = self.peek() {
                if ch == b'_' || (ch as char).is_digit(radix) {
                    self.advance();
                } else {
                    break;
                }
            }
            let digits: String = self.text_from(digits_start).replace('_', "");
            let span = self.span_from(start_line, start_col);
            if digits.is_empty() {
                return Err(self.error(ErrorCode::INVALID_NUMBER, "invalid number literal", span));
            }
            let value = i64::from_str_radix(&digits, radix).map_err(|_| {
                self.error(
                    ErrorCode::INVALID_NUMBER,
                    "integer literal is too large",
                    span,
                )
            })?;
            TokenKind::Int(value)
        } else {
            let mut is_float = false;
            self.eat_digits();
            if self.peek() == Some(b'.') {
                is_float = true;
                self.advance();
                self.eat_digits();
            }
            if matches!(self.peek(), Some(b'e' | b'E'))
                && (self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some(b'+' | b'-'))
                        && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())))
            {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some(b'+' | b'-')) {
                    self.advance();
                }
                self.eat_digits();
            }
            // Imaginary literals are kept as floats; they never pass validation.
            if matches!(self.peek(), Some(b'j' | b'J')) {
                is_float = true;
                self.advance();
            }

            let text = self.text_from(start).replace('_', "");
            let text = text.trim_end_matches(['j', 'J']);
            let span = self.span_from(start_line, start_col);
            if is_float {
                let value: f64 = text.parse().map_err(|_| {
                    self.error(ErrorCode::INVALID_NUMBER, "invalid float literal", span)
                })?;
                TokenKind::Float(value)
            } else {
                let value: i64 = text.parse().map_err(|_| {
                    self.error(
                        ErrorCode::INVALID_NUMBER,
                        "integer literal is too large",
                        span,
                    )
                })?;
                TokenKind::Int(value)
            }
        };

        if self.peek().is_some_and(is_ident_continue) {
            self.advance();
            let span = self.span_from(start_line, start_col);
            return Err(self.error(ErrorCode::INVALID_NUMBER, "invalid decimal literal", span));
        }

        Ok(Token::new(kind, self.span_from(start_line, start_col)))
    }

    fn eat_digits(&mut self) {
        while let Some(b'0'..=b'9' | b'_') = self.peek() {
            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers, keywords & string prefixes
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(
        &mut self,
        start: usize,
        start_line: u32,
        start_col: u32,
    ) -> Result<Token, KarelError> {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let text = self.text_from(start);

        if matches!(self.peek(), Some(b'"' | b'\'')) {
            if let Some(prefix) = StringPrefix::parse(&text) {
                return self.scan_string(prefix, start_line, start_col);
            }
        }

        let kind = TokenKind::from_keyword(&text).unwrap_or(TokenKind::Name(text));
        Ok(Token::new(kind, self.span_from(start_line, start_col)))
    }

    // ─────────────────────────────────────────────────────────────
    // String literals
    // ─────────────────────────────────────────────────────────────

    /// Scan a string literal with the cursor on its opening quote.
    fn scan_string(
        &mut self,
        prefix: StringPrefix,
        start_line: u32,
        start_col: u32,
    ) -> Result<Token, KarelError> {
        let Some(quote) = self.advance() else {
            return Ok(Token::new(TokenKind::Eof, self.current_span()));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut buf: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start_line, start_col);
                    let message = if triple {
                        "unterminated triple-quoted string literal"
                    } else {
                        "unterminated string literal"
                    };
                    return Err(self.error(ErrorCode::UNTERMINATED_STRING, message, span));
                }
                Some(b'\n') if !triple => {
                    let span = self.span_from(start_line, start_col);
                    return Err(self.error(
                        ErrorCode::UNTERMINATED_STRING,
                        "unterminated string literal",
                        span,
                    ));
                }
                Some(ch) if ch == quote => {
                    if !triple {
                        self.advance();
                        break;
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.advance();
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                    buf.push(ch);
                }
                Some(b'\\') => {
                    self.advance();
                    if prefix.raw || prefix.formatted {
                        buf.push(b'\\');
                        if let Some(next) = self.advance() {
                            buf.push(next);
                        }
                    } else {
                        self.scan_escape(&mut buf, start_line, start_col)?;
                    }
                }
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }

        let kind = if prefix.formatted {
            TokenKind::FString(String::from_utf8_lossy(&buf).into_owned())
        } else if prefix.bytes {
            TokenKind::Bytes(buf)
        } else {
            TokenKind::Str(String::from_utf8_lossy(&buf).into_owned())
        };
        Ok(Token::new(kind, self.span_from(start_line, start_col)))
    }

    /// Resolve one escape sequence; the backslash is already consumed.
    fn scan_escape(
        &mut self,
        buf: &mut Vec<u8>,
        start_line: u32,
        start_col: u32,
    ) -> Result<(), KarelError> {
        let Some(ch) = self.advance() else {
            let span = self.span_from(start_line, start_col);
            return Err(self.error(
                ErrorCode::UNTERMINATED_STRING,
                "unterminated string literal",
                span,
            ));
        };
        match ch {
            b'\n' => {}
            b'n' => buf.push(b'\n'),
            b't' => buf.push(b'\t'),
            b'r' => buf.push(b'\r'),
            b'0' => buf.push(0),
            b'a' => buf.push(0x07),
            b'b' => buf.push(0x08),
            b'f' => buf.push(0x0c),
            b'v' => buf.push(0x0b),
            b'\\' | b'\'' | b'"' => buf.push(ch),
            b'x' | b'u' | b'U' => {
                let width = match ch {
                    b'x' => 2,
                    b'u' => 4,
                    _ => 8,
                };
                let digits_start = self.pos;
                for _ in 0..width {
                    if self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                        self.advance();
                    }
                }
                let digits = self.text_from(digits_start);
                let decoded = u32::from_str_radix(&digits, 16)
                    .ok()
                    .filter(|_| digits.len() == width)
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => {
                        let mut tmp = [0u8; 4];
                        buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
                    }
                    None => {
                        let span = self.span_from(start_line, start_col);
                        return Err(self.error(
                            ErrorCode::UNTERMINATED_STRING,
                            format!("truncated \\{} escape", ch as char),
                            span,
                        ));
                    }
                }
            }
            other => {
                // Unknown escapes keep their backslash
                buf.push(b'\\');
                buf.push(other);
            }
        }
        Ok(())
    }
}

/// Flags carried by a string prefix such as `rb` or `f`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StringPrefix {
    raw: bool,
    bytes: bool,
    formatted: bool,
}

impl StringPrefix {
    fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "r" => Some(Self { raw: true, ..Self::default() }),
            "u" => Some(Self::default()),
            "b" => Some(Self { bytes: true, ..Self::default() }),
            "f" => Some(Self { formatted: true, ..Self::default() }),
            "br" | "rb" => Some(Self { raw: true, bytes: true, formatted: false }),
            "fr" | "rf" => Some(Self { raw: true, bytes: false, formatted: true }),
            _ => None,
        }
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch >= 0x80
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch >= 0x80
}
