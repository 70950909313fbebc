//! Lexer tests: keywords, operators, literals, layout tokens, comments,
//! line joining and lexical errors.

use karel_lexer::{Lexer, Token, TokenKind, ALL_KEYWORDS};
use karel_types::{ErrorCode, KarelError, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn tokens(source: &str) -> Vec<Token> {
    let sf = SourceFile::new(source);
    Lexer::new(&sf).lex().expect("source should lex")
}

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    tokens(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn lex_error(source: &str) -> KarelError {
    let sf = SourceFile::new(source);
    Lexer::new(&sf).lex().expect_err("source should fail to lex")
}

fn name(s: &str) -> TokenKind {
    TokenKind::Name(s.to_string())
}

// ─────────────────────────────────────────────────────────────────────
// Keywords & names
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_all_keywords_lex_as_keywords() {
    for kw in ALL_KEYWORDS {
        let toks = kinds(kw);
        assert_eq!(toks.len(), 2, "keyword {kw} should be one token + newline");
        assert!(toks[0].is_keyword(), "{kw} lexed as {:?}", toks[0]);
    }
}

#[test]
fn test_primitive_names_are_identifiers() {
    assert_eq!(
        kinds("front_is_clear"),
        vec![name("front_is_clear"), TokenKind::Newline]
    );
}

#[test]
fn test_call_statement() {
    assert_eq!(
        kinds("move()\n"),
        vec![
            name("move"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline
        ]
    );
}

#[test]
fn test_missing_trailing_newline_is_supplied() {
    assert_eq!(kinds("move()"), kinds("move()\n"));
}

#[test]
fn test_stream_always_ends_with_eof() {
    let toks = tokens("");
    assert_eq!(toks.len(), 1);
    assert_eq!(toks[0].kind, TokenKind::Eof);
}

// ─────────────────────────────────────────────────────────────────────
// Layout: indentation, blank lines, comments
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_indent_and_dedent() {
    assert_eq!(
        kinds("def f():\n    move()\nf()\n"),
        vec![
            TokenKind::Def,
            name("f"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            name("move"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Dedent,
            name("f"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_open_blocks_are_closed_at_eof() {
    assert_eq!(
        kinds("while x:\n    if y:\n        move()"),
        vec![
            TokenKind::While,
            name("x"),
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::If,
            name("y"),
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            name("move"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Dedent,
        ]
    );
}

#[test]
fn test_tab_indentation() {
    let toks = kinds("if x:\n\tmove()\n");
    assert!(toks.contains(&TokenKind::Indent));
    assert!(toks.contains(&TokenKind::Dedent));
}

#[test]
fn test_blank_and_comment_lines_produce_no_tokens() {
    assert_eq!(
        kinds("move()\n\n   # a comment\n\nmove()  # trailing\n"),
        vec![
            name("move"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
            name("move"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_comment_only_program() {
    assert!(kinds("# nothing to do\n").is_empty());
}

#[test]
fn test_crlf_line_endings() {
    assert_eq!(kinds("move()\r\nmove()\r\n"), kinds("move()\nmove()\n"));
}

#[test]
fn test_inconsistent_dedent_is_an_error() {
    let err = lex_error("if x:\n        move()\n    move()\n");
    assert_eq!(err.code, ErrorCode::INDENTATION);
    assert_eq!(err.line(), 3);
}

#[test]
fn test_newlines_inside_brackets_are_ignored() {
    assert_eq!(
        kinds("range(\n  3\n)\n"),
        vec![
            name("range"),
            TokenKind::LParen,
            TokenKind::Int(3),
            TokenKind::RParen,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_backslash_continuation() {
    assert_eq!(
        kinds("x = 1 + \\\n    2\n"),
        vec![
            name("x"),
            TokenKind::Equal,
            TokenKind::Int(1),
            TokenKind::Plus,
            TokenKind::Int(2),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_semicolon_separates_statements() {
    let toks = kinds("move(); move()");
    assert_eq!(toks[3], TokenKind::Semi);
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_augmented_assignment_operators() {
    assert_eq!(kinds("x += 1")[1], TokenKind::AugAssign("+"));
    assert_eq!(kinds("x //= 2")[1], TokenKind::AugAssign("//"));
    assert_eq!(kinds("x **= 2")[1], TokenKind::AugAssign("**"));
    assert_eq!(kinds("x <<= 2")[1], TokenKind::AugAssign("<<"));
}

#[test]
fn test_multi_character_operators() {
    assert_eq!(
        kinds("a ** b // c != d <= e >= f == g -> h"),
        vec![
            name("a"),
            TokenKind::DoubleStar,
            name("b"),
            TokenKind::DoubleSlash,
            name("c"),
            TokenKind::NotEqual,
            name("d"),
            TokenKind::LessEqual,
            name("e"),
            TokenKind::GreaterEqual,
            name("f"),
            TokenKind::EqEqual,
            name("g"),
            TokenKind::Arrow,
            name("h"),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_walrus_and_ellipsis() {
    let toks = kinds("(y := ...)");
    assert_eq!(toks[2], TokenKind::ColonEqual);
    assert_eq!(toks[3], TokenKind::Ellipsis);
}

#[test]
fn test_bang_alone_is_an_error() {
    let err = lex_error("if !front_is_clear():\n    move()\n");
    assert_eq!(err.code, ErrorCode::INVALID_CHARACTER);
    assert!(err.suggestion.is_some());
}

#[test]
fn test_invalid_character() {
    let err = lex_error("move()\n$\n");
    assert_eq!(err.code, ErrorCode::INVALID_CHARACTER);
    assert_eq!(err.line(), 2);
}

#[test]
fn test_unclosed_bracket() {
    let err = lex_error("move(\n");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_EOF);
    assert_eq!(err.line(), 1);
}

#[test]
fn test_unmatched_closing_bracket() {
    let err = lex_error("move())\n");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_TOKEN);
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_integer_literals() {
    assert_eq!(kinds("42")[0], TokenKind::Int(42));
    assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
    assert_eq!(kinds("0x1F")[0], TokenKind::Int(31));
    assert_eq!(kinds("0o17")[0], TokenKind::Int(15));
    assert_eq!(kinds("0b101")[0], TokenKind::Int(5));
}

#[test]
fn test_float_literals() {
    assert_eq!(kinds("2.5")[0], TokenKind::Float(2.5));
    assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
    assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
}

#[test]
fn test_integer_overflow_is_an_error() {
    let err = lex_error("range(99999999999999999999)\n");
    assert_eq!(err.code, ErrorCode::INVALID_NUMBER);
}

#[test]
fn test_digit_then_letters_is_an_error() {
    let err = lex_error("3abc\n");
    assert_eq!(err.code, ErrorCode::INVALID_NUMBER);
}

#[test]
fn test_string_escapes() {
    assert_eq!(kinds("'a\\nb'")[0], TokenKind::Str("a\nb".into()));
    assert_eq!(kinds("\"q\\\"q\"")[0], TokenKind::Str("q\"q".into()));
    assert_eq!(kinds("'\\x41'")[0], TokenKind::Str("A".into()));
}

#[test]
fn test_string_prefixes() {
    assert_eq!(kinds("r'a\\nb'")[0], TokenKind::Str("a\\nb".into()));
    assert_eq!(kinds("b'hi'")[0], TokenKind::Bytes(b"hi".to_vec()));
    assert_eq!(kinds("f'{x}'")[0], TokenKind::FString("{x}".into()));
    assert_eq!(kinds("u'hi'")[0], TokenKind::Str("hi".into()));
}

#[test]
fn test_triple_quoted_string_spans_lines() {
    let toks = tokens("\"\"\"first\nsecond\"\"\"\nmove()\n");
    assert_eq!(toks[0].kind, TokenKind::Str("first\nsecond".into()));
    assert_eq!(toks[2].kind, name("move"));
    assert_eq!(toks[2].span.start_line, 3);
}

#[test]
fn test_unterminated_string() {
    let err = lex_error("print('abc\n");
    assert_eq!(err.code, ErrorCode::UNTERMINATED_STRING);
    assert_eq!(err.line(), 1);
}

#[test]
fn test_unterminated_triple_quoted_string() {
    let err = lex_error("move()\n'''never closed\n");
    assert_eq!(err.code, ErrorCode::UNTERMINATED_STRING);
    assert_eq!(err.line(), 2);
    assert!(err.message.contains("triple-quoted"));
}

// ─────────────────────────────────────────────────────────────────────
// Spans & determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_token_spans() {
    let toks = tokens("move()\nturn_left()\n");
    let turn = &toks[4];
    assert_eq!(turn.kind, name("turn_left"));
    assert_eq!(turn.span.start_line, 2);
    assert_eq!(turn.span.start_col, 1);
    assert_eq!(turn.span.end_col, 9);
}

#[test]
fn test_error_carries_source_line() {
    let err = lex_error("move()\nx = 'oops\n");
    assert_eq!(err.source_line, "x = 'oops");
}

#[test]
fn test_determinism_100_iterations() {
    let source = "def turn_right():\n    for _ in range(3):\n        turn_left()\n\nwhile front_is_clear():\n    move()\n";
    let first = tokens(source);
    for _ in 0..100 {
        assert_eq!(tokens(source), first);
    }
}
