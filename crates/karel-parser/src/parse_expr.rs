//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 12. `lambda`
//! 11. `x if c else y`
//! 10. `or`
//! 9. `and`
//! 8. `not`
//! 7. comparisons, `in`, `not in`, `is`, `is not` (chainable)
//! 6. `|`
//! 5. `^`
//! 4. `&`
//! 3. `<<`, `>>`
//! 2. `+`, `-`
//! 1. `*`, `@`, `/`, `//`, `%`
//! 0. unary `+`, `-`, `~`; then `**`; then `await`; then `.`, `()`, `[]`

use karel_lexer::token::TokenKind;
use karel_types::ast::*;
use karel_types::{ErrorCode, Span};

use crate::parser::{PResult, Parser};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Points
    // ══════════════════════════════════════════════════════════════════════════

    /// `star_expressions`: comma-separated expressions, a tuple when a comma
    /// is present.
    pub(crate) fn parse_star_expressions(&mut self) -> PResult<Expr> {
        let first = self.parse_star_or_test()?;
        if !self.check_exact(&TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            elts.push(self.parse_star_or_test()?);
        }
        Ok(Expr::new(
            ExprKind::Tuple(elts),
            start.merge(self.previous_span()),
        ))
    }

    /// `name := value`, or a plain `test`.
    pub(crate) fn parse_named_expr(&mut self) -> PResult<Expr> {
        if matches!(self.peek_kind(), TokenKind::Name(_))
            && self.look_ahead(1) == &TokenKind::ColonEqual
        {
            let ident = self.expect_name()?;
            self.advance(); // eat `:=`
            let value = self.parse_test()?;
            let span = ident.span.merge(value.span);
            return Ok(Expr::new(
                ExprKind::NamedExpr {
                    target: Box::new(Expr::new(ExprKind::Name(ident.name), ident.span)),
                    value: Box::new(value),
                },
                span,
            ));
        }
        self.parse_test()
    }

    /// `test = lambda | or_test [ "if" or_test "else" test ]`
    pub(crate) fn parse_test(&mut self) -> PResult<Expr> {
        self.nested(|p| {
            if p.check_exact(&TokenKind::Lambda) {
                return p.parse_lambda();
            }
            let body = p.parse_or_test()?;
            if !p.eat(&TokenKind::If) {
                return Ok(body);
            }
            let test = p.parse_or_test()?;
            p.expect(&TokenKind::Else)?;
            let orelse = p.parse_test()?;
            let span = body.span.merge(orelse.span);
            Ok(Expr::new(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                span,
            ))
        })
    }

    /// `yield [from] value`
    pub(crate) fn parse_yield_expr(&mut self) -> PResult<Expr> {
        let start = self.expect(&TokenKind::Yield)?.span;
        let kind = if self.eat(&TokenKind::From) {
            ExprKind::YieldFrom(Box::new(self.parse_test()?))
        } else if self.starts_expression() {
            ExprKind::Yield(Some(Box::new(self.parse_star_expressions()?)))
        } else {
            ExprKind::Yield(None)
        };
        Ok(Expr::new(kind, start.merge(self.previous_span())))
    }

    fn parse_star_or_test(&mut self) -> PResult<Expr> {
        if self.check_exact(&TokenKind::Star) {
            self.parse_starred()
        } else {
            self.parse_test()
        }
    }

    fn parse_star_or_named(&mut self) -> PResult<Expr> {
        if self.check_exact(&TokenKind::Star) {
            self.parse_starred()
        } else {
            self.parse_named_expr()
        }
    }

    fn parse_starred(&mut self) -> PResult<Expr> {
        let start = self.expect(&TokenKind::Star)?.span;
        let value = self.parse_bitor()?;
        let span = start.merge(value.span);
        Ok(Expr::new(ExprKind::Starred(Box::new(value)), span))
    }

    /// `true` if the current token can begin an expression.
    pub(crate) fn starts_expression(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Name(_)
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Bytes(_)
                | TokenKind::FString(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::None
                | TokenKind::Ellipsis
                | TokenKind::LParen
                | TokenKind::LSquare
                | TokenKind::LBrace
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Tilde
                | TokenKind::Not
                | TokenKind::Lambda
                | TokenKind::Await
                | TokenKind::Star
        )
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Targets
    // ══════════════════════════════════════════════════════════════════════════

    /// One assignment target: `name`, `a.b`, `a[i]`, `*rest`, `(a, b)`.
    pub(crate) fn parse_target(&mut self) -> PResult<Expr> {
        if self.check_exact(&TokenKind::Star) {
            self.parse_starred()
        } else {
            self.parse_bitor()
        }
    }

    /// Comma-separated targets as a list (`del a, b`).
    pub(crate) fn parse_target_list(&mut self) -> PResult<Vec<Expr>> {
        let mut targets = vec![self.parse_target()?];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            targets.push(self.parse_target()?);
        }
        Ok(targets)
    }

    /// Comma-separated targets as one expression (`for a, b in ...`).
    pub(crate) fn parse_target_tuple(&mut self) -> PResult<Expr> {
        let first = self.parse_target()?;
        if !self.check_exact(&TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            elts.push(self.parse_target()?);
        }
        Ok(Expr::new(
            ExprKind::Tuple(elts),
            start.merge(self.previous_span()),
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Boolean & Comparison
    // ══════════════════════════════════════════════════════════════════════════

    /// `or_test = and_test { "or" and_test }`
    pub(crate) fn parse_or_test(&mut self) -> PResult<Expr> {
        let first = self.parse_and_test()?;
        self.parse_bool_chain(first, TokenKind::Or, BoolOp::Or, Self::parse_and_test)
    }

    /// `and_test = not_test { "and" not_test }`
    fn parse_and_test(&mut self) -> PResult<Expr> {
        let first = self.parse_not_test()?;
        self.parse_bool_chain(first, TokenKind::And, BoolOp::And, Self::parse_not_test)
    }

    fn parse_bool_chain(
        &mut self,
        first: Expr,
        token: TokenKind,
        op: BoolOp,
        operand: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        if !self.check_exact(&token) {
            return Ok(first);
        }
        let start = first.span;
        let mut values = vec![first];
        while self.eat(&token) {
            values.push(operand(self)?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp { op, values },
            start.merge(self.previous_span()),
        ))
    }

    /// `not_test = "not" not_test | comparison`
    fn parse_not_test(&mut self) -> PResult<Expr> {
        if self.check_exact(&TokenKind::Not) {
            let start = self.advance().span;
            let operand = self.nested(Self::parse_not_test)?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_comparison()
    }

    /// `comparison = bitor { comp_op bitor }`
    fn parse_comparison(&mut self) -> PResult<Expr> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.eat_comp_op() {
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let span = left.span.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            span,
        ))
    }

    fn eat_comp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek_kind() {
            TokenKind::EqEqual => CmpOp::Eq,
            TokenKind::NotEqual => CmpOp::NotEq,
            TokenKind::Less => CmpOp::Lt,
            TokenKind::LessEqual => CmpOp::LtE,
            TokenKind::Greater => CmpOp::Gt,
            TokenKind::GreaterEqual => CmpOp::GtE,
            TokenKind::In => CmpOp::In,
            TokenKind::Not if self.look_ahead(1) == &TokenKind::In => {
                self.advance();
                CmpOp::NotIn
            }
            TokenKind::Is if self.look_ahead(1) == &TokenKind::Not => {
                self.advance();
                CmpOp::IsNot
            }
            TokenKind::Is => CmpOp::Is,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Binary Operators
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_binary_level(
        &mut self,
        operand: fn(&mut Self) -> PResult<Expr>,
        operator: fn(&TokenKind) -> Option<BinOp>,
    ) -> PResult<Expr> {
        let depth = self.depth;
        let result = self.parse_binary_chain(operand, operator);
        self.depth = depth;
        result
    }

    /// Each operator nests the tree built so far one level deeper.
    fn parse_binary_chain(
        &mut self,
        operand: fn(&mut Self) -> PResult<Expr>,
        operator: fn(&TokenKind) -> Option<BinOp>,
    ) -> PResult<Expr> {
        let mut left = operand(self)?;
        while let Some(op) = operator(self.peek_kind()) {
            self.chain_link()?;
            self.advance();
            let right = operand(self)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    pub(crate) fn parse_bitor(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_bitxor, |t| {
            matches!(t, TokenKind::Vbar).then_some(BinOp::BitOr)
        })
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_bitand, |t| {
            matches!(t, TokenKind::Circumflex).then_some(BinOp::BitXor)
        })
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_shift, |t| {
            matches!(t, TokenKind::Amper).then_some(BinOp::BitAnd)
        })
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_arith, |t| match t {
            TokenKind::LeftShift => Some(BinOp::LShift),
            TokenKind::RightShift => Some(BinOp::RShift),
            _ => None,
        })
    }

    fn parse_arith(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_term, |t| match t {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        self.parse_binary_level(Self::parse_factor, |t| match t {
            TokenKind::Star => Some(BinOp::Mult),
            TokenKind::At => Some(BinOp::MatMult),
            TokenKind::Slash => Some(BinOp::Div),
            TokenKind::DoubleSlash => Some(BinOp::FloorDiv),
            TokenKind::Percent => Some(BinOp::Mod),
            _ => None,
        })
    }

    /// `factor = ("+" | "-" | "~") factor | power`
    fn parse_factor(&mut self) -> PResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Plus => UnaryOp::UAdd,
            TokenKind::Minus => UnaryOp::USub,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let start = self.advance().span;
        let operand = self.nested(Self::parse_factor)?;
        let span = start.merge(operand.span);
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `power = await_primary [ "**" factor ]`
    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_await_primary()?;
        if !self.eat(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        let exponent = self.nested(Self::parse_factor)?;
        let span = base.span.merge(exponent.span);
        Ok(Expr::new(
            ExprKind::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            },
            span,
        ))
    }

    fn parse_await_primary(&mut self) -> PResult<Expr> {
        if !self.check_exact(&TokenKind::Await) {
            return self.parse_primary();
        }
        let start = self.advance().span;
        let value = self.parse_primary()?;
        let span = start.merge(value.span);
        Ok(Expr::new(ExprKind::Await(Box::new(value)), span))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary & Trailers
    // ══════════════════════════════════════════════════════════════════════════

    /// `primary = atom { "(" args ")" | "[" subscript "]" | "." name }`
    fn parse_primary(&mut self) -> PResult<Expr> {
        let depth = self.depth;
        let result = self.parse_trailers();
        self.depth = depth;
        result
    }

    fn parse_trailers(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if matches!(
                self.peek_kind(),
                TokenKind::LParen | TokenKind::LSquare | TokenKind::Dot
            ) {
                self.chain_link()?;
            }
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    self.expect(&TokenKind::RParen)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        span,
                    );
                }
                TokenKind::LSquare => {
                    self.advance();
                    let slice = self.parse_subscript()?;
                    self.expect(&TokenKind::RSquare)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            slice: Box::new(slice),
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    let span = expr.span.merge(attr.span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Arguments between `(` and `)` of a call or class header.
    pub(crate) fn parse_call_arguments(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.check_exact(&TokenKind::RParen) {
            let start = self.current_span();
            if self.eat(&TokenKind::DoubleStar) {
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    arg: None,
                    span: start.merge(value.span),
                    value,
                });
            } else if self.check_exact(&TokenKind::Star) {
                args.push(self.parse_starred()?);
            } else if matches!(self.peek_kind(), TokenKind::Name(_))
                && self.look_ahead(1) == &TokenKind::Equal
            {
                let arg = self.expect_name()?;
                self.advance(); // eat `=`
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    arg: Some(arg),
                    span: start.merge(value.span),
                    value,
                });
            } else {
                let arg = self.parse_named_expr()?;
                if self.at_comprehension() {
                    let generators = self.parse_comprehension_clauses()?;
                    let span = arg.span.merge(self.previous_span());
                    args.push(Expr::new(
                        ExprKind::GeneratorExp {
                            elt: Box::new(arg),
                            generators,
                        },
                        span,
                    ));
                } else {
                    args.push(arg);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    /// `slice { "," slice }` inside `[...]`.
    fn parse_subscript(&mut self) -> PResult<Expr> {
        let first = self.parse_slice()?;
        if !self.check_exact(&TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check_exact(&TokenKind::RSquare) {
                break;
            }
            elts.push(self.parse_slice()?);
        }
        Ok(Expr::new(
            ExprKind::Tuple(elts),
            start.merge(self.previous_span()),
        ))
    }

    /// `[lower] ":" [upper] [ ":" [step] ]`, or a single expression.
    fn parse_slice(&mut self) -> PResult<Expr> {
        let start = self.current_span();
        let lower = if self.check_exact(&TokenKind::Colon) {
            None
        } else {
            Some(self.parse_star_or_named()?)
        };
        if !self.eat(&TokenKind::Colon) {
            return lower.ok_or_else(|| self.unexpected("an expression"));
        }
        let upper = if self.at_slice_bound() {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(&TokenKind::Colon) && !self.at_slice_bound() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Slice {
                lower: lower.map(Box::new),
                upper,
                step,
            },
            start.merge(self.previous_span()),
        ))
    }

    fn at_slice_bound(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Colon | TokenKind::Comma | TokenKind::RSquare
        )
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Atoms
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_atom(&mut self) -> PResult<Expr> {
        let span = self.current_span();
        let constant = match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                self.advance();
                return Ok(Expr::new(ExprKind::Name(name), span));
            }
            TokenKind::Int(n) => Constant::Int(n),
            TokenKind::Float(n) => Constant::Float(n),
            TokenKind::True => Constant::Bool(true),
            TokenKind::False => Constant::Bool(false),
            TokenKind::None => Constant::None,
            TokenKind::Ellipsis => Constant::Ellipsis,
            TokenKind::Str(_) | TokenKind::Bytes(_) | TokenKind::FString(_) => {
                return self.parse_strings();
            }
            TokenKind::LParen => return self.nested(Self::parse_paren_atom),
            TokenKind::LSquare => return self.nested(Self::parse_list_atom),
            TokenKind::LBrace => return self.nested(Self::parse_brace_atom),
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expr::new(ExprKind::Constant(constant), span))
    }

    /// Adjacent string literals concatenate.
    fn parse_strings(&mut self) -> PResult<Expr> {
        let start = self.current_span();
        let mut text = String::new();
        let mut bytes: Option<Vec<u8>> = None;
        let mut saw_text = false;
        let mut formatted = false;
        loop {
            match self.peek_kind() {
                TokenKind::Str(s) => {
                    text.push_str(s);
                    saw_text = true;
                }
                TokenKind::FString(s) => {
                    text.push_str(s);
                    formatted = true;
                }
                TokenKind::Bytes(b) => bytes.get_or_insert_with(Vec::new).extend_from_slice(b),
                _ => break,
            }
            self.advance();
        }
        let span = start.merge(self.previous_span());
        let kind = match bytes {
            Some(_) if saw_text || formatted => {
                return Err(self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    "cannot mix bytes and nonbytes literals",
                    span,
                ));
            }
            Some(b) => ExprKind::Constant(Constant::Bytes(b)),
            None if formatted => ExprKind::FormattedString(text),
            None => ExprKind::Constant(Constant::Str(text)),
        };
        Ok(Expr::new(kind, span))
    }

    /// `()`, `(expr)`, `(a, b)`, `(x for ...)`, `(yield ...)`
    fn parse_paren_atom(&mut self) -> PResult<Expr> {
        let start = self.expect(&TokenKind::LParen)?.span;
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::new(
                ExprKind::Tuple(Vec::new()),
                start.merge(self.previous_span()),
            ));
        }
        if self.check_exact(&TokenKind::Yield) {
            let value = self.parse_yield_expr()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(value);
        }

        let first = self.parse_star_or_named()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(Expr::new(
                ExprKind::GeneratorExp {
                    elt: Box::new(first),
                    generators,
                },
                start.merge(self.previous_span()),
            ));
        }
        if self.eat(&TokenKind::RParen) {
            return Ok(first);
        }

        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check_exact(&TokenKind::RParen) {
                break;
            }
            elts.push(self.parse_star_or_named()?);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Expr::new(
            ExprKind::Tuple(elts),
            start.merge(self.previous_span()),
        ))
    }

    /// `[a, b]` or `[x for ...]`
    fn parse_list_atom(&mut self) -> PResult<Expr> {
        let start = self.expect(&TokenKind::LSquare)?.span;
        if self.eat(&TokenKind::RSquare) {
            return Ok(Expr::new(
                ExprKind::List(Vec::new()),
                start.merge(self.previous_span()),
            ));
        }
        let first = self.parse_star_or_named()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&TokenKind::RSquare)?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    elt: Box::new(first),
                    generators,
                },
                start.merge(self.previous_span()),
            ));
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check_exact(&TokenKind::RSquare) {
                break;
            }
            elts.push(self.parse_star_or_named()?);
        }
        self.expect(&TokenKind::RSquare)?;
        Ok(Expr::new(
            ExprKind::List(elts),
            start.merge(self.previous_span()),
        ))
    }

    /// `{}`, `{k: v}`, `{**m}`, `{a, b}` and their comprehensions.
    fn parse_brace_atom(&mut self) -> PResult<Expr> {
        let start = self.expect(&TokenKind::LBrace)?.span;
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::new(
                ExprKind::Dict {
                    keys: Vec::new(),
                    values: Vec::new(),
                },
                start.merge(self.previous_span()),
            ));
        }

        // Dict display (first entry is `k: v` or `**m`)
        let first_key = if self.eat(&TokenKind::DoubleStar) {
            None
        } else {
            let key = self.parse_star_or_named()?;
            if !self.check_exact(&TokenKind::Colon) {
                return self.finish_set(start, key);
            }
            self.advance();
            Some(key)
        };
        let first_value = if first_key.is_some() {
            self.parse_test()?
        } else {
            self.parse_bitor()?
        };

        if let Some(key) = first_key.clone() {
            if self.at_comprehension() {
                let generators = self.parse_comprehension_clauses()?;
                self.expect(&TokenKind::RBrace)?;
                return Ok(Expr::new(
                    ExprKind::DictComp {
                        key: Box::new(key),
                        value: Box::new(first_value),
                        generators,
                    },
                    start.merge(self.previous_span()),
                ));
            }
        }

        let mut keys = vec![first_key];
        let mut values = vec![first_value];
        while self.eat(&TokenKind::Comma) {
            if self.check_exact(&TokenKind::RBrace) {
                break;
            }
            if self.eat(&TokenKind::DoubleStar) {
                keys.push(None);
                values.push(self.parse_bitor()?);
            } else {
                keys.push(Some(self.parse_test()?));
                self.expect(&TokenKind::Colon)?;
                values.push(self.parse_test()?);
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::new(
            ExprKind::Dict { keys, values },
            start.merge(self.previous_span()),
        ))
    }

    fn finish_set(&mut self, start: Span, first: Expr) -> PResult<Expr> {
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&TokenKind::RBrace)?;
            return Ok(Expr::new(
                ExprKind::SetComp {
                    elt: Box::new(first),
                    generators,
                },
                start.merge(self.previous_span()),
            ));
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check_exact(&TokenKind::RBrace) {
                break;
            }
            elts.push(self.parse_star_or_named()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::new(
            ExprKind::Set(elts),
            start.merge(self.previous_span()),
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Comprehensions & Lambdas
    // ══════════════════════════════════════════════════════════════════════════

    fn at_comprehension(&self) -> bool {
        self.check_exact(&TokenKind::For)
            || (self.check_exact(&TokenKind::Async) && self.look_ahead(1) == &TokenKind::For)
    }

    /// `{ [async] for targets in or_test { if or_test } }`
    fn parse_comprehension_clauses(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.at_comprehension() {
            let is_async = self.eat(&TokenKind::Async);
            self.expect(&TokenKind::For)?;
            let target = self.parse_target_tuple()?;
            self.expect(&TokenKind::In)?;
            let iter = self.parse_or_test()?;
            let mut ifs = Vec::new();
            while self.eat(&TokenKind::If) {
                ifs.push(self.parse_or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
        }
        Ok(generators)
    }

    /// `lambda params: body`
    fn parse_lambda(&mut self) -> PResult<Expr> {
        let start = self.expect(&TokenKind::Lambda)?.span;
        let params = self.parse_parameters(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_test()?;
        let span = start.merge(body.span);
        Ok(Expr::new(
            ExprKind::Lambda {
                params: Box::new(params),
                body: Box::new(body),
            },
            span,
        ))
    }
}
