//! Statement parsing.
//!
//! ```text
//! statement     = compound_stmt | simple_stmts
//! simple_stmts  = simple_stmt { ";" simple_stmt } [ ";" ] NEWLINE
//! block         = ":" ( simple_stmts | NEWLINE INDENT statement+ DEDENT )
//! ```

use karel_lexer::token::TokenKind;
use karel_types::ast::*;
use karel_types::ErrorCode;

use crate::parser::{PResult, Parser};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Statements & Blocks
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse one logical line or compound statement.
    pub(crate) fn parse_statement(&mut self) -> PResult<Vec<Stmt>> {
        match self.peek_kind() {
            TokenKind::Indent => Err(self.error_at_current(ErrorCode::INDENTATION, "unexpected indent")),
            TokenKind::If
            | TokenKind::While
            | TokenKind::For
            | TokenKind::Try
            | TokenKind::With
            | TokenKind::Def
            | TokenKind::Class
            | TokenKind::At
            | TokenKind::Async => Ok(vec![self.parse_compound_stmt()?]),
            _ => self.parse_simple_stmts(),
        }
    }

    /// `simple_stmt { ";" simple_stmt } [ ";" ] NEWLINE`
    fn parse_simple_stmts(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple_stmt()?];
        while self.eat(&TokenKind::Semi) {
            if self.check_exact(&TokenKind::Newline) || self.at_end() {
                break;
            }
            stmts.push(self.parse_simple_stmt()?);
        }
        self.expect_newline()?;
        Ok(stmts)
    }

    /// `":" block`: an indented suite, or simple statements on the same line.
    pub(crate) fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon)?;
        if !self.eat(&TokenKind::Newline) {
            return self.parse_simple_stmts();
        }
        if !self.check_exact(&TokenKind::Indent) {
            return Err(self.error_at_current(ErrorCode::INDENTATION, "expected an indented block"));
        }
        self.advance();
        self.nested(|p| {
            let mut body = Vec::new();
            while !p.check_exact(&TokenKind::Dedent) && !p.at_end() {
                body.extend(p.parse_statement()?);
            }
            p.eat(&TokenKind::Dedent);
            Ok(body)
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Simple Statements
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_simple_stmt(&mut self) -> PResult<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if self.at_simple_stmt_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_star_expressions()?))
                }
            }
            TokenKind::Raise => self.parse_raise()?,
            TokenKind::Global => {
                self.advance();
                StmtKind::Global(self.parse_name_list()?)
            }
            TokenKind::Nonlocal => {
                self.advance();
                StmtKind::Nonlocal(self.parse_name_list()?)
            }
            TokenKind::Del => {
                self.advance();
                StmtKind::Delete(self.parse_target_list()?)
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_test()?;
                let msg = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Import => self.parse_import()?,
            TokenKind::From => self.parse_import_from()?,
            _ => self.parse_expr_stmt()?,
        };
        Ok(Stmt::new(kind, start.merge(self.previous_span())))
    }

    fn at_simple_stmt_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Semi | TokenKind::Eof
        )
    }

    /// Expression statement, assignment, augmented or annotated assignment.
    fn parse_expr_stmt(&mut self) -> PResult<StmtKind> {
        let first = self.parse_star_expressions_or_yield()?;

        if let TokenKind::AugAssign(op) = self.peek_kind().clone() {
            self.advance();
            let value = self.parse_star_expressions_or_yield()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op: aug_op(op),
                value,
            });
        }

        if self.eat(&TokenKind::Colon) {
            let annotation = self.parse_test()?;
            let value = if self.eat(&TokenKind::Equal) {
                Some(self.parse_star_expressions_or_yield()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        if self.check_exact(&TokenKind::Equal) {
            let mut targets = vec![first];
            let mut value = None;
            while self.eat(&TokenKind::Equal) {
                let next = self.parse_star_expressions_or_yield()?;
                if let Some(prev) = value.replace(next) {
                    targets.push(prev);
                }
            }
            let value = value.ok_or_else(|| self.unexpected("an expression"))?;
            return Ok(StmtKind::Assign { targets, value });
        }

        Ok(StmtKind::Expr(first))
    }

    fn parse_star_expressions_or_yield(&mut self) -> PResult<Expr> {
        if self.check_exact(&TokenKind::Yield) {
            self.parse_yield_expr()
        } else {
            self.parse_star_expressions()
        }
    }

    /// `raise [exc [from cause]]`
    fn parse_raise(&mut self) -> PResult<StmtKind> {
        self.advance();
        if self.at_simple_stmt_end() {
            return Ok(StmtKind::Raise {
                exc: None,
                cause: None,
            });
        }
        let exc = self.parse_test()?;
        let cause = if self.eat(&TokenKind::From) {
            Some(self.parse_test()?)
        } else {
            None
        };
        Ok(StmtKind::Raise {
            exc: Some(exc),
            cause,
        })
    }

    fn parse_name_list(&mut self) -> PResult<Vec<Ident>> {
        let mut names = vec![self.expect_name()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    /// `import a.b [as c], d`
    fn parse_import(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let start = self.current_span();
            let name = self.parse_dotted_name()?;
            let asname = if self.eat(&TokenKind::As) {
                Some(self.expect_name()?.name)
            } else {
                None
            };
            names.push(Alias {
                name,
                asname,
                span: start.merge(self.previous_span()),
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    /// `from [.]* [module] import (* | names | "(" names ")")`
    fn parse_import_from(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut level = 0;
        loop {
            if self.eat(&TokenKind::Dot) {
                level += 1;
            } else if self.eat(&TokenKind::Ellipsis) {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check_exact(&TokenKind::Import) {
            None
        } else {
            Some(self.parse_dotted_name()?)
        };
        self.expect(&TokenKind::Import)?;

        let mut names = Vec::new();
        if self.check_exact(&TokenKind::Star) {
            let span = self.advance().span;
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
                span,
            });
        } else {
            let parenthesized = self.eat(&TokenKind::LParen);
            loop {
                let ident = self.expect_name()?;
                let asname = if self.eat(&TokenKind::As) {
                    Some(self.expect_name()?.name)
                } else {
                    None
                };
                names.push(Alias {
                    name: ident.name,
                    asname,
                    span: ident.span.merge(self.previous_span()),
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if parenthesized && self.check_exact(&TokenKind::RParen) {
                    break;
                }
            }
            if parenthesized {
                self.expect(&TokenKind::RParen)?;
            }
        }
        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_name()?.name;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?.name);
        }
        Ok(name)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Compound Statements
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_compound_stmt(&mut self) -> PResult<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::If => StmtKind::If(self.parse_if()?),
            TokenKind::While => StmtKind::While(self.parse_while()?),
            TokenKind::For => StmtKind::For(self.parse_for()?),
            TokenKind::Try => StmtKind::Try(self.parse_try()?),
            TokenKind::With => StmtKind::With(self.parse_with()?),
            TokenKind::Def => StmtKind::FunctionDef(self.parse_function_def(Vec::new())?),
            TokenKind::Class => StmtKind::ClassDef(self.parse_class_def(Vec::new())?),
            TokenKind::At => return self.parse_decorated(),
            _ => return self.parse_async_stmt(),
        };
        Ok(Stmt::new(kind, start.merge(self.previous_span())))
    }

    /// `if test block { elif test block } [ else block ]`
    fn parse_if(&mut self) -> PResult<IfStmt> {
        self.advance(); // eat `if` / `elif`
        let test = self.parse_named_expr()?;
        let body = self.parse_block()?;
        let orelse = if self.check_exact(&TokenKind::Elif) {
            let start = self.current_span();
            let nested = self.nested(Self::parse_if)?;
            vec![Stmt::new(
                StmtKind::If(nested),
                start.merge(self.previous_span()),
            )]
        } else if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(IfStmt { test, body, orelse })
    }

    /// `while test block [ else block ]`
    fn parse_while(&mut self) -> PResult<WhileStmt> {
        self.advance();
        let test = self.parse_named_expr()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(WhileStmt { test, body, orelse })
    }

    /// `for targets in iter block [ else block ]`
    fn parse_for(&mut self) -> PResult<ForStmt> {
        self.advance();
        let target = self.parse_target_tuple()?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_star_expressions()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(ForStmt {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn parse_else_block(&mut self) -> PResult<Vec<Stmt>> {
        if self.eat(&TokenKind::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    /// `try block (handlers [else] [finally] | finally)`
    fn parse_try(&mut self) -> PResult<TryStmt> {
        self.advance();
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.check_exact(&TokenKind::Except) {
            let start = self.advance().span;
            // `except*` groups parse like plain handlers
            self.eat(&TokenKind::Star);
            let (type_, name) = if self.check_exact(&TokenKind::Colon) {
                (None, None)
            } else {
                let type_ = self.parse_test()?;
                let name = if self.eat(&TokenKind::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(type_), name)
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                type_,
                name,
                body,
                span: start.merge(self.previous_span()),
            });
        }
        let orelse = if handlers.is_empty() {
            Vec::new()
        } else {
            self.parse_else_block()?
        };
        let finalbody = if self.eat(&TokenKind::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.unexpected("'except' or 'finally'"));
        }
        Ok(TryStmt {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    /// `with item { "," item } block`
    fn parse_with(&mut self) -> PResult<WithStmt> {
        self.advance();
        let mut items = Vec::new();
        loop {
            let context = self.parse_test()?;
            let vars = if self.eat(&TokenKind::As) {
                Some(self.parse_target()?)
            } else {
                None
            };
            items.push(WithItem { context, vars });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(WithStmt { items, body })
    }

    /// `{ "@" expr NEWLINE } (def | class | async def)`
    fn parse_decorated(&mut self) -> PResult<Stmt> {
        let start = self.current_span();
        let mut decorators = Vec::new();
        while self.eat(&TokenKind::At) {
            decorators.push(self.parse_named_expr()?);
            self.expect(&TokenKind::Newline)?;
        }
        let kind = match self.peek_kind() {
            TokenKind::Def => StmtKind::FunctionDef(self.parse_function_def(decorators)?),
            TokenKind::Class => StmtKind::ClassDef(self.parse_class_def(decorators)?),
            TokenKind::Async if self.look_ahead(1) == &TokenKind::Def => {
                self.advance();
                StmtKind::AsyncFunctionDef(self.parse_function_def(decorators)?)
            }
            _ => return Err(self.unexpected("'def' or 'class' after decorator")),
        };
        Ok(Stmt::new(kind, start.merge(self.previous_span())))
    }

    /// `async (def | for | with)`
    fn parse_async_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(&TokenKind::Async)?.span;
        let kind = match self.peek_kind() {
            TokenKind::Def => StmtKind::AsyncFunctionDef(self.parse_function_def(Vec::new())?),
            TokenKind::For => StmtKind::AsyncFor(self.parse_for()?),
            TokenKind::With => StmtKind::AsyncWith(self.parse_with()?),
            _ => return Err(self.unexpected("'def', 'for' or 'with' after 'async'")),
        };
        Ok(Stmt::new(kind, start.merge(self.previous_span())))
    }

    /// `def name "(" params ")" [ "->" test ] block`
    fn parse_function_def(&mut self, decorators: Vec<Expr>) -> PResult<FunctionDef> {
        self.expect(&TokenKind::Def)?;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_parameters(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen)?;
        let returns = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_test()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name,
            params,
            decorators,
            returns,
            body,
        })
    }

    /// `class name [ "(" args ")" ] block`
    fn parse_class_def(&mut self, decorators: Vec<Expr>) -> PResult<ClassDef> {
        self.expect(&TokenKind::Class)?;
        let name = self.expect_name()?;
        let (bases, keywords) = if self.eat(&TokenKind::LParen) {
            let args = self.parse_call_arguments()?;
            self.expect(&TokenKind::RParen)?;
            args
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.parse_block()?;
        Ok(ClassDef {
            name,
            bases,
            keywords,
            decorators,
            body,
        })
    }

    /// Parameter list up to (not including) `close`.
    ///
    /// Handles `/`, `*`, `*args`, `**kwargs`, defaults, and annotations
    /// when `annotated` is set.
    pub(crate) fn parse_parameters(
        &mut self,
        close: &TokenKind,
        annotated: bool,
    ) -> PResult<Parameters> {
        let mut params = Parameters::default();
        let mut seen_star = false;
        while !self.check_exact(close) {
            if self.eat(&TokenKind::Slash) {
                params.posonly.append(&mut params.args);
            } else if self.eat(&TokenKind::DoubleStar) {
                params.kwarg = Some(self.parse_param(annotated)?);
            } else if self.eat(&TokenKind::Star) {
                seen_star = true;
                if matches!(self.peek_kind(), TokenKind::Name(_)) {
                    params.vararg = Some(self.parse_param(annotated)?);
                }
            } else {
                let param = self.parse_param(annotated)?;
                if seen_star {
                    params.kwonly.push(param);
                } else {
                    params.args.push(param);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_param(&mut self, annotated: bool) -> PResult<Param> {
        let name = self.expect_name()?;
        let annotation = if annotated && self.eat(&TokenKind::Colon) {
            Some(self.parse_test()?)
        } else {
            None
        };
        let default = if self.eat(&TokenKind::Equal) {
            Some(self.parse_test()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            default,
        })
    }
}

fn aug_op(op: &str) -> BinOp {
    match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mult,
        "@" => BinOp::MatMult,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        "**" => BinOp::Pow,
        "<<" => BinOp::LShift,
        ">>" => BinOp::RShift,
        "|" => BinOp::BitOr,
        "^" => BinOp::BitXor,
        "&" => BinOp::BitAnd,
        _ => BinOp::FloorDiv,
    }
}

