//! Allowlist walker over the Python syntax tree.
//!
//! Entry point: [`Validator::check`].
//!
//! Two passes: the first collects every user function name at any depth,
//! the second walks the tree in source order and stops at the first
//! construct or call outside the allowlist. Every node kind maps to an
//! explicit accept or reject; the wildcard arms reject.
//!
//! Error codes emitted:
//! - E200–E219: rejected construct (import, class, assignment, ...)
//! - E220: primitive outside the exercise's command set
//! - E299: construct with no accept rule
//! - E100: `break`/`continue` outside a loop, `return` outside a function

use std::collections::HashSet;

use karel_types::ast::*;
use karel_types::{ErrorCode, KarelError, SourceFile, Span};
use karel_world::Primitive;

use crate::ValidationOptions;

/// The counting primitive allowed in `for` loop headers.
pub const RANGE: &str = "range";

type VResult = Result<(), KarelError>;

// ══════════════════════════════════════════════════════════════════════════════
// Validator
// ══════════════════════════════════════════════════════════════════════════════

/// Walks a parsed [`Module`] and rejects anything outside the Karel subset.
///
/// Holds no state beyond one call, so independent validations never
/// interfere.
pub struct Validator<'a> {
    source: &'a SourceFile,
    options: &'a ValidationOptions,
    /// Every `def` name in the program, from the first pass.
    user_functions: HashSet<String>,
    /// `def` names seen so far in the second pass.
    defined: HashSet<String>,
    in_loop: bool,
    in_function: bool,
}

impl<'a> Validator<'a> {
    pub fn new(source: &'a SourceFile, options: &'a ValidationOptions) -> Self {
        Self {
            source,
            options,
            user_functions: HashSet::new(),
            defined: HashSet::new(),
            in_loop: false,
            in_function: false,
        }
    }

    /// Validate a complete program.
    pub fn check(mut self, module: &Module) -> VResult {
        collect_function_names(&module.body, &mut self.user_functions);
        self.check_block(&module.body)
    }

    fn reject(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> KarelError {
        let source_line = self.source.line(span.start_line).unwrap_or("");
        KarelError::new(code, message, span, source_line)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    fn check_block(&mut self, body: &[Stmt]) -> VResult {
        body.iter().try_for_each(|stmt| self.check_stmt(stmt))
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> VResult {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Expr(expr) => self.check_expr(expr),
            StmtKind::Pass => Ok(()),
            StmtKind::If(stmt) => {
                self.check_expr(&stmt.test)?;
                self.check_block(&stmt.body)?;
                self.check_block(&stmt.orelse)
            }
            StmtKind::While(stmt) => {
                self.check_expr(&stmt.test)?;
                self.check_loop_body(&stmt.body, &stmt.orelse, "while")
            }
            StmtKind::For(stmt) => self.check_for(stmt, span),
            StmtKind::FunctionDef(def) => self.check_function_def(def, span),
            StmtKind::Break | StmtKind::Continue => {
                if self.in_loop {
                    Ok(())
                } else {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    Err(self.reject(
                        ErrorCode::UNEXPECTED_TOKEN,
                        format!("'{keyword}' outside loop"),
                        span,
                    ))
                }
            }
            StmtKind::Return(value) => {
                if !self.in_function {
                    return Err(self.reject(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "'return' outside function",
                        span,
                    ));
                }
                match value {
                    Some(expr) => self.check_expr(expr),
                    None => Ok(()),
                }
            }

            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => Err(self
                .reject(
                    ErrorCode::IMPORT_NOT_ALLOWED,
                    "Import statements are not allowed",
                    span,
                )
                .with_suggestion("Karel's commands are already available; remove the import")),
            StmtKind::ClassDef(def) => Err(self.reject(
                ErrorCode::CLASS_NOT_ALLOWED,
                format!("Class definitions are not allowed (class '{}')", def.name.name),
                span,
            )),
            StmtKind::Assign { .. } => Err(self.assignment_error(span)),
            StmtKind::AugAssign { op, .. } => Err(self.reject(
                ErrorCode::ASSIGNMENT_NOT_ALLOWED,
                format!(
                    "Augmented assignment ('{}=') is not allowed: Karel programs cannot use variables",
                    op.as_str()
                ),
                span,
            )),
            StmtKind::AnnAssign { .. } => Err(self.reject(
                ErrorCode::ASSIGNMENT_NOT_ALLOWED,
                "Annotated assignment is not allowed: Karel programs cannot use variables",
                span,
            )),
            StmtKind::Delete(_) => Err(self.reject(
                ErrorCode::DELETE_NOT_ALLOWED,
                "'del' statements are not allowed",
                span,
            )),
            StmtKind::Try(_) => Err(self.reject(
                ErrorCode::EXCEPTION_HANDLING_NOT_ALLOWED,
                "Exception handling (try/except/finally) is not allowed",
                span,
            )),
            StmtKind::Raise { .. } => Err(self.reject(
                ErrorCode::EXCEPTION_HANDLING_NOT_ALLOWED,
                "'raise' statements are not allowed",
                span,
            )),
            StmtKind::Assert { .. } => Err(self.reject(
                ErrorCode::UNSUPPORTED_CONSTRUCT,
                "'assert' statements are not allowed",
                span,
            )),
            StmtKind::With(_) => Err(self.reject(
                ErrorCode::WITH_NOT_ALLOWED,
                "'with' statements are not allowed",
                span,
            )),
            StmtKind::AsyncFunctionDef(_) => Err(self.async_error("async functions", span)),
            StmtKind::AsyncFor(_) => Err(self.async_error("async for loops", span)),
            StmtKind::AsyncWith(_) => Err(self.async_error("async with statements", span)),
            StmtKind::Global(_) => Err(self.reject(
                ErrorCode::SCOPE_DECLARATION_NOT_ALLOWED,
                "'global' declarations are not allowed",
                span,
            )),
            StmtKind::Nonlocal(_) => Err(self.reject(
                ErrorCode::SCOPE_DECLARATION_NOT_ALLOWED,
                "'nonlocal' declarations are not allowed",
                span,
            )),
            _ => Err(self.unsupported(span)),
        }
    }

    fn assignment_error(&self, span: Span) -> KarelError {
        self.reject(
            ErrorCode::ASSIGNMENT_NOT_ALLOWED,
            "Variable assignment is not allowed: Karel programs cannot use variables",
            span,
        )
        .with_suggestion("Use sensors like front_is_clear() directly in conditions")
    }

    fn async_error(&self, what: &str, span: Span) -> KarelError {
        self.reject(
            ErrorCode::ASYNC_NOT_ALLOWED,
            format!("Asynchronous code ({what}) is not allowed"),
            span,
        )
    }

    fn unsupported(&self, span: Span) -> KarelError {
        self.reject(
            ErrorCode::UNSUPPORTED_CONSTRUCT,
            "This Python feature is not supported in Karel programs",
            span,
        )
    }

    /// `for NAME in range(...)` with no `else`.
    fn check_for(&mut self, stmt: &ForStmt, span: Span) -> VResult {
        let Some(target) = stmt.target.as_name() else {
            return Err(self.reject(
                ErrorCode::ASSIGNMENT_NOT_ALLOWED,
                "A for loop must use a single loop variable, like 'for i in range(3):'",
                stmt.target.span,
            ));
        };
        if is_reserved(target) {
            return Err(self
                .reject(
                    ErrorCode::RESERVED_NAME,
                    format!("'{target}' is a built-in command and cannot be a loop variable"),
                    stmt.target.span,
                )
                .with_suggestion("Use a plain name like 'i' for the loop variable"));
        }
        let ExprKind::Call {
            func,
            args,
            keywords,
        } = &stmt.iter.kind
        else {
            return Err(self.range_only_error(span));
        };
        if func.as_name() != Some(RANGE) {
            return Err(self.range_only_error(span));
        }
        self.check_call_shape(RANGE, args, keywords, stmt.iter.span)?;
        if args.is_empty() || args.len() > 3 {
            return Err(self.reject(
                ErrorCode::WRONG_ARG_COUNT,
                format!("range() takes 1 to 3 arguments, got {}", args.len()),
                stmt.iter.span,
            ));
        }
        for arg in args {
            self.check_expr(arg)?;
        }
        self.check_loop_body(&stmt.body, &stmt.orelse, "for")
    }

    fn range_only_error(&self, span: Span) -> KarelError {
        self.reject(
            ErrorCode::LOOP_NOT_ALLOWED,
            "for loops can only count with range(), like 'for i in range(4):'",
            span,
        )
    }

    fn check_loop_body(&mut self, body: &[Stmt], orelse: &[Stmt], keyword: &str) -> VResult {
        let was_in_loop = std::mem::replace(&mut self.in_loop, true);
        let result = self.check_block(body);
        self.in_loop = was_in_loop;
        result?;
        if let Some(first) = orelse.first() {
            return Err(self.reject(
                ErrorCode::LOOP_NOT_ALLOWED,
                format!("'{keyword}' loops cannot have an 'else' clause"),
                first.span,
            ));
        }
        Ok(())
    }

    /// `def name():` with nothing but a body.
    fn check_function_def(&mut self, def: &FunctionDef, span: Span) -> VResult {
        let name = def.name.name.as_str();
        if !def.decorators.is_empty() {
            return Err(self.reject(
                ErrorCode::DECORATOR_NOT_ALLOWED,
                format!("Decorators are not allowed on function '{name}'"),
                def.decorators[0].span,
            ));
        }
        if is_reserved(name) {
            return Err(self
                .reject(
                    ErrorCode::RESERVED_NAME,
                    format!("'{name}' is a built-in command and cannot be redefined"),
                    span,
                )
                .with_suggestion("Choose a different name for your function"));
        }
        if !def.params.is_empty() {
            return Err(self
                .reject(
                    ErrorCode::PARAMETERS_NOT_ALLOWED,
                    format!(
                        "Function '{name}' has parameters: Karel functions cannot take parameters"
                    ),
                    span,
                )
                .with_suggestion(format!("Define it as 'def {name}():'")));
        }
        if let Some(returns) = &def.returns {
            return Err(self.reject(
                ErrorCode::UNSUPPORTED_CONSTRUCT,
                format!("Return annotations are not allowed on function '{name}'"),
                returns.span,
            ));
        }
        if !self.defined.insert(name.to_string()) {
            return Err(self.reject(
                ErrorCode::DUPLICATE_FUNCTION,
                format!("Function '{name}' is already defined"),
                span,
            ));
        }

        let was_in_loop = std::mem::replace(&mut self.in_loop, false);
        let was_in_function = std::mem::replace(&mut self.in_function, true);
        let result = self.check_block(&def.body);
        self.in_loop = was_in_loop;
        self.in_function = was_in_function;
        result
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    fn check_expr(&mut self, expr: &Expr) -> VResult {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Name(name) => {
                if self.is_callable(name) {
                    Err(self
                        .reject(
                            ErrorCode::CALL_NOT_ALLOWED,
                            format!("'{name}' is a command and must be called with ()"),
                            span,
                        )
                        .with_suggestion(format!("Write {name}()")))
                } else {
                    Ok(())
                }
            }
            ExprKind::Constant(constant) => match constant {
                Constant::None | Constant::Bool(_) | Constant::Int(_) | Constant::Str(_) => Ok(()),
                other => Err(self.reject(
                    ErrorCode::UNSUPPORTED_CONSTRUCT,
                    format!("{} values are not supported", other.type_name()),
                    span,
                )),
            },
            ExprKind::BoolOp { values, .. } => {
                values.iter().try_for_each(|value| self.check_expr(value))
            }
            ExprKind::UnaryOp { op, operand } => match op {
                UnaryOp::Not | UnaryOp::USub | UnaryOp::UAdd => self.check_expr(operand),
                UnaryOp::Invert => Err(self.reject(
                    ErrorCode::UNSUPPORTED_CONSTRUCT,
                    "Bitwise operator '~' is not supported",
                    span,
                )),
            },
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                if let Some(op) = ops.iter().find(|op| {
                    matches!(op, CmpOp::Is | CmpOp::IsNot | CmpOp::In | CmpOp::NotIn)
                }) {
                    return Err(self.reject(
                        ErrorCode::UNSUPPORTED_CONSTRUCT,
                        format!("Comparison operator '{}' is not supported", op.as_str()),
                        span,
                    ));
                }
                self.check_expr(left)?;
                comparators.iter().try_for_each(|c| self.check_expr(c))
            }
            ExprKind::BinOp { left, op, right } => match op {
                BinOp::Add | BinOp::Sub | BinOp::Mult | BinOp::FloorDiv | BinOp::Mod => {
                    self.check_expr(left)?;
                    self.check_expr(right)
                }
                BinOp::Div => Err(self
                    .reject(
                        ErrorCode::UNSUPPORTED_CONSTRUCT,
                        "Division with '/' is not supported",
                        span,
                    )
                    .with_suggestion("Use '//' for whole-number division")),
                other => Err(self.reject(
                    ErrorCode::UNSUPPORTED_CONSTRUCT,
                    format!("Operator '{}' is not supported", other.as_str()),
                    span,
                )),
            },
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.check_call(func, args, keywords, span),

            ExprKind::NamedExpr { .. } => Err(self.assignment_error(span)),
            ExprKind::Lambda { .. } => Err(self.reject(
                ErrorCode::LAMBDA_NOT_ALLOWED,
                "Lambda functions are not allowed",
                span,
            )),
            ExprKind::IfExp { .. } => Err(self
                .reject(
                    ErrorCode::UNSUPPORTED_CONSTRUCT,
                    "Conditional expressions ('a if b else c') are not supported",
                    span,
                )
                .with_suggestion("Use an if/else statement instead")),
            ExprKind::List(_) | ExprKind::Tuple(_) | ExprKind::Set(_) | ExprKind::Dict { .. } => {
                Err(self.reject(
                    ErrorCode::COLLECTION_NOT_ALLOWED,
                    "Lists, tuples, sets and dictionaries are not allowed",
                    span,
                ))
            }
            ExprKind::ListComp { .. }
            | ExprKind::SetComp { .. }
            | ExprKind::DictComp { .. }
            | ExprKind::GeneratorExp { .. } => Err(self.reject(
                ErrorCode::COLLECTION_NOT_ALLOWED,
                "Comprehensions and generator expressions are not allowed",
                span,
            )),
            ExprKind::Subscript { .. } | ExprKind::Slice { .. } => Err(self.reject(
                ErrorCode::SUBSCRIPT_NOT_ALLOWED,
                "Indexing and slicing are not allowed",
                span,
            )),
            ExprKind::Attribute { attr, .. } => Err(self.reject(
                ErrorCode::ATTRIBUTE_NOT_ALLOWED,
                format!("Attribute access ('.{}') is not allowed", attr.name),
                span,
            )),
            ExprKind::Await(_) => Err(self.async_error("await", span)),
            ExprKind::Yield(_) | ExprKind::YieldFrom(_) => Err(self.reject(
                ErrorCode::YIELD_NOT_ALLOWED,
                "'yield' is not allowed",
                span,
            )),
            ExprKind::FormattedString(_) => Err(self.reject(
                ErrorCode::UNSUPPORTED_CONSTRUCT,
                "f-strings are not supported",
                span,
            )),
            ExprKind::Starred(_) => Err(self.reject(
                ErrorCode::UNSUPPORTED_CONSTRUCT,
                "Starred expressions ('*x') are not supported",
                span,
            )),
            _ => Err(self.unsupported(span)),
        }
    }

    fn check_call(&mut self, func: &Expr, args: &[Expr], keywords: &[Keyword], span: Span) -> VResult {
        if let ExprKind::Attribute { .. } = func.kind {
            return self.check_expr(func);
        }
        let Some(name) = func.as_name() else {
            return Err(self.reject(
                ErrorCode::CALL_NOT_ALLOWED,
                "Only robot commands and your own functions can be called",
                span,
            ));
        };
        self.check_call_shape(name, args, keywords, span)?;

        if let Some(primitive) = Primitive::from_name(name) {
            if !self.options.allows(primitive.name()) {
                return Err(self
                    .reject(
                        ErrorCode::COMMAND_NOT_AVAILABLE,
                        format!("'{name}()' is not available in this exercise"),
                        span,
                    )
                    .with_suggestion(self.options.available_hint()));
            }
            return self.expect_no_args(name, args, span);
        }
        if self.user_functions.contains(name) {
            return self.expect_no_args(name, args, span);
        }
        if name == RANGE {
            return Err(self.reject(
                ErrorCode::CALL_NOT_ALLOWED,
                "range() can only be used in a for loop header",
                span,
            ));
        }
        Err(self
            .reject(
                ErrorCode::CALL_NOT_ALLOWED,
                format!("'{name}()' is not allowed: you can only call robot commands and functions you define"),
                span,
            )
            .with_suggestion("Check the spelling, or define it with 'def'"))
    }

    /// Rejects keyword and starred arguments for any callee.
    fn check_call_shape(&self, name: &str, args: &[Expr], keywords: &[Keyword], span: Span) -> VResult {
        if let Some(keyword) = keywords.first() {
            let message = match &keyword.arg {
                Some(arg) => format!("Keyword argument '{}' is not allowed in call to '{name}()'", arg.name),
                None => format!("'**' arguments are not allowed in call to '{name}()'"),
            };
            return Err(self.reject(ErrorCode::CALL_NOT_ALLOWED, message, keyword.span));
        }
        if let Some(starred) = args.iter().find(|a| matches!(a.kind, ExprKind::Starred(_))) {
            return Err(self.reject(
                ErrorCode::UNSUPPORTED_CONSTRUCT,
                format!("Starred arguments are not allowed in call to '{name}()'"),
                starred.span.merge(span),
            ));
        }
        Ok(())
    }

    fn expect_no_args(&self, name: &str, args: &[Expr], span: Span) -> VResult {
        if args.is_empty() {
            Ok(())
        } else {
            Err(self.reject(
                ErrorCode::WRONG_ARG_COUNT,
                format!("{name}() takes no arguments ({} given)", args.len()),
                span,
            ))
        }
    }

    /// Names that hold functions: using them without `()` is a mistake.
    fn is_callable(&self, name: &str) -> bool {
        name == RANGE || Primitive::from_name(name).is_some() || self.user_functions.contains(name)
    }
}

/// A `def` may not reuse a primitive's name or `range`.
fn is_reserved(name: &str) -> bool {
    name == RANGE || Primitive::from_name(name).is_some()
}

/// First pass: every `def` name, however deeply nested.
fn collect_function_names(body: &[Stmt], names: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                names.insert(def.name.name.clone());
                collect_function_names(&def.body, names);
            }
            StmtKind::If(s) => {
                collect_function_names(&s.body, names);
                collect_function_names(&s.orelse, names);
            }
            StmtKind::While(s) => {
                collect_function_names(&s.body, names);
                collect_function_names(&s.orelse, names);
            }
            StmtKind::For(s) => {
                collect_function_names(&s.body, names);
                collect_function_names(&s.orelse, names);
            }
            // Everything else is rejected by the second pass
            _ => {}
        }
    }
}
