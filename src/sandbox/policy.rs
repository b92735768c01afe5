//! Static policy checks over submitted source.
//!
//! The source is parsed into a Python AST and walked; nothing is compiled or
//! executed. Every check is a lookup of one identifier against one of the
//! [`Policy`] sets, so extending the policy never touches the walker.

use std::collections::HashSet;
use std::fmt;

use rustpython_parser::{ast, Parse};

/// Standard-library and data-science modules a submission may import.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "math",
    "random",
    "collections",
    "itertools",
    "functools",
    "operator",
    "string",
    "re",
    "json",
    "datetime",
    "typing",
    "dataclasses",
    "enum",
    "abc",
    "copy",
    "statistics",
    "fractions",
    "decimal",
    "textwrap",
    "pprint",
    // Data-science stack
    "numpy",
    "np",
    "sklearn",
    "pandas",
    "pd",
    "scipy",
];

/// Builtins a submission may not reference.
pub const DEFAULT_BLOCKED_CALLABLES: &[&str] = &[
    "__import__",
    "eval",
    "exec",
    "compile",
    "open",
    "getattr",
    "setattr",
    "delattr",
    "globals",
    "locals",
    "vars",
    "dir",
    "breakpoint",
    "input",
    "memoryview",
    "type",
];

/// Introspection attributes that reach class hierarchies, namespaces, code
/// objects or closures.
pub const DEFAULT_BLOCKED_ATTRIBUTES: &[&str] = &[
    "__subclasses__",
    "__bases__",
    "__mro__",
    "__builtins__",
    "__globals__",
    "__code__",
    "__closure__",
    "__func__",
    "__self__",
    "__module__",
    "__import__",
    "__loader__",
    "__spec__",
    "__qualname__",
];

/// The allow/deny sets a submission is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    allowed_modules: HashSet<String>,
    blocked_callables: HashSet<String>,
    blocked_attributes: HashSet<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allowed_modules: to_set(DEFAULT_ALLOWED_MODULES),
            blocked_callables: to_set(DEFAULT_BLOCKED_CALLABLES),
            blocked_attributes: to_set(DEFAULT_BLOCKED_ATTRIBUTES),
        }
    }
}

fn to_set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

impl Policy {
    /// Permit an additional top-level module.
    pub fn allow_module(mut self, name: impl Into<String>) -> Self {
        self.allowed_modules.insert(name.into());
        self
    }

    /// Block an additional builtin name.
    pub fn block_callable(mut self, name: impl Into<String>) -> Self {
        self.blocked_callables.insert(name.into());
        self
    }

    /// Block an additional attribute name (also matched against string literals).
    pub fn block_attribute(mut self, name: impl Into<String>) -> Self {
        self.blocked_attributes.insert(name.into());
        self
    }

    /// Whether importing `module` (possibly dotted) is permitted.
    pub fn is_module_allowed(&self, module: &str) -> bool {
        let top = module.split('.').next().unwrap_or(module);
        self.allowed_modules.contains(top)
    }

    /// Whether `name` is a blocked builtin.
    pub fn is_callable_blocked(&self, name: &str) -> bool {
        self.blocked_callables.contains(name)
    }

    /// Whether `name` is a blocked attribute.
    pub fn is_attribute_blocked(&self, name: &str) -> bool {
        self.blocked_attributes.contains(name)
    }

    /// Check `source` against this policy.
    ///
    /// Returns an empty list when the submission is accepted. A syntax error
    /// yields exactly one violation and no further checks run.
    pub fn validate(&self, source: &str) -> Vec<Violation> {
        let lines = LineIndex::new(source);

        let suite = match ast::Suite::parse(source, "<user>") {
            Ok(suite) => suite,
            Err(err) => {
                return vec![Violation {
                    kind: ViolationKind::Syntax,
                    message: format!("SyntaxError: {}", err.error),
                    line: lines.line_of(err.offset),
                }];
            }
        };

        let mut walker = PolicyWalker {
            policy: self,
            lines,
            violations: Vec::new(),
        };
        walker.visit_body(&suite);
        walker.violations
    }
}

/// What kind of construct a [`Violation`] was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// The source does not parse.
    Syntax,
    /// Import of a module outside the allow-list.
    Import,
    /// Reference to a blocked builtin.
    Callable,
    /// Access to a blocked attribute.
    Attribute,
    /// String literal equal to a blocked attribute name.
    StringLiteral,
}

/// A single policy breach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which check fired.
    pub kind: ViolationKind,
    /// Human-readable description, without location.
    pub message: String,
    /// 1-based line of the offending construct.
    pub line: usize,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

/// Byte offset to line number mapping.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    fn line_of(&self, offset: impl Into<u32>) -> usize {
        let offset = offset.into() as usize;
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(next) => next,
        }
    }
}

struct PolicyWalker<'a> {
    policy: &'a Policy,
    lines: LineIndex,
    violations: Vec<Violation>,
}

impl PolicyWalker<'_> {
    fn report(&mut self, kind: ViolationKind, message: String, offset: impl Into<u32>) {
        let line = self.lines.line_of(offset);
        self.violations.push(Violation {
            kind,
            message,
            line,
        });
    }

    fn visit_body(&mut self, body: &[ast::Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn visit_exprs(&mut self, exprs: &[ast::Expr]) {
        for expr in exprs {
            self.visit_expr(expr);
        }
    }

    fn visit_opt_expr(&mut self, expr: Option<&ast::Expr>) {
        if let Some(expr) = expr {
            self.visit_expr(expr);
        }
    }

    fn visit_stmt(&mut self, stmt: &ast::Stmt) {
        use ast::Stmt;

        match stmt {
            Stmt::Import(import) => {
                for alias in &import.names {
                    let module = alias.name.as_str();
                    if !self.policy.is_module_allowed(module) {
                        self.report(
                            ViolationKind::Import,
                            format!("Blocked import: '{module}' is not allowed"),
                            import.range.start(),
                        );
                    }
                }
            }
            Stmt::ImportFrom(import) => {
                if let Some(module) = &import.module {
                    let module = module.as_str();
                    if !self.policy.is_module_allowed(module) {
                        self.report(
                            ViolationKind::Import,
                            format!("Blocked import: 'from {module}' is not allowed"),
                            import.range.start(),
                        );
                    }
                }
            }
            Stmt::FunctionDef(ast::StmtFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            })
            | Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => {
                self.visit_exprs(decorator_list);
                self.visit_arguments(args);
                self.visit_opt_expr(returns.as_deref());
                self.visit_body(body);
            }
            Stmt::ClassDef(class) => {
                self.visit_exprs(&class.decorator_list);
                self.visit_exprs(&class.bases);
                for keyword in &class.keywords {
                    self.visit_expr(&keyword.value);
                }
                self.visit_body(&class.body);
            }
            Stmt::Return(ret) => self.visit_opt_expr(ret.value.as_deref()),
            Stmt::Delete(delete) => self.visit_exprs(&delete.targets),
            Stmt::Assign(assign) => {
                self.visit_exprs(&assign.targets);
                self.visit_expr(&assign.value);
            }
            Stmt::AugAssign(assign) => {
                self.visit_expr(&assign.target);
                self.visit_expr(&assign.value);
            }
            Stmt::AnnAssign(assign) => {
                self.visit_expr(&assign.target);
                self.visit_expr(&assign.annotation);
                self.visit_opt_expr(assign.value.as_deref());
            }
            Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            })
            | Stmt::AsyncFor(ast::StmtAsyncFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.visit_expr(target);
                self.visit_expr(iter);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            Stmt::While(ast::StmtWhile {
                test, body, orelse, ..
            })
            | Stmt::If(ast::StmtIf {
                test, body, orelse, ..
            }) => {
                self.visit_expr(test);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            Stmt::With(ast::StmtWith { items, body, .. })
            | Stmt::AsyncWith(ast::StmtAsyncWith { items, body, .. }) => {
                for item in items {
                    self.visit_expr(&item.context_expr);
                    self.visit_opt_expr(item.optional_vars.as_deref());
                }
                self.visit_body(body);
            }
            Stmt::Match(stmt) => {
                self.visit_expr(&stmt.subject);
                for case in &stmt.cases {
                    self.visit_pattern(&case.pattern);
                    self.visit_opt_expr(case.guard.as_deref());
                    self.visit_body(&case.body);
                }
            }
            Stmt::Raise(raise) => {
                self.visit_opt_expr(raise.exc.as_deref());
                self.visit_opt_expr(raise.cause.as_deref());
            }
            Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | Stmt::TryStar(ast::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.visit_body(body);
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.visit_opt_expr(handler.type_.as_deref());
                    self.visit_body(&handler.body);
                }
                self.visit_body(orelse);
                self.visit_body(finalbody);
            }
            Stmt::Assert(assert) => {
                self.visit_expr(&assert.test);
                self.visit_opt_expr(assert.msg.as_deref());
            }
            Stmt::Expr(expr) => self.visit_expr(&expr.value),
            // pass, break, continue, global, nonlocal, type aliases
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &ast::Expr) {
        use ast::Expr;

        match expr {
            Expr::Call(call) => {
                // A blocked callee is reported once, as a call, instead of
                // again as a bare name reference.
                match call.func.as_ref() {
                    Expr::Name(name) if self.policy.is_callable_blocked(name.id.as_str()) => {
                        self.report(
                            ViolationKind::Callable,
                            format!("Blocked builtin: '{}()' is not allowed", name.id.as_str()),
                            call.range.start(),
                        );
                    }
                    func => self.visit_expr(func),
                }
                self.visit_exprs(&call.args);
                for keyword in &call.keywords {
                    self.visit_expr(&keyword.value);
                }
            }
            Expr::Name(name) => {
                // Binding or deleting the name never reaches the builtin.
                let is_read = matches!(name.ctx, ast::ExprContext::Load);
                if is_read && self.policy.is_callable_blocked(name.id.as_str()) {
                    self.report(
                        ViolationKind::Callable,
                        format!(
                            "Blocked builtin: reference to '{}' is not allowed",
                            name.id.as_str()
                        ),
                        name.range.start(),
                    );
                }
            }
            Expr::Attribute(attr) => {
                if self.policy.is_attribute_blocked(attr.attr.as_str()) {
                    self.report(
                        ViolationKind::Attribute,
                        format!("Blocked attribute: '.{}' is not allowed", attr.attr.as_str()),
                        attr.range.start(),
                    );
                }
                self.visit_expr(&attr.value);
            }
            Expr::Constant(constant) => {
                self.visit_constant(&constant.value, constant.range.start());
            }
            Expr::BoolOp(op) => self.visit_exprs(&op.values),
            Expr::NamedExpr(named) => {
                self.visit_expr(&named.target);
                self.visit_expr(&named.value);
            }
            Expr::BinOp(op) => {
                self.visit_expr(&op.left);
                self.visit_expr(&op.right);
            }
            Expr::UnaryOp(op) => self.visit_expr(&op.operand),
            Expr::Lambda(lambda) => {
                self.visit_arguments(&lambda.args);
                self.visit_expr(&lambda.body);
            }
            Expr::IfExp(if_exp) => {
                self.visit_expr(&if_exp.test);
                self.visit_expr(&if_exp.body);
                self.visit_expr(&if_exp.orelse);
            }
            Expr::Dict(dict) => {
                for key in dict.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                self.visit_exprs(&dict.values);
            }
            Expr::Set(set) => self.visit_exprs(&set.elts),
            Expr::ListComp(ast::ExprListComp {
                elt, generators, ..
            })
            | Expr::SetComp(ast::ExprSetComp {
                elt, generators, ..
            })
            | Expr::GeneratorExp(ast::ExprGeneratorExp {
                elt, generators, ..
            }) => {
                self.visit_comprehensions(generators);
                self.visit_expr(elt);
            }
            Expr::DictComp(comp) => {
                self.visit_comprehensions(&comp.generators);
                self.visit_expr(&comp.key);
                self.visit_expr(&comp.value);
            }
            Expr::Await(ast::ExprAwait { value, .. })
            | Expr::YieldFrom(ast::ExprYieldFrom { value, .. })
            | Expr::Starred(ast::ExprStarred { value, .. }) => self.visit_expr(value),
            Expr::Yield(y) => self.visit_opt_expr(y.value.as_deref()),
            Expr::Compare(cmp) => {
                self.visit_expr(&cmp.left);
                self.visit_exprs(&cmp.comparators);
            }
            Expr::FormattedValue(value) => {
                self.visit_expr(&value.value);
                self.visit_opt_expr(value.format_spec.as_deref());
            }
            Expr::JoinedStr(joined) => self.visit_exprs(&joined.values),
            Expr::Subscript(sub) => {
                self.visit_expr(&sub.value);
                self.visit_expr(&sub.slice);
            }
            Expr::List(ast::ExprList { elts, .. }) | Expr::Tuple(ast::ExprTuple { elts, .. }) => {
                self.visit_exprs(elts)
            }
            Expr::Slice(slice) => {
                self.visit_opt_expr(slice.lower.as_deref());
                self.visit_opt_expr(slice.upper.as_deref());
                self.visit_opt_expr(slice.step.as_deref());
            }
        }
    }

    fn visit_constant(&mut self, constant: &ast::Constant, offset: impl Into<u32> + Copy) {
        match constant {
            ast::Constant::Str(value) if self.policy.is_attribute_blocked(value) => {
                self.report(
                    ViolationKind::StringLiteral,
                    format!("Blocked string reference to '{value}'"),
                    offset,
                );
            }
            ast::Constant::Tuple(items) => {
                for item in items {
                    self.visit_constant(item, offset);
                }
            }
            _ => {}
        }
    }

    fn visit_arguments(&mut self, args: &ast::Arguments) {
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            self.visit_opt_expr(arg.def.annotation.as_deref());
            self.visit_opt_expr(arg.default.as_deref());
        }
        for arg in args.vararg.iter().chain(&args.kwarg) {
            self.visit_opt_expr(arg.annotation.as_deref());
        }
    }

    fn visit_comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.visit_expr(&generator.target);
            self.visit_expr(&generator.iter);
            self.visit_exprs(&generator.ifs);
        }
    }

    fn visit_pattern(&mut self, pattern: &ast::Pattern) {
        use ast::Pattern;

        match pattern {
            Pattern::MatchValue(value) => self.visit_expr(&value.value),
            Pattern::MatchSequence(ast::PatternMatchSequence { patterns, .. })
            | Pattern::MatchOr(ast::PatternMatchOr { patterns, .. }) => {
                for pattern in patterns {
                    self.visit_pattern(pattern);
                }
            }
            Pattern::MatchMapping(mapping) => {
                self.visit_exprs(&mapping.keys);
                for pattern in &mapping.patterns {
                    self.visit_pattern(pattern);
                }
            }
            Pattern::MatchClass(class) => {
                self.visit_expr(&class.cls);
                for pattern in class.patterns.iter().chain(&class.kwd_patterns) {
                    self.visit_pattern(pattern);
                }
            }
            Pattern::MatchAs(ast::PatternMatchAs {
                pattern: Some(inner),
                ..
            }) => self.visit_pattern(inner),
            _ => {}
        }
    }
}
