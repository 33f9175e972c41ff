//! Constant folding over expressions.
//!
//! Only literals, arithmetic on literals, a fixed table of well-known
//! constants (`StatusCode::*`, `Method::*`) and references to declared
//! `const` items are evaluated. Everything else yields `None`, which callers
//! treat as "unknown" and fall back from.

use crate::index::{ConstDecl, TypeIndex, TypePath};
use syn::visit::Visit;
use syn::{BinOp, Expr, Lit, UnOp};

const MAX_DEPTH: usize = 16;

/// A folded constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Evaluates expressions in the scope of one module (and optional impl).
pub struct Evaluator<'a> {
    index: &'a TypeIndex,
    module: &'a [String],
    self_ty: Option<&'a str>,
}

impl<'a> Evaluator<'a> {
    pub fn new(index: &'a TypeIndex, module: &'a [String], self_ty: Option<&'a str>) -> Self {
        Self {
            index,
            module,
            self_ty,
        }
    }

    pub fn eval(&self, expr: &Expr) -> Option<Value> {
        self.eval_depth(expr, 0)
    }

    pub fn eval_str(&self, expr: &Expr) -> Option<String> {
        match self.eval(expr)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn eval_int(&self, expr: &Expr) -> Option<i64> {
        self.eval(expr)?.as_int()
    }

    fn eval_depth(&self, expr: &Expr, depth: usize) -> Option<Value> {
        if depth > MAX_DEPTH {
            return None;
        }
        match expr {
            Expr::Lit(lit) => eval_lit(&lit.lit),
            Expr::Paren(p) => self.eval_depth(&p.expr, depth + 1),
            Expr::Group(g) => self.eval_depth(&g.expr, depth + 1),
            Expr::Reference(r) => self.eval_depth(&r.expr, depth + 1),
            Expr::Cast(c) => self.eval_depth(&c.expr, depth + 1),
            Expr::Block(b) if b.block.stmts.len() == 1 => match &b.block.stmts[0] {
                syn::Stmt::Expr(inner, None) => self.eval_depth(inner, depth + 1),
                _ => None,
            },
            Expr::Unary(u) => match (&u.op, self.eval_depth(&u.expr, depth + 1)?) {
                (UnOp::Neg(_), Value::Int(i)) => i.checked_neg().map(Value::Int),
                (UnOp::Not(_), Value::Bool(b)) => Some(Value::Bool(!b)),
                _ => None,
            },
            Expr::Binary(b) => {
                let left = self.eval_depth(&b.left, depth + 1)?;
                let right = self.eval_depth(&b.right, depth + 1)?;
                match (left, right) {
                    (Value::Int(l), Value::Int(r)) => match b.op {
                        BinOp::Add(_) => l.checked_add(r).map(Value::Int),
                        BinOp::Sub(_) => l.checked_sub(r).map(Value::Int),
                        BinOp::Mul(_) => l.checked_mul(r).map(Value::Int),
                        BinOp::Div(_) => l.checked_div(r).map(Value::Int),
                        _ => None,
                    },
                    _ => None,
                }
            }
            Expr::Path(p) => {
                let segments: Vec<String> =
                    p.path.segments.iter().map(|s| s.ident.to_string()).collect();
                self.eval_path(&segments, depth)
            }
            // "x".to_string(), "x".into(), "x".to_owned()
            Expr::MethodCall(m)
                if m.args.is_empty()
                    && matches!(m.method.to_string().as_str(), "to_string" | "into" | "to_owned") =>
            {
                self.eval_depth(&m.receiver, depth + 1)
            }
            // String::from("x"), StatusCode::from_u16(201)
            Expr::Call(c) if c.args.len() == 1 => {
                let name = call_name(c)?;
                if matches!(name.as_str(), "from" | "from_u16" | "new" | "Some") {
                    self.eval_depth(&c.args[0], depth + 1)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn eval_path(&self, segments: &[String], depth: usize) -> Option<Value> {
        if let [.., owner, last] = segments {
            if owner == "StatusCode" {
                if let Some(code) = status_code_constant(last) {
                    return Some(Value::Int(code as i64));
                }
            }
            if owner == "Method" {
                let upper = last.to_uppercase();
                if is_http_method(&upper) {
                    return Some(Value::Str(upper));
                }
            }
        }
        let mut lookup = segments.to_vec();
        if lookup.first().map(String::as_str) == Some("Self") {
            lookup[0] = self.self_ty?.to_string();
        }
        let decl = self.index.find_const(&lookup, self.module)?;
        self.eval_const(decl, depth + 1)
    }

    fn eval_const(&self, decl: &ConstDecl, depth: usize) -> Option<Value> {
        let scoped = Evaluator {
            index: self.index,
            module: &decl.module,
            self_ty: decl.self_ty.as_deref(),
        };
        scoped.eval_depth(&decl.expr, depth)
    }

    /// Folds a literal `code -> status` map, tolerating a few construction styles:
    /// `HashMap::from([(k, v), ..])`, `[(k, v), ..].into_iter().collect()`,
    /// `vec![(k, v)].into_iter().collect()` and `hashmap! { k => v }`.
    pub fn literal_map(&self, expr: &Expr) -> Option<Vec<(i64, i64)>> {
        match expr {
            Expr::Call(c) if c.args.len() == 1 => {
                let name = call_name(c)?;
                if name == "from" || name == "from_iter" {
                    self.literal_pairs(&c.args[0])
                } else {
                    None
                }
            }
            Expr::MethodCall(m) if m.method == "collect" || m.method == "into_iter" || m.method == "into" => {
                self.literal_map(&m.receiver)
                    .or_else(|| self.literal_pairs(&m.receiver))
            }
            Expr::Macro(m) => {
                let pairs = m
                    .mac
                    .parse_body_with(
                        syn::punctuated::Punctuated::<MapEntry, syn::Token![,]>::parse_terminated,
                    )
                    .ok()?;
                pairs
                    .iter()
                    .map(|entry| Some((self.eval_int(&entry.key)?, self.eval_int(&entry.value)?)))
                    .collect()
            }
            Expr::Paren(p) => self.literal_map(&p.expr),
            Expr::Block(b) => match b.block.stmts.last() {
                Some(syn::Stmt::Expr(inner, None)) => self.literal_map(inner),
                _ => None,
            },
            _ => None,
        }
    }

    fn literal_pairs(&self, expr: &Expr) -> Option<Vec<(i64, i64)>> {
        let elems = match expr {
            Expr::Array(a) => a.elems.iter().collect::<Vec<_>>(),
            Expr::Reference(r) => return self.literal_pairs(&r.expr),
            Expr::Macro(m) if m.mac.path.is_ident("vec") => {
                let parsed = m
                    .mac
                    .parse_body_with(syn::punctuated::Punctuated::<Expr, syn::Token![,]>::parse_terminated)
                    .ok()?;
                return parsed
                    .iter()
                    .map(|e| self.pair(e))
                    .collect();
            }
            _ => return None,
        };
        elems.into_iter().map(|e| self.pair(e)).collect()
    }

    fn pair(&self, expr: &Expr) -> Option<(i64, i64)> {
        match expr {
            Expr::Tuple(t) if t.elems.len() == 2 => {
                Some((self.eval_int(&t.elems[0])?, self.eval_int(&t.elems[1])?))
            }
            _ => None,
        }
    }
}

/// `key => value` entry inside a map literal macro.
struct MapEntry {
    key: Expr,
    value: Expr,
}

impl syn::parse::Parse for MapEntry {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let key: Expr = input.parse()?;
        input.parse::<syn::Token![=>]>()?;
        let value: Expr = input.parse()?;
        Ok(MapEntry { key, value })
    }
}

fn eval_lit(lit: &Lit) -> Option<Value> {
    match lit {
        Lit::Str(s) => Some(Value::Str(s.value())),
        Lit::Int(i) => i.base10_parse::<i64>().ok().map(Value::Int),
        Lit::Bool(b) => Some(Value::Bool(b.value)),
        Lit::Char(c) => Some(Value::Str(c.value().to_string())),
        _ => None,
    }
}

/// Last segment of the callee path of a call expression.
pub fn call_name(call: &syn::ExprCall) -> Option<String> {
    match &*call.func {
        Expr::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// All segments of the callee path of a call expression.
pub fn call_path(call: &syn::ExprCall) -> Option<Vec<String>> {
    match &*call.func {
        Expr::Path(p) => Some(p.path.segments.iter().map(|s| s.ident.to_string()).collect()),
        _ => None,
    }
}

/// Type constructed by an operator-style expression: `Foo`, `Foo { .. }`,
/// `Foo::default()`, `Foo::new(..)`, and any of those behind `&`, parens,
/// `Box::new`/`Arc::new`/`Rc::new` or `.into()`.
pub fn constructed_type(expr: &Expr) -> Option<TypePath> {
    match expr {
        Expr::Path(p) => {
            let path = TypePath::from(&p.path);
            if starts_uppercase(path.name()) {
                Some(path)
            } else {
                None
            }
        }
        Expr::Struct(s) => Some(TypePath::from(&s.path)),
        Expr::Reference(r) => constructed_type(&r.expr),
        Expr::Paren(p) => constructed_type(&p.expr),
        Expr::Group(g) => constructed_type(&g.expr),
        Expr::MethodCall(m) if m.method == "into" || m.method == "clone" => {
            constructed_type(&m.receiver)
        }
        Expr::Call(c) => {
            let segments = call_path(c)?;
            let (ctor, owner) = segments.split_last()?;
            let owner_name = owner.last()?;
            if matches!(owner_name.as_str(), "Box" | "Arc" | "Rc") && c.args.len() == 1 {
                return constructed_type(&c.args[0]);
            }
            if starts_uppercase(owner_name) && !starts_uppercase(ctor) {
                Some(TypePath {
                    segments: owner.to_vec(),
                    args: Vec::new(),
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

pub fn is_http_method(method: &str) -> bool {
    matches!(
        method,
        "GET" | "POST" | "PUT" | "DELETE" | "PATCH" | "HEAD" | "OPTIONS" | "TRACE"
    )
}

/// Numeric value of a well-known `StatusCode::*` constant.
pub fn status_code_constant(name: &str) -> Option<u16> {
    let code = match name {
        "CONTINUE" => 100,
        "SWITCHING_PROTOCOLS" => 101,
        "OK" => 200,
        "CREATED" => 201,
        "ACCEPTED" => 202,
        "NO_CONTENT" => 204,
        "PARTIAL_CONTENT" => 206,
        "MOVED_PERMANENTLY" => 301,
        "FOUND" => 302,
        "SEE_OTHER" => 303,
        "NOT_MODIFIED" => 304,
        "TEMPORARY_REDIRECT" => 307,
        "PERMANENT_REDIRECT" => 308,
        "BAD_REQUEST" => 400,
        "UNAUTHORIZED" => 401,
        "PAYMENT_REQUIRED" => 402,
        "FORBIDDEN" => 403,
        "NOT_FOUND" => 404,
        "METHOD_NOT_ALLOWED" => 405,
        "NOT_ACCEPTABLE" => 406,
        "REQUEST_TIMEOUT" => 408,
        "CONFLICT" => 409,
        "GONE" => 410,
        "PRECONDITION_FAILED" => 412,
        "PAYLOAD_TOO_LARGE" => 413,
        "UNSUPPORTED_MEDIA_TYPE" => 415,
        "UNPROCESSABLE_ENTITY" => 422,
        "LOCKED" => 423,
        "TOO_MANY_REQUESTS" => 429,
        "INTERNAL_SERVER_ERROR" => 500,
        "NOT_IMPLEMENTED" => 501,
        "BAD_GATEWAY" => 502,
        "SERVICE_UNAVAILABLE" => 503,
        "GATEWAY_TIMEOUT" => 504,
        _ => return None,
    };
    Some(code)
}

/// Expressions a block can evaluate to: the tail expression (looking through
/// nested blocks, `if`/`match` arms and `Ok(..)`/`Some(..)`) plus every
/// `return` expression, closures excluded.
pub fn returned_exprs(block: &syn::Block) -> Vec<&Expr> {
    struct Returns<'ast> {
        found: Vec<&'ast Expr>,
    }

    impl<'ast> Visit<'ast> for Returns<'ast> {
        fn visit_expr_return(&mut self, node: &'ast syn::ExprReturn) {
            if let Some(expr) = &node.expr {
                collect_tail(expr, &mut self.found);
            }
            syn::visit::visit_expr_return(self, node);
        }

        fn visit_expr_closure(&mut self, _node: &'ast syn::ExprClosure) {}
    }

    let mut visitor = Returns { found: Vec::new() };
    if let Some(syn::Stmt::Expr(tail, None)) = block.stmts.last() {
        collect_tail(tail, &mut visitor.found);
    }
    visitor.visit_block(block);
    visitor.found
}

fn collect_tail<'ast>(expr: &'ast Expr, out: &mut Vec<&'ast Expr>) {
    match expr {
        Expr::Block(b) => {
            if let Some(syn::Stmt::Expr(tail, None)) = b.block.stmts.last() {
                collect_tail(tail, out);
            }
        }
        Expr::Unsafe(u) => {
            if let Some(syn::Stmt::Expr(tail, None)) = u.block.stmts.last() {
                collect_tail(tail, out);
            }
        }
        Expr::If(i) => {
            if let Some(syn::Stmt::Expr(tail, None)) = i.then_branch.stmts.last() {
                collect_tail(tail, out);
            }
            if let Some((_, else_branch)) = &i.else_branch {
                collect_tail(else_branch, out);
            }
        }
        Expr::Match(m) => {
            for arm in &m.arms {
                collect_tail(&arm.body, out);
            }
        }
        Expr::Paren(p) => collect_tail(&p.expr, out),
        Expr::Return(_) => {}
        Expr::Call(c) if c.args.len() == 1 && matches!(call_name(c).as_deref(), Some("Ok" | "Some")) => {
            collect_tail(&c.args[0], out)
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedFile;

    fn index(code: &str) -> TypeIndex {
        TypeIndex::new(&[ParsedFile::from_source("src/consts.rs", code).unwrap()])
    }

    fn expr(code: &str) -> Expr {
        syn::parse_str(code).unwrap()
    }

    #[test]
    fn test_literals_and_arithmetic() {
        let index = index("");
        let module = vec!["consts".to_string()];
        let eval = Evaluator::new(&index, &module, None);
        assert_eq!(eval.eval_int(&expr("404 * 1_000_000 + 1")), Some(404_000_001));
        assert_eq!(eval.eval_str(&expr("\"text/csv\".to_string()")).as_deref(), Some("text/csv"));
        assert_eq!(eval.eval_int(&expr("StatusCode::CREATED")), Some(201));
        assert_eq!(eval.eval_str(&expr("http::Method::POST")).as_deref(), Some("POST"));
        assert_eq!(eval.eval(&expr("some_runtime_value()")), None);
    }

    #[test]
    fn test_overflowing_arithmetic_is_not_constant() {
        let index = index("");
        let module = Vec::new();
        let eval = Evaluator::new(&index, &module, None);
        assert_eq!(eval.eval_int(&expr("-(-9223372036854775807 - 1)")), None);
        assert_eq!(eval.eval_int(&expr("(-9223372036854775807 - 1) / -1")), None);
        assert_eq!(eval.eval_int(&expr("7 / 0")), None);
        assert_eq!(eval.eval_int(&expr("-(3)")), Some(-3));
    }

    #[test]
    fn test_const_folding_across_items() {
        let index = index(
            r#"
            pub const PREFIX: &str = "/users";
            pub const BASE: i64 = 400;
            pub struct Codes;
            impl Codes {
                pub const INVALID: i64 = BASE * 1_000_000 + 2;
            }
            "#,
        );
        let module = vec!["consts".to_string()];
        let eval = Evaluator::new(&index, &module, None);
        assert_eq!(eval.eval_str(&expr("PREFIX")).as_deref(), Some("/users"));
        assert_eq!(eval.eval_int(&expr("Codes::INVALID")), Some(400_000_002));
    }

    #[test]
    fn test_literal_maps() {
        let index = index("");
        let module = Vec::new();
        let eval = Evaluator::new(&index, &module, None);
        assert_eq!(
            eval.literal_map(&expr("HashMap::from([(400000001, 400), (500000001, 503)])")),
            Some(vec![(400000001, 400), (500000001, 503)])
        );
        assert_eq!(
            eval.literal_map(&expr("[(1, 418)].into_iter().collect()")),
            Some(vec![(1, 418)])
        );
        assert_eq!(
            eval.literal_map(&expr("hashmap! { 7 => 409 }")),
            Some(vec![(7, 409)])
        );
        assert_eq!(eval.literal_map(&expr("load_codes()")), None);
    }

    #[test]
    fn test_returned_exprs() {
        let block: syn::Block = syn::parse_str(
            r#"{
                if missing { return Err(StatusErr::NotFound.into()); }
                let f = || 5;
                match kind {
                    A => Ok(Response::new(a)),
                    B => Ok(other()),
                }
            }"#,
        )
        .unwrap();
        let found = returned_exprs(&block);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_constructed_type() {
        let name = |src: &str| constructed_type(&expr(src)).map(|p| p.to_string());
        assert_eq!(name("ListUsers"), Some("ListUsers".to_string()));
        assert_eq!(name("&users::GetUser { id: 0 }"), Some("users::GetUser".to_string()));
        assert_eq!(name("Box::new(Auth::default())"), Some("Auth".to_string()));
        assert_eq!(name("(Formatter::new()).into()"), Some("Formatter".to_string()));
        assert_eq!(name("handler"), None);
        assert_eq!(name("build_handler()"), None);
    }
}
