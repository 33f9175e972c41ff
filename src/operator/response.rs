//! Success-response inference for the produce-output method.
//!
//! Returned expressions are read as builder chains. Each recognized call
//! overrides one part of the response; whatever the chain leaves open is
//! taken from the declared return type.

use crate::eval::{call_path, returned_exprs, Evaluator};
use crate::index::{FnDecl, TypeExpr};
use log::debug;
use syn::{Expr, GenericArgument};

pub const JSON: &str = "application/json";
pub const TEXT: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Overrides collected from one builder chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainRules {
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub schema: Option<TypeExpr>,
    /// `(file name, content type)` of an `Attachment::new` call
    pub attachment: Option<(String, String)>,
}

impl ChainRules {
    fn is_empty(&self) -> bool {
        *self == ChainRules::default()
    }
}

/// What the declared return type says about the response.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnShape {
    /// `()`: 204 without a body
    Empty,
    /// A body of the given type and media type
    Body(TypeExpr, &'static str),
}

/// Rules of the first returned expression that forms a fully constant chain.
pub fn chain_rules(output: &FnDecl, evaluator: &Evaluator<'_>) -> ChainRules {
    for expr in returned_exprs(&output.block) {
        match scan_chain(expr, evaluator) {
            Some(rules) if !rules.is_empty() => return rules,
            Some(_) => {}
            None => debug!("{}: builder chain has non-constant arguments", output.key),
        }
    }
    ChainRules::default()
}

/// Walks `a.b().c()` from the outermost call inwards. Returns `None` when a
/// recognized call has a non-constant argument.
fn scan_chain(expr: &Expr, evaluator: &Evaluator<'_>) -> Option<ChainRules> {
    let mut rules = ChainRules::default();
    let mut current = expr;
    loop {
        match current {
            Expr::MethodCall(m) => {
                match m.method.to_string().as_str() {
                    "with_status" => {
                        let status = m.args.first().and_then(|a| evaluator.eval_int(a))?;
                        // The outermost call wins, as it is applied last.
                        rules.status = rules.status.or(u16::try_from(status).ok());
                    }
                    "with_content_type" => {
                        let content_type = m.args.first().and_then(|a| evaluator.eval_str(a))?;
                        rules.content_type = rules.content_type.or(Some(content_type));
                    }
                    "with_schema" => {
                        let ty = m.turbofish.as_ref().and_then(|t| {
                            t.args.iter().find_map(|arg| match arg {
                                GenericArgument::Type(ty) => Some(TypeExpr::from(ty)),
                                _ => None,
                            })
                        })?;
                        rules.schema = rules.schema.or(Some(ty));
                    }
                    _ => {}
                }
                current = &m.receiver;
            }
            Expr::Call(c) => {
                if let Some(segments) = call_path(c) {
                    if matches!(segments.as_slice(), [.., owner, ctor] if owner == "Attachment" && ctor == "new") {
                        let mut args = c.args.iter();
                        let name = args.next().and_then(|a| evaluator.eval_str(a))?;
                        let content_type = args.next().and_then(|a| evaluator.eval_str(a))?;
                        rules.attachment = Some((name, content_type));
                    }
                }
                return Some(rules);
            }
            Expr::Paren(p) => current = &p.expr,
            Expr::Reference(r) => current = &r.expr,
            Expr::Try(t) => current = &t.expr,
            Expr::Await(a) => current = &a.base,
            _ => return Some(rules),
        }
    }
}

/// Body shape of a declared return type.
pub fn return_shape(ty: &TypeExpr) -> ReturnShape {
    let mut current = ty;
    loop {
        let next = ["Result", "Json", "Response", "Box"]
            .iter()
            .find_map(|wrapper| current.unwrap_generic(wrapper));
        match next {
            Some(inner) => current = inner,
            None => break,
        }
    }
    if current.is_unit() {
        return ReturnShape::Empty;
    }
    let peeled = match current {
        TypeExpr::Reference(inner) => inner.as_ref(),
        other => other,
    };
    match peeled.as_path() {
        Some(path) if matches!(path.name(), "String" | "str") => {
            ReturnShape::Body(peeled.clone(), TEXT)
        }
        Some(path) if matches!(path.name(), "Bytes" | "BytesMut") => {
            ReturnShape::Body(peeled.clone(), OCTET_STREAM)
        }
        Some(path) if path.name() == "Vec" && path.args.first().and_then(TypeExpr::name) == Some("u8") => {
            ReturnShape::Body(peeled.clone(), OCTET_STREAM)
        }
        _ => ReturnShape::Body(current.clone(), JSON),
    }
}
