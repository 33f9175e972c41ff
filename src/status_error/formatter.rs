//! Detection of a registered custom error formatter.

use super::StatusErr;
use crate::eval::{call_name, constructed_type, returned_exprs, Evaluator};
use crate::index::{TypeIndex, TypePath};
use log::{debug, info};
use std::collections::BTreeMap;
use syn::visit::{self, Visit};
use syn::Expr;

const REGISTRATION_CALLS: &[&str] = &["set_error_formatter", "with_error_formatter"];

/// A custom error formatter type registered by the program.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorFormatter {
    /// Path of the formatter type as written at the registration call
    pub type_path: TypePath,
    /// Module of the function containing the registration
    pub module: Vec<String>,
    /// `code -> HTTP status` overrides
    pub status_overrides: BTreeMap<i64, u16>,
}

impl ErrorFormatter {
    /// HTTP status of `err`, honouring the override map.
    pub fn status_of(&self, err: &StatusErr) -> u16 {
        self.status_overrides
            .get(&err.code)
            .copied()
            .unwrap_or_else(|| err.status())
    }
}

/// Scans every function once for a formatter registration. The first one in
/// file order wins.
pub fn detect_formatter(index: &TypeIndex) -> Option<ErrorFormatter> {
    for function in index.fns() {
        let mut finder = RegistrationFinder::default();
        finder.visit_block(&function.block);
        for arg in &finder.args {
            let Some(type_path) = constructed_type(arg) else {
                continue;
            };
            let Some(decl) = index.find_type(&type_path, &function.module) else {
                debug!("Error formatter {} is not a declared type", type_path);
                continue;
            };
            let status_overrides = status_overrides(index, decl.module(), &decl.name());
            info!(
                "Using custom error formatter {} ({} status override(s))",
                decl.qualified_name(),
                status_overrides.len()
            );
            return Some(ErrorFormatter {
                type_path,
                module: function.module.clone(),
                status_overrides,
            });
        }
    }
    None
}

/// The first zero-argument method of `type_name` that evaluates to a literal
/// map. Anything unrecognized yields no overrides.
fn status_overrides(index: &TypeIndex, module: &[String], type_name: &str) -> BTreeMap<i64, u16> {
    for method in index.methods_of(module, type_name).filter(|m| m.arity() == 0) {
        let evaluator = Evaluator::new(index, &method.module, method.self_ty.as_deref());
        let candidates = returned_exprs(&method.block)
            .into_iter()
            .chain(method.block.stmts.iter().filter_map(|stmt| match stmt {
                syn::Stmt::Local(local) => local.init.as_ref().map(|init| &*init.expr),
                _ => None,
            }));
        for expr in candidates {
            if let Some(pairs) = evaluator.literal_map(expr) {
                return pairs
                    .into_iter()
                    .filter_map(|(code, status)| {
                        u16::try_from(status)
                            .ok()
                            .filter(|s| (100..=599).contains(s))
                            .map(|s| (code, s))
                    })
                    .collect();
            }
        }
    }
    BTreeMap::new()
}

#[derive(Default)]
struct RegistrationFinder {
    args: Vec<Expr>,
}

impl<'ast> Visit<'ast> for RegistrationFinder {
    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Some(name) = call_name(node) {
            if REGISTRATION_CALLS.contains(&name.as_str()) {
                self.args.extend(node.args.first().cloned());
            }
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        if REGISTRATION_CALLS.iter().any(|name| node.method == name) {
            self.args.extend(node.args.first().cloned());
        }
        visit::visit_expr_method_call(self, node);
    }
}
