//! Interprocedural status-error reachability.

use super::{merge_unique, StatusErr, StatusErrorCatalog, DEFAULT_LOCALE};
use crate::eval::{call_path, Evaluator};
use crate::index::{FnDecl, FnKey, TypeDecl, TypeIndex, TypePath};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{Expr, ExprCall, ExprMethodCall, ExprPath, Token};

/// Memoized walk collecting the status errors each function can produce.
pub struct ErrorReachability<'a> {
    index: &'a TypeIndex,
    catalog: StatusErrorCatalog,
    memo: HashMap<FnKey, Vec<StatusErr>>,
}

impl<'a> ErrorReachability<'a> {
    pub fn new(index: &'a TypeIndex) -> Self {
        let catalog = StatusErrorCatalog::new(index);
        debug!("Found {} declared status errors", catalog.len());
        Self {
            index,
            catalog,
            memo: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &StatusErrorCatalog {
        &self.catalog
    }

    /// Status errors referenced by `function` or any function it calls,
    /// deduplicated by (key, code) in discovery order.
    pub fn reachable(&mut self, function: &'a FnDecl) -> Vec<StatusErr> {
        if let Some(known) = self.memo.get(&function.key) {
            return known.clone();
        }
        // An empty entry first: a call cycle back into this function sees nothing.
        self.memo.insert(function.key.clone(), Vec::new());

        let mut scan = BodyScan {
            index: self.index,
            catalog: &self.catalog,
            evaluator: Evaluator::new(self.index, &function.module, function.self_ty.as_deref()),
            module: &function.module,
            owner: function.owner.as_deref(),
            errors: Vec::new(),
            callees: Vec::new(),
        };
        scan.visit_block(&function.block);
        let BodyScan {
            errors, callees, ..
        } = scan;

        let mut found = Vec::new();
        merge_unique(&mut found, errors);
        for callee in callees {
            let nested = self.reachable(callee);
            merge_unique(&mut found, nested);
        }
        debug!("{} reaches {} status error(s)", function.key, found.len());
        self.memo.insert(function.key.clone(), found.clone());
        found
    }
}

struct BodyScan<'a, 'c> {
    index: &'a TypeIndex,
    catalog: &'c StatusErrorCatalog,
    evaluator: Evaluator<'a>,
    module: &'a [String],
    /// Qualified impl owner of the scanned function
    owner: Option<&'a str>,
    errors: Vec<StatusErr>,
    callees: Vec<&'a FnDecl>,
}

impl<'a, 'c> BodyScan<'a, 'c> {
    fn push_callee(&mut self, callee: Option<&'a FnDecl>) {
        if let Some(callee) = callee {
            if !self.callees.iter().any(|c| c.key == callee.key) {
                self.callees.push(callee);
            }
        }
    }

    /// `wrap(err, code, "Key", "message", "description")` with literal code and key.
    fn fold_wrap(&self, call: &ExprCall) -> Option<StatusErr> {
        let args: Vec<&Expr> = call.args.iter().collect();
        let code = args.get(1).and_then(|e| self.evaluator.eval_int(e));
        let key = args.get(2).and_then(|e| self.evaluator.eval_str(e));
        let (Some(code), Some(key)) = (code, key) else {
            debug!("Skipping wrap call with non-literal code or key");
            return None;
        };
        let message = args
            .get(3)
            .and_then(|e| self.evaluator.eval_str(e))
            .unwrap_or_else(|| key.clone());
        let mut messages = BTreeMap::new();
        messages.insert(DEFAULT_LOCALE.to_string(), message);
        Some(StatusErr {
            key,
            code,
            messages,
            description: args.get(4).and_then(|e| self.evaluator.eval_str(e)),
            can_be_talk: false,
        })
    }
}

impl BodyScan<'_, '_> {
    /// Qualified name of the enum a written `Enum` or `module::Enum` path
    /// names from the scanned function's module.
    fn status_enum(&self, written: &[String]) -> Option<String> {
        match written {
            [] => None,
            [only] if only == "Self" => self.owner.map(str::to_string),
            _ => {
                let path = TypePath {
                    segments: written.to_vec(),
                    args: Vec::new(),
                };
                match self.index.find_type(&path, self.module)? {
                    decl @ TypeDecl::Enum(_) => Some(decl.qualified_name()),
                    _ => None,
                }
            }
        }
    }
}

fn is_wrap(segments: &[String]) -> bool {
    match segments {
        [.., owner, name] if name == "wrap" => owner == "StatusError" || owner == "status_error",
        [.., name] => name == "wrap_status",
        [] => false,
    }
}

fn is_self(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(p) if p.path.is_ident("self"))
}

impl<'a, 'c, 'ast> Visit<'ast> for BodyScan<'a, 'c> {
    fn visit_expr_path(&mut self, node: &'ast ExprPath) {
        let segments: Vec<String> = node
            .path
            .segments
            .iter()
            .map(|s| s.ident.to_string())
            .collect();
        if let Some((variant, enum_path)) = segments.split_last() {
            if let Some(err) = self
                .status_enum(enum_path)
                .and_then(|qualified| self.catalog.get(&qualified, variant))
            {
                self.errors.push(err.clone());
            }
        }
        visit::visit_expr_path(self, node);
    }

    fn visit_expr_call(&mut self, node: &'ast ExprCall) {
        if let Some(segments) = call_path(node) {
            if is_wrap(&segments) {
                if let Some(err) = self.fold_wrap(node) {
                    self.errors.push(err);
                }
            } else {
                let callee = self.index.resolve_call(&segments, self.module, self.owner);
                self.push_callee(callee);
            }
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        let name = node.method.to_string();
        let callee = if is_self(&node.receiver) {
            self.owner.and_then(|owner| self.index.owned_method(owner, &name))
        } else {
            self.index.unique_method(&name)
        };
        self.push_callee(callee);
        visit::visit_expr_method_call(self, node);
    }

    // bail!(UserErr::NotFound), Err(anyhow!(..)) and friends
    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        if let Ok(args) = node.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated) {
            for arg in &args {
                self.visit_expr(arg);
            }
        }
    }
}
