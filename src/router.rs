//! Route tree reconstruction.
//!
//! Router scopes are rebuilt by abstractly evaluating function bodies: each
//! router constructor creates a node, `let` bindings and statics name nodes,
//! and `register`/`attach` calls mutate them. The scope handed to a
//! `serve`/`run` call in an entry point becomes the root.
//!
//! Calls made directly from an entry point bind router arguments to the
//! callee's parameters, so a wrapper such as `fn mount(root: &mut Router)`
//! sees the entry point's scope. Deeper wrappers are not bound and their
//! registrations on parameters are dropped.

use crate::error::{Error, Result};
use crate::eval::{call_path, constructed_type, Evaluator};
use crate::index::{qualify, FnDecl, FnKey, TypeDecl, TypeIndex};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt;
use syn::punctuated::Punctuated;
use syn::{Expr, Stmt, Token};

/// An operator as referenced at a registration site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperatorRef {
    /// A declared operator struct
    Type { module: Vec<String>, name: String },
    /// `Group::new("/p")`: contributes a path and nothing else
    Group { path: String },
}

impl fmt::Display for OperatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorRef::Type { module, name } => f.write_str(&qualify(module, name)),
            OperatorRef::Group { path } => write!(f, "Group({})", path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One registration scope.
#[derive(Debug, Clone, Default)]
pub struct RouterNode {
    pub operators: Vec<OperatorRef>,
    pub children: Vec<NodeId>,
    /// Back link used for ancestry checks only
    pub parent: Option<NodeId>,
}

/// Root-to-leaf operator chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub chain: Vec<OperatorRef>,
}

impl Route {
    /// The leaf operator: the last one in the chain.
    pub fn leaf(&self) -> Option<&OperatorRef> {
        self.chain.last()
    }

    pub fn label(&self) -> String {
        self.chain
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

/// The reconstructed router tree.
#[derive(Debug)]
pub struct RouterTree {
    nodes: Vec<RouterNode>,
    root: NodeId,
}

impl RouterTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &RouterNode {
        &self.nodes[id.0]
    }

    /// Leaf routes, ordered by their operator chains. Nodes with children are
    /// groups and never produce a route of their own.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = Vec::new();
        let mut stack = vec![(self.root, Vec::new())];
        while let Some((id, mut chain)) = stack.pop() {
            let node = self.node(id);
            chain.extend(node.operators.iter().cloned());
            if node.children.is_empty() {
                if node.operators.is_empty() {
                    debug!("Skipping empty leaf scope");
                } else {
                    routes.push(Route { chain });
                }
                continue;
            }
            for child in node.children.iter().rev() {
                stack.push((*child, chain.clone()));
            }
        }
        routes.sort_by_cached_key(|r| r.chain.iter().map(ToString::to_string).collect::<Vec<_>>());
        routes
    }
}

/// Evaluation context of one function body.
struct Frame<'f> {
    module: &'f [String],
    self_ty: Option<&'f str>,
    /// Qualified impl owner, for `Self::f` and `self.f()` calls
    owner: Option<&'f str>,
    locals: HashMap<String, NodeId>,
    /// Calls from this frame bind router arguments to callee parameters
    entry: bool,
    /// `serve`/`run` calls in this frame may name the root
    serves: bool,
}

impl<'f> Frame<'f> {
    fn detached(module: &'f [String]) -> Self {
        Self {
            module,
            self_ty: None,
            owner: None,
            locals: HashMap::new(),
            entry: false,
            serves: false,
        }
    }
}

/// Rebuilds the router tree by evaluating router construction in source.
pub struct RouteTreeBuilder<'a> {
    index: &'a TypeIndex,
    entry_points: Vec<String>,
    nodes: Vec<RouterNode>,
    /// Static name to node; `None` while the initializer is evaluated
    statics: HashMap<String, Option<NodeId>>,
    /// Scope returned by functions invoked without bound arguments
    returns: HashMap<FnKey, Option<NodeId>>,
    processed: HashSet<FnKey>,
    stack: Vec<FnKey>,
    root: Option<NodeId>,
}

impl<'a> RouteTreeBuilder<'a> {
    /// Creates a builder over an indexed program.
    ///
    /// # Arguments
    ///
    /// * `index` - Declarations of every parsed file
    /// * `entry_points` - Names of free functions evaluated first; the first router
    ///   handed to a serving call from one of them becomes the root
    pub fn new(index: &'a TypeIndex, entry_points: &[String]) -> Self {
        Self {
            index,
            entry_points: entry_points.to_vec(),
            nodes: Vec::new(),
            statics: HashMap::new(),
            returns: HashMap::new(),
            processed: HashSet::new(),
            stack: Vec::new(),
            root: None,
        }
    }

    /// Evaluates statics, the entry points and then every remaining function,
    /// linking each registration under the scope it was registered on.
    ///
    /// Registrations that would give a scope a second parent or form a cycle
    /// are ignored.
    ///
    /// # Returns
    ///
    /// Returns the `RouterTree` rooted at the served router.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoRootRouter` if no entry point passes a router to a
    /// serving call.
    pub fn build(mut self) -> Result<RouterTree> {
        let index = self.index;
        for decl in index.statics() {
            self.static_node(&decl.name);
        }

        let entries: Vec<&FnDecl> = index
            .fns()
            .filter(|f| f.self_ty.is_none() && self.entry_points.contains(&f.name))
            .collect();
        for entry in &entries {
            debug!("Evaluating entry point {}", entry.key);
            self.process_fn(entry, HashMap::new(), true, true);
        }

        // Registrations on statics can live in any function.
        for function in index.fns() {
            if !self.processed.contains(&function.key) {
                self.process_fn(function, HashMap::new(), false, false);
            }
        }

        let root = self
            .root
            .ok_or_else(|| Error::NoRootRouter(self.entry_points.join(", ")))?;
        info!("Reconstructed {} router scope(s)", self.nodes.len());
        Ok(RouterTree {
            nodes: self.nodes,
            root,
        })
    }

    fn new_node(&mut self, operators: Vec<OperatorRef>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(RouterNode {
            operators,
            ..Default::default()
        });
        id
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.nodes[id.0].parent;
        }
        false
    }

    /// Attaches `child` under `parent` unless that would break the tree shape.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        if self.nodes[child.0].parent.is_some() || self.is_ancestor(child, parent) {
            debug!("Ignoring registration that would not keep a tree");
            return;
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn static_node(&mut self, name: &str) -> Option<NodeId> {
        if let Some(known) = self.statics.get(name) {
            return *known;
        }
        let index = self.index;
        let decl = index.statics().find(|s| s.name == name)?;
        self.statics.insert(name.to_string(), None);
        let mut frame = Frame::detached(&decl.module);
        let node = self.eval(&decl.expr, &mut frame);
        self.statics.insert(name.to_string(), node);
        node
    }

    fn process_fn(
        &mut self,
        function: &'a FnDecl,
        params: HashMap<String, NodeId>,
        entry: bool,
        serves: bool,
    ) -> Option<NodeId> {
        if self.stack.contains(&function.key) {
            return None;
        }
        self.stack.push(function.key.clone());
        self.processed.insert(function.key.clone());
        let mut frame = Frame {
            module: &function.module,
            self_ty: function.self_ty.as_deref(),
            owner: function.owner.as_deref(),
            locals: params,
            entry,
            serves,
        };
        let result = self.eval_block(&function.block, &mut frame);
        self.stack.pop();
        result
    }

    fn invoke(&mut self, callee: &'a FnDecl, args: &Punctuated<Expr, Token![,]>, frame: &mut Frame<'_>) -> Option<NodeId> {
        let arg_nodes: Vec<Option<NodeId>> = args.iter().map(|a| self.eval(a, frame)).collect();
        let mut params = HashMap::new();
        if frame.entry {
            for (position, node) in arg_nodes.iter().enumerate() {
                if let (Some(node), Some(name)) = (node, callee.param_name(position)) {
                    params.insert(name, *node);
                }
            }
        }
        if !params.is_empty() {
            debug!("Binding {} router argument(s) of {}", params.len(), callee.key);
            return self.process_fn(callee, params, false, true);
        }
        if self.processed.contains(&callee.key) {
            return self.returns.get(&callee.key).copied().flatten();
        }
        let result = self.process_fn(callee, HashMap::new(), false, false);
        self.returns.insert(callee.key.clone(), result);
        result
    }

    fn eval_block(&mut self, block: &syn::Block, frame: &mut Frame<'_>) -> Option<NodeId> {
        let mut last = None;
        for stmt in &block.stmts {
            last = match stmt {
                Stmt::Local(local) => {
                    let node = local
                        .init
                        .as_ref()
                        .and_then(|init| self.eval(&init.expr, frame));
                    if let (Some(name), Some(node)) = (pat_ident(&local.pat), node) {
                        frame.locals.insert(name, node);
                    }
                    None
                }
                Stmt::Expr(expr, None) => self.eval(expr, frame),
                Stmt::Expr(expr, Some(_)) => {
                    self.eval(expr, frame);
                    None
                }
                Stmt::Macro(m) => {
                    self.eval_macro(&m.mac, frame);
                    None
                }
                Stmt::Item(_) => None,
            };
        }
        last
    }

    /// Evaluates `expr` for its registration side effects and returns the
    /// scope it denotes, if any.
    fn eval(&mut self, expr: &Expr, frame: &mut Frame<'_>) -> Option<NodeId> {
        match expr {
            Expr::Reference(r) => self.eval(&r.expr, frame),
            Expr::Paren(p) => self.eval(&p.expr, frame),
            Expr::Group(g) => self.eval(&g.expr, frame),
            Expr::Unary(u) => self.eval(&u.expr, frame),
            Expr::Try(t) => self.eval(&t.expr, frame),
            Expr::Await(a) => self.eval(&a.base, frame),
            Expr::Block(b) => self.eval_block(&b.block, frame),
            Expr::Unsafe(u) => self.eval_block(&u.block, frame),
            Expr::Closure(c) => self.eval(&c.body, frame),
            Expr::Return(r) => r.expr.as_ref().and_then(|e| self.eval(e, frame)),
            Expr::If(i) => {
                self.eval(&i.cond, frame);
                self.eval_block(&i.then_branch, frame);
                if let Some((_, otherwise)) = &i.else_branch {
                    self.eval(otherwise, frame);
                }
                None
            }
            Expr::Match(m) => {
                self.eval(&m.expr, frame);
                for arm in &m.arms {
                    self.eval(&arm.body, frame);
                }
                None
            }
            Expr::ForLoop(l) => {
                self.eval_block(&l.body, frame);
                None
            }
            Expr::While(l) => {
                self.eval_block(&l.body, frame);
                None
            }
            Expr::Loop(l) => {
                self.eval_block(&l.body, frame);
                None
            }
            Expr::Assign(a) => {
                let node = self.eval(&a.right, frame);
                if let (Expr::Path(p), Some(node)) = (&*a.left, node) {
                    if let Some(ident) = p.path.get_ident() {
                        frame.locals.insert(ident.to_string(), node);
                    }
                }
                None
            }
            Expr::Path(p) => {
                if let Some(ident) = p.path.get_ident() {
                    if let Some(node) = frame.locals.get(&ident.to_string()) {
                        return Some(*node);
                    }
                }
                let name = p.path.segments.last()?.ident.to_string();
                self.static_node(&name)
            }
            Expr::Macro(m) => self.eval_macro(&m.mac, frame),
            Expr::Call(c) => self.eval_call(c, frame),
            Expr::MethodCall(m) => self.eval_method_call(m, frame),
            Expr::Tuple(t) => {
                for elem in &t.elems {
                    self.eval(elem, frame);
                }
                None
            }
            _ => None,
        }
    }

    fn eval_macro(&mut self, mac: &syn::Macro, frame: &mut Frame<'_>) -> Option<NodeId> {
        let args = mac
            .parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated)
            .ok()?;
        if macro_name(mac) == Some("router".to_string()) {
            let operators = self.operators_of(args.iter(), frame);
            return Some(self.new_node(operators));
        }
        for arg in &args {
            self.eval(arg, frame);
        }
        None
    }

    fn eval_call(&mut self, call: &syn::ExprCall, frame: &mut Frame<'_>) -> Option<NodeId> {
        let Some(segments) = call_path(call) else {
            for arg in &call.args {
                self.eval(arg, frame);
            }
            return None;
        };
        if is_router_ctor(&segments) {
            let operators = self.operators_of(call.args.iter(), frame);
            return Some(self.new_node(operators));
        }
        if segments.last().is_some_and(|name| is_serve(name)) {
            self.serve(call.args.iter(), frame);
            return None;
        }
        let index = self.index;
        if let Some(callee) = index.resolve_call(&segments, frame.module, frame.owner) {
            return self.invoke(callee, &call.args, frame);
        }
        // Unknown wrapper such as `Lazy::new(..)` or `Arc::new(..)`: passes
        // through the scope of its only argument.
        let scopes: Vec<NodeId> = call
            .args
            .iter()
            .filter_map(|arg| self.eval(arg, frame))
            .collect();
        match (call.args.len(), scopes.as_slice()) {
            (1, [scope]) => Some(*scope),
            _ => None,
        }
    }

    fn eval_method_call(&mut self, call: &syn::ExprMethodCall, frame: &mut Frame<'_>) -> Option<NodeId> {
        let method = call.method.to_string();
        match method.as_str() {
            "register" => {
                let parent = self.eval(&call.receiver, frame);
                let children: Vec<NodeId> = call
                    .args
                    .iter()
                    .filter_map(|arg| self.eval(arg, frame))
                    .collect();
                match parent {
                    Some(parent) => {
                        for child in children {
                            self.link(parent, child);
                        }
                    }
                    None => debug!("Ignoring register call on an unresolved scope"),
                }
                parent
            }
            "attach" => {
                let target = self.eval(&call.receiver, frame);
                let operators = self.operators_of(call.args.iter(), frame);
                match target {
                    Some(target) => self.nodes[target.0].operators.extend(operators),
                    None => debug!("Ignoring attach call on an unresolved scope"),
                }
                target
            }
            "clone" | "into" | "as_ref" | "as_mut" | "borrow" | "borrow_mut" | "lock" | "read"
            | "write" | "unwrap" => self.eval(&call.receiver, frame),
            name if is_serve(name) => {
                let candidates = std::iter::once(&*call.receiver).chain(call.args.iter());
                self.serve(candidates, frame);
                None
            }
            _ => {
                self.eval(&call.receiver, frame);
                if is_self(&call.receiver) {
                    let index = self.index;
                    if let Some(callee) = frame.owner.and_then(|owner| index.owned_method(owner, &method)) {
                        return self.invoke(callee, &call.args, frame);
                    }
                }
                for arg in &call.args {
                    self.eval(arg, frame);
                }
                None
            }
        }
    }

    fn serve<'e>(&mut self, candidates: impl Iterator<Item = &'e Expr>, frame: &mut Frame<'_>) {
        for candidate in candidates {
            let Some(node) = self.eval(candidate, frame) else {
                continue;
            };
            if frame.serves && self.root.is_none() {
                info!("Found root router passed to serve call");
                self.root = Some(node);
            }
        }
    }

    fn operators_of<'e>(&mut self, args: impl Iterator<Item = &'e Expr>, frame: &Frame<'_>) -> Vec<OperatorRef> {
        let mut operators = Vec::new();
        for arg in args {
            match peel_reference(arg) {
                Expr::Array(array) => operators.extend(self.operators_of(array.elems.iter(), frame)),
                Expr::Macro(m) if macro_name(&m.mac).as_deref() == Some("vec") => {
                    if let Ok(elems) = m
                        .mac
                        .parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated)
                    {
                        operators.extend(self.operators_of(elems.iter(), frame));
                    }
                }
                other => operators.extend(self.operator_ref(other, frame)),
            }
        }
        operators
    }

    fn operator_ref(&self, expr: &Expr, frame: &Frame<'_>) -> Option<OperatorRef> {
        let evaluator = Evaluator::new(self.index, frame.module, frame.self_ty);
        if let Some(arg) = group_arg(expr) {
            return match evaluator.eval_str(arg) {
                Some(path) => Some(OperatorRef::Group { path }),
                None => {
                    debug!("Skipping group with a non-constant path");
                    None
                }
            };
        }
        let path = constructed_type(expr)?;
        match self.index.find_type(&path, frame.module) {
            Some(TypeDecl::Struct(d)) => Some(OperatorRef::Type {
                module: d.module.clone(),
                name: d.item.ident.to_string(),
            }),
            _ => {
                debug!("Skipping unresolved operator {}", path);
                None
            }
        }
    }
}

fn pat_ident(pat: &syn::Pat) -> Option<String> {
    match pat {
        syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
        syn::Pat::Type(typed) => pat_ident(&typed.pat),
        _ => None,
    }
}

fn peel_reference(expr: &Expr) -> &Expr {
    match expr {
        Expr::Reference(r) => peel_reference(&r.expr),
        Expr::Paren(p) => peel_reference(&p.expr),
        other => other,
    }
}

fn macro_name(mac: &syn::Macro) -> Option<String> {
    mac.path.segments.last().map(|s| s.ident.to_string())
}

fn is_router_ctor(segments: &[String]) -> bool {
    matches!(segments, [.., owner, ctor] if owner == "Router" && (ctor == "new" || ctor == "default"))
}

fn is_serve(name: &str) -> bool {
    name == "serve" || name == "run"
}

fn is_self(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(p) if p.path.is_ident("self"))
}

/// The path argument of `Group::new(p)`, `Group(p)`, `BasePath::new(p)` or `BasePath(p)`.
fn group_arg(expr: &Expr) -> Option<&Expr> {
    let Expr::Call(call) = peel_reference(expr) else {
        return None;
    };
    if call.args.len() != 1 {
        return None;
    }
    let segments = call_path(call)?;
    let is_group = |name: &str| name == "Group" || name == "BasePath";
    let matched = match segments.as_slice() {
        [.., owner, ctor] if ctor == "new" => is_group(owner),
        [.., name] => is_group(name),
        [] => false,
    };
    if matched {
        call.args.first()
    } else {
        None
    }
}
