//! Declaration index over every parsed file.
//!
//! The index is the only component that walks `syn` items. It records where
//! each struct, enum, alias, constant, static and function lives (by module
//! path) and answers name lookups the way the compilers need them: by last
//! segment, narrowed by any written qualifier, preferring the caller's module.

pub mod attrs;
pub mod types;

use crate::parser::ParsedFile;
use log::debug;
use std::fmt;
use syn::{Attribute, Item};

pub use types::{TypeExpr, TypePath};

/// A declaration together with the module it was found in.
#[derive(Debug, Clone)]
pub struct Declared<T> {
    pub module: Vec<String>,
    pub item: T,
}

/// Stable identity of a function: `module::Type::name` or `module::name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnKey(pub String);

impl fmt::Display for FnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A free function or a method of an impl block.
#[derive(Debug, Clone)]
pub struct FnDecl {
    pub key: FnKey,
    pub module: Vec<String>,
    /// Self type name for methods
    pub self_ty: Option<String>,
    /// Qualified name of the type an impl method belongs to
    pub owner: Option<String>,
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub sig: syn::Signature,
    pub block: syn::Block,
}

impl FnDecl {
    /// Number of arguments besides the receiver.
    pub fn arity(&self) -> usize {
        self.sig
            .inputs
            .iter()
            .filter(|arg| matches!(arg, syn::FnArg::Typed(_)))
            .count()
    }

    /// Position of a named, non-receiver argument.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                syn::FnArg::Typed(pat) => Some(pat),
                syn::FnArg::Receiver(_) => None,
            })
            .position(|pat| match &*pat.pat {
                syn::Pat::Ident(ident) => ident.ident == name,
                _ => false,
            })
    }

    /// Name of the non-receiver argument at `position`.
    pub fn param_name(&self, position: usize) -> Option<String> {
        self.sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                syn::FnArg::Typed(pat) => Some(pat),
                syn::FnArg::Receiver(_) => None,
            })
            .nth(position)
            .and_then(|pat| match &*pat.pat {
                syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
                _ => None,
            })
    }

    pub fn return_type(&self) -> TypeExpr {
        match &self.sig.output {
            syn::ReturnType::Default => TypeExpr::unit(),
            syn::ReturnType::Type(_, ty) => TypeExpr::from(&**ty),
        }
    }
}

/// A `const` item, at module level or associated with a type.
#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub module: Vec<String>,
    pub self_ty: Option<String>,
    pub name: String,
    pub ty: TypeExpr,
    pub expr: syn::Expr,
    pub attrs: Vec<Attribute>,
}

/// A `static` item.
#[derive(Debug, Clone)]
pub struct StaticDecl {
    pub module: Vec<String>,
    pub name: String,
    pub expr: syn::Expr,
}

/// A declared type the schema compiler can expand.
#[derive(Debug, Clone, Copy)]
pub enum TypeDecl<'a> {
    Struct(&'a Declared<syn::ItemStruct>),
    Enum(&'a Declared<syn::ItemEnum>),
    Alias(&'a Declared<syn::ItemType>),
}

impl<'a> TypeDecl<'a> {
    pub fn name(&self) -> String {
        match self {
            TypeDecl::Struct(d) => d.item.ident.to_string(),
            TypeDecl::Enum(d) => d.item.ident.to_string(),
            TypeDecl::Alias(d) => d.item.ident.to_string(),
        }
    }

    pub fn module(&self) -> &'a [String] {
        match self {
            TypeDecl::Struct(d) => &d.module,
            TypeDecl::Enum(d) => &d.module,
            TypeDecl::Alias(d) => &d.module,
        }
    }

    pub fn attrs(&self) -> &'a [Attribute] {
        match self {
            TypeDecl::Struct(d) => &d.item.attrs,
            TypeDecl::Enum(d) => &d.item.attrs,
            TypeDecl::Alias(d) => &d.item.attrs,
        }
    }

    /// Type parameter names, in declaration order.
    pub fn type_params(&self) -> Vec<String> {
        let generics = match self {
            TypeDecl::Struct(d) => &d.item.generics,
            TypeDecl::Enum(d) => &d.item.generics,
            TypeDecl::Alias(d) => &d.item.generics,
        };
        generics.type_params().map(|p| p.ident.to_string()).collect()
    }

    /// Module-qualified name, the base of a schema table key.
    pub fn qualified_name(&self) -> String {
        qualify(self.module(), &self.name())
    }
}

pub fn qualify(module: &[String], name: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", module.join("::"), name)
    }
}

/// Index of every declaration in the analyzed program.
#[derive(Debug, Default)]
pub struct TypeIndex {
    structs: Vec<Declared<syn::ItemStruct>>,
    enums: Vec<Declared<syn::ItemEnum>>,
    aliases: Vec<Declared<syn::ItemType>>,
    consts: Vec<ConstDecl>,
    statics: Vec<StaticDecl>,
    fns: Vec<FnDecl>,
}

impl TypeIndex {
    pub fn new(parsed_files: &[ParsedFile]) -> Self {
        debug!("Indexing {} files", parsed_files.len());
        let mut index = TypeIndex::default();
        let mut impl_targets = Vec::new();
        for file in parsed_files {
            index.collect_items(&file.syntax_tree.items, &file.module_path, &mut impl_targets);
        }
        index.resolve_owners(impl_targets);
        debug!(
            "Indexed {} structs, {} enums, {} aliases, {} consts, {} statics, {} fns",
            index.structs.len(),
            index.enums.len(),
            index.aliases.len(),
            index.consts.len(),
            index.statics.len(),
            index.fns.len()
        );
        index
    }

    /// Records declarations; `impl_targets` receives the written self type of
    /// every impl method, keyed by its position in `fns`.
    fn collect_items(&mut self, items: &[Item], module: &[String], impl_targets: &mut Vec<(usize, TypePath)>) {
        for item in items {
            match item {
                Item::Struct(s) => self.structs.push(Declared {
                    module: module.to_vec(),
                    item: s.clone(),
                }),
                Item::Enum(e) => self.enums.push(Declared {
                    module: module.to_vec(),
                    item: e.clone(),
                }),
                Item::Type(t) => self.aliases.push(Declared {
                    module: module.to_vec(),
                    item: t.clone(),
                }),
                Item::Const(c) => self.consts.push(ConstDecl {
                    module: module.to_vec(),
                    self_ty: None,
                    name: c.ident.to_string(),
                    ty: TypeExpr::from(&*c.ty),
                    expr: (*c.expr).clone(),
                    attrs: c.attrs.clone(),
                }),
                Item::Static(s) => self.statics.push(StaticDecl {
                    module: module.to_vec(),
                    name: s.ident.to_string(),
                    expr: (*s.expr).clone(),
                }),
                Item::Fn(f) => {
                    let name = f.sig.ident.to_string();
                    self.fns.push(FnDecl {
                        key: FnKey(qualify(module, &name)),
                        module: module.to_vec(),
                        self_ty: None,
                        owner: None,
                        name,
                        attrs: f.attrs.clone(),
                        sig: f.sig.clone(),
                        block: (*f.block).clone(),
                    });
                }
                Item::Impl(imp) => self.collect_impl(imp, module, impl_targets),
                Item::Mod(m) => {
                    if let Some((_, items)) = &m.content {
                        let mut nested = module.to_vec();
                        nested.push(m.ident.to_string());
                        self.collect_items(items, &nested, impl_targets);
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_impl(&mut self, imp: &syn::ItemImpl, module: &[String], impl_targets: &mut Vec<(usize, TypePath)>) {
        let target = match TypeExpr::from(&*imp.self_ty) {
            TypeExpr::Path(path) => path,
            _ => return,
        };
        let self_ty = target.name().to_string();
        for impl_item in &imp.items {
            match impl_item {
                syn::ImplItem::Fn(f) => {
                    let name = f.sig.ident.to_string();
                    impl_targets.push((self.fns.len(), target.clone()));
                    self.fns.push(FnDecl {
                        key: FnKey(format!("{}::{}", qualify(module, &self_ty), name)),
                        module: module.to_vec(),
                        self_ty: Some(self_ty.clone()),
                        owner: None,
                        name,
                        attrs: f.attrs.clone(),
                        sig: f.sig.clone(),
                        block: f.block.clone(),
                    });
                }
                syn::ImplItem::Const(c) => self.consts.push(ConstDecl {
                    module: module.to_vec(),
                    self_ty: Some(self_ty.clone()),
                    name: c.ident.to_string(),
                    ty: TypeExpr::from(&c.ty),
                    expr: c.expr.clone(),
                    attrs: c.attrs.clone(),
                }),
                _ => {}
            }
        }
    }

    /// Ties every impl method to the declaration its written self type
    /// resolves to from the impl's module. Impls of undeclared types are
    /// owned by a name in the impl's module.
    fn resolve_owners(&mut self, impl_targets: Vec<(usize, TypePath)>) {
        let owners: Vec<(usize, String)> = impl_targets
            .into_iter()
            .map(|(position, target)| {
                let module = &self.fns[position].module;
                let owner = match self.find_type(&target, module) {
                    Some(decl) => decl.qualified_name(),
                    None => qualify(module, target.name()),
                };
                (position, owner)
            })
            .collect();
        for (position, owner) in owners {
            self.fns[position].owner = Some(owner);
        }
    }

    /// Resolves a written type path to its declaration.
    pub fn find_type(&self, path: &TypePath, from_module: &[String]) -> Option<TypeDecl<'_>> {
        let name = path.name();
        let qualifier = path.qualifier();
        let candidates: Vec<TypeDecl<'_>> = self
            .structs
            .iter()
            .filter(|d| d.item.ident == name)
            .map(TypeDecl::Struct)
            .chain(
                self.enums
                    .iter()
                    .filter(|d| d.item.ident == name)
                    .map(TypeDecl::Enum),
            )
            .chain(
                self.aliases
                    .iter()
                    .filter(|d| d.item.ident == name)
                    .map(TypeDecl::Alias),
            )
            .filter(|d| module_matches(d.module(), &qualifier))
            .collect();
        pick_closest(candidates, from_module, |d| d.module())
    }

    /// Exact lookup of a struct declared in `module`.
    pub fn find_struct(&self, module: &[String], name: &str) -> Option<&Declared<syn::ItemStruct>> {
        self.structs
            .iter()
            .find(|d| d.module == module && d.item.ident == name)
    }

    pub fn find_type_by_name(&self, name: &str, from_module: &[String]) -> Option<TypeDecl<'_>> {
        self.find_type(&TypePath::new(name), from_module)
    }

    pub fn fns(&self) -> impl Iterator<Item = &FnDecl> {
        self.fns.iter()
    }

    pub fn statics(&self) -> impl Iterator<Item = &StaticDecl> {
        self.statics.iter()
    }

    pub fn enums(&self) -> impl Iterator<Item = &Declared<syn::ItemEnum>> {
        self.enums.iter()
    }

    pub fn function(&self, key: &FnKey) -> Option<&FnDecl> {
        self.fns.iter().find(|f| &f.key == key)
    }

    /// All methods declared in impl blocks of the type declared as
    /// `module::type_name`.
    pub fn methods_of<'a>(&'a self, module: &[String], type_name: &str) -> impl Iterator<Item = &'a FnDecl> + 'a {
        let owner = qualify(module, type_name);
        self.fns
            .iter()
            .filter(move |f| f.owner.as_deref() == Some(owner.as_str()))
    }

    pub fn method<'a>(&'a self, module: &[String], type_name: &str, method: &str) -> Option<&'a FnDecl> {
        self.owned_method(&qualify(module, type_name), method)
    }

    /// A method that takes nothing besides its receiver.
    pub fn zero_arg_method<'a>(&'a self, module: &[String], type_name: &str, method: &str) -> Option<&'a FnDecl> {
        self.methods_of(module, type_name)
            .find(|f| f.name == method && f.arity() == 0)
    }

    /// Method `method` of the type whose qualified name is `owner`.
    pub fn owned_method<'a>(&'a self, owner: &str, method: &str) -> Option<&'a FnDecl> {
        self.fns
            .iter()
            .find(|f| f.owner.as_deref() == Some(owner) && f.name == method)
    }

    /// Method `method` of the type a written path names from `from_module`.
    pub fn method_by_path<'a>(&'a self, path: &TypePath, from_module: &[String], method: &str) -> Option<&'a FnDecl> {
        if let Some(decl) = self.find_type(path, from_module) {
            return self.owned_method(&decl.qualified_name(), method);
        }
        let qualifier = path.qualifier();
        let candidates: Vec<&FnDecl> = self
            .fns
            .iter()
            .filter(|f| f.self_ty.as_deref() == Some(path.name()) && f.name == method)
            .filter(|f| module_matches(&f.module, &qualifier))
            .collect();
        pick_closest(candidates, from_module, |f| &f.module)
    }

    /// Resolves a free function call path such as `load_user` or `repo::load_user`.
    pub fn free_fn(&self, segments: &[String], from_module: &[String]) -> Option<&FnDecl> {
        let (name, qualifier) = segments.split_last()?;
        let qualifier: Vec<&str> = qualifier
            .iter()
            .map(String::as_str)
            .filter(|s| !matches!(*s, "crate" | "self" | "super"))
            .collect();
        let candidates: Vec<&FnDecl> = self
            .fns
            .iter()
            .filter(|f| f.self_ty.is_none() && &f.name == name)
            .filter(|f| module_matches(&f.module, &qualifier))
            .collect();
        pick_closest(candidates, from_module, |f| &f.module)
    }

    /// Resolves a call path written in `from_module` (inside an impl owned
    /// by `owner`, if any): `f`, `module::f`, `Type::f` or `Self::f`.
    pub fn resolve_call(&self, segments: &[String], from_module: &[String], owner: Option<&str>) -> Option<&FnDecl> {
        match segments {
            [] => None,
            [ty, name] if ty == "Self" => self.owned_method(owner?, name),
            [type_path @ .., ty, name] if ty.starts_with(|c: char| c.is_ascii_uppercase()) => {
                let mut written = type_path.to_vec();
                written.push(ty.clone());
                let path = TypePath {
                    segments: written,
                    args: Vec::new(),
                };
                self.method_by_path(&path, from_module, name)
            }
            _ => self.free_fn(segments, from_module),
        }
    }

    /// The only method with this name across all impls, if it is unique.
    pub fn unique_method(&self, name: &str) -> Option<&FnDecl> {
        let mut matches = self
            .fns
            .iter()
            .filter(|f| f.self_ty.is_some() && f.name == name);
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    /// Resolves `NAME`, `module::NAME` or `Type::NAME` to a constant.
    pub fn find_const(&self, segments: &[String], from_module: &[String]) -> Option<&ConstDecl> {
        let (name, qualifier) = segments.split_last()?;
        if let Some(owner) = qualifier.last() {
            if let Some(assoc) = self
                .consts
                .iter()
                .find(|c| &c.name == name && c.self_ty.as_deref() == Some(owner.as_str()))
            {
                return Some(assoc);
            }
        }
        let qualifier: Vec<&str> = qualifier
            .iter()
            .map(String::as_str)
            .filter(|s| !matches!(*s, "crate" | "self" | "super"))
            .collect();
        let candidates: Vec<&ConstDecl> = self
            .consts
            .iter()
            .filter(|c| c.self_ty.is_none() && &c.name == name)
            .filter(|c| module_matches(&c.module, &qualifier))
            .collect();
        pick_closest(candidates, from_module, |c| &c.module)
    }

    /// Constants whose declared type is `type_name` (or `Self` inside its impl).
    pub fn consts_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a ConstDecl> + 'a {
        self.consts.iter().filter(move |c| match c.ty.name() {
            Some("Self") => c.self_ty.as_deref() == Some(type_name),
            Some(name) => name == type_name,
            None => false,
        })
    }
}

/// Whether a declaration module ends with the written qualifier.
fn module_matches(module: &[String], qualifier: &[&str]) -> bool {
    if qualifier.len() > module.len() {
        return false;
    }
    module[module.len() - qualifier.len()..]
        .iter()
        .zip(qualifier)
        .all(|(m, q)| m == q)
}

/// Prefers the candidate from the caller's own module, then the one sharing
/// the longest module prefix with it, then the first one.
fn pick_closest<T: Copy>(candidates: Vec<T>, from_module: &[String], module_of: impl Fn(&T) -> &[String]) -> Option<T> {
    if let Some(exact) = candidates.iter().find(|c| module_of(c) == from_module) {
        return Some(*exact);
    }
    let shared = |c: &T| {
        module_of(c)
            .iter()
            .zip(from_module)
            .take_while(|(a, b)| a == b)
            .count()
    };
    let mut best: Option<(T, usize)> = None;
    for candidate in candidates {
        let score = shared(&candidate);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}
