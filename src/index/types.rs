//! A small typed-expression model over `syn::Type`.
//!
//! The schema and operator compilers only ever see [`TypeExpr`], never `syn`
//! types directly, so the shape dispatch lives in one place.

use std::fmt;

/// Shape of a type as written in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    /// A (possibly generic) named type such as `Vec<User>` or `chrono::DateTime<Utc>`
    Path(TypePath),
    /// `&T`, `&mut T`, `*const T`
    Reference(Box<TypeExpr>),
    /// `[T]`
    Slice(Box<TypeExpr>),
    /// `[T; N]`; the length is `None` when it is not an integer literal
    Array(Box<TypeExpr>, Option<u64>),
    /// `(A, B)`; the unit type is an empty tuple
    Tuple(Vec<TypeExpr>),
    /// `dyn Trait` or `impl Trait`
    Opaque,
    /// Anything else (`!`, macros in type position, bare fn pointers)
    Unknown,
}

/// A path type with the generic arguments of its last segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypePath {
    pub segments: Vec<String>,
    pub args: Vec<TypeExpr>,
}

impl TypePath {
    pub fn new(name: &str) -> Self {
        Self {
            segments: name.split("::").map(str::to_string).collect(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<TypeExpr>) -> Self {
        self.args = args;
        self
    }

    /// Last path segment, the name the type is declared under.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Leading segments that narrow the lookup, without `crate`/`self`/`super`.
    pub fn qualifier(&self) -> Vec<&str> {
        let n = self.segments.len().saturating_sub(1);
        self.segments[..n]
            .iter()
            .map(String::as_str)
            .filter(|s| !matches!(*s, "crate" | "self" | "super"))
            .collect()
    }
}

impl TypeExpr {
    pub fn named(name: &str) -> Self {
        TypeExpr::Path(TypePath::new(name))
    }

    pub fn unit() -> Self {
        TypeExpr::Tuple(Vec::new())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, TypeExpr::Tuple(elems) if elems.is_empty())
    }

    pub fn as_path(&self) -> Option<&TypePath> {
        match self {
            TypeExpr::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Last segment name for path types.
    pub fn name(&self) -> Option<&str> {
        self.as_path().map(TypePath::name)
    }

    /// First generic argument of a path type named `wrapper`.
    pub fn unwrap_generic(&self, wrapper: &str) -> Option<&TypeExpr> {
        match self {
            TypeExpr::Path(path) if path.name() == wrapper => path.args.first(),
            _ => None,
        }
    }

    /// Strips references, `Box`/`Rc`/`Arc` and `Option`, returning the inner type.
    pub fn peel(&self) -> &TypeExpr {
        match self {
            TypeExpr::Reference(inner) => inner.peel(),
            TypeExpr::Path(path)
                if matches!(path.name(), "Box" | "Rc" | "Arc" | "Option" | "Cow")
                    && !path.args.is_empty() =>
            {
                path.args[0].peel()
            }
            other => other,
        }
    }
}

impl From<&syn::Type> for TypeExpr {
    fn from(ty: &syn::Type) -> Self {
        match ty {
            syn::Type::Path(type_path) => TypeExpr::Path(TypePath::from(&type_path.path)),
            syn::Type::Reference(r) => TypeExpr::Reference(Box::new(TypeExpr::from(&*r.elem))),
            syn::Type::Ptr(p) => TypeExpr::Reference(Box::new(TypeExpr::from(&*p.elem))),
            syn::Type::Slice(s) => TypeExpr::Slice(Box::new(TypeExpr::from(&*s.elem))),
            syn::Type::Array(a) => {
                let len = match &a.len {
                    syn::Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Int(n),
                        ..
                    }) => n.base10_parse::<u64>().ok(),
                    _ => None,
                };
                TypeExpr::Array(Box::new(TypeExpr::from(&*a.elem)), len)
            }
            syn::Type::Tuple(t) => TypeExpr::Tuple(t.elems.iter().map(TypeExpr::from).collect()),
            syn::Type::Paren(p) => TypeExpr::from(&*p.elem),
            syn::Type::Group(g) => TypeExpr::from(&*g.elem),
            syn::Type::TraitObject(_) | syn::Type::ImplTrait(_) => TypeExpr::Opaque,
            _ => TypeExpr::Unknown,
        }
    }
}

impl From<&syn::Path> for TypePath {
    fn from(path: &syn::Path) -> Self {
        let segments = path.segments.iter().map(|s| s.ident.to_string()).collect();
        let args = path
            .segments
            .last()
            .map(|segment| match &segment.arguments {
                syn::PathArguments::AngleBracketed(bracketed) => bracketed
                    .args
                    .iter()
                    .filter_map(|arg| match arg {
                        syn::GenericArgument::Type(ty) => Some(TypeExpr::from(ty)),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default();
        TypePath { segments, args }
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("::"))?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Path(path) => write!(f, "{}", path),
            TypeExpr::Reference(inner) => write!(f, "&{}", inner),
            TypeExpr::Slice(inner) => write!(f, "[{}]", inner),
            TypeExpr::Array(inner, Some(n)) => write!(f, "[{}; {}]", inner, n),
            TypeExpr::Array(inner, None) => write!(f, "[{}; _]", inner),
            TypeExpr::Tuple(elems) => {
                let elems: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", elems.join(", "))
            }
            TypeExpr::Opaque => write!(f, "dyn _"),
            TypeExpr::Unknown => write!(f, "_"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(ty: &str) -> TypeExpr {
        let ty: syn::Type = syn::parse_str(ty).unwrap();
        TypeExpr::from(&ty)
    }

    #[test]
    fn test_generic_path() {
        let ty = parse("std::collections::HashMap<String, Vec<crate::models::User>>");
        let path = ty.as_path().unwrap();
        assert_eq!(path.name(), "HashMap");
        assert_eq!(path.qualifier(), vec!["std", "collections"]);
        assert_eq!(path.args.len(), 2);
        assert_eq!(path.args[1].to_string(), "Vec<crate::models::User>");
    }

    #[test]
    fn test_array_length() {
        assert_eq!(
            parse("[u8; 16]"),
            TypeExpr::Array(Box::new(TypeExpr::named("u8")), Some(16))
        );
    }

    #[test]
    fn test_peel_wrappers() {
        let ty = parse("Option<Box<&Node>>");
        assert_eq!(ty.peel(), &TypeExpr::named("Node"));
    }

    #[test]
    fn test_opaque_and_unit() {
        assert_eq!(parse("Box<dyn std::any::Any>").unwrap_generic("Box"), Some(&TypeExpr::Opaque));
        assert!(parse("()").is_unit());
    }
}
