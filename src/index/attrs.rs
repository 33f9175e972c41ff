//! Readers for the attributes and doc comments the analyzer understands.

use heck::{
    ToKebabCase, ToLowerCamelCase, ToShoutyKebabCase, ToShoutySnakeCase, ToSnakeCase,
    ToUpperCamelCase,
};
use log::debug;
use std::fmt;
use std::str::FromStr;
use syn::meta::ParseNestedMeta;
use syn::{Attribute, Expr, ExprLit, Lit, LitBool, LitInt, LitStr, Meta};

/// Raw doc-comment lines with the single leading space rustdoc inserts removed.
pub fn doc_lines(attrs: &[Attribute]) -> Vec<String> {
    let mut lines = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let Meta::NameValue(nv) = &attr.meta {
            if let Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) = &nv.value
            {
                for line in s.value().lines() {
                    lines.push(line.strip_prefix(' ').unwrap_or(line).trim_end().to_string());
                }
            }
        }
    }
    lines
}

/// Summary/description split of a doc comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Docs {
    pub summary: Option<String>,
    pub description: Option<String>,
}

impl Docs {
    pub fn from_attrs(attrs: &[Attribute]) -> Self {
        let lines = doc_lines(attrs);
        let mut iter = lines.iter().skip_while(|l| l.trim().is_empty());
        let summary = iter.next().map(|l| l.trim().to_string());
        let rest: Vec<&str> = iter.map(String::as_str).collect();
        let description = rest.join("\n").trim().to_string();
        Self {
            summary,
            description: if description.is_empty() {
                None
            } else {
                Some(description)
            },
        }
    }

    /// The whole comment as one block, used for field descriptions.
    pub fn text(&self) -> Option<String> {
        match (&self.summary, &self.description) {
            (Some(s), Some(d)) => Some(format!("{}\n{}", s, d)),
            (Some(s), None) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Consumes the value of a nested meta item we do not care about.
fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}

/// Serde attributes relevant for schema generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerdeAttributes {
    pub rename: Option<String>,
    pub rename_all: Option<String>,
    pub skip: bool,
    pub default: bool,
    pub flatten: bool,
    pub transparent: bool,
    pub tag: Option<String>,
}

impl SerdeAttributes {
    pub fn from_attrs(attrs: &[Attribute]) -> Self {
        let mut serde_attrs = SerdeAttributes::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
            let parsed = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    if meta.input.peek(syn::Token![=]) {
                        serde_attrs.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                    } else {
                        // rename(serialize = "..", deserialize = "..")
                        meta.parse_nested_meta(|inner| {
                            if inner.path.is_ident("serialize") {
                                serde_attrs.rename = Some(inner.value()?.parse::<LitStr>()?.value());
                                Ok(())
                            } else {
                                skip_meta(&inner)
                            }
                        })?;
                    }
                } else if meta.path.is_ident("rename_all") {
                    serde_attrs.rename_all = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("skip") {
                    serde_attrs.skip = true;
                } else if meta.path.is_ident("default") {
                    serde_attrs.default = true;
                    skip_meta(&meta)?;
                } else if meta.path.is_ident("flatten") {
                    serde_attrs.flatten = true;
                } else if meta.path.is_ident("transparent") {
                    serde_attrs.transparent = true;
                } else if meta.path.is_ident("tag") {
                    serde_attrs.tag = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    skip_meta(&meta)?;
                }
                Ok(())
            });
            if let Err(e) = parsed {
                debug!("Ignoring malformed serde attribute: {}", e);
            }
        }
        serde_attrs
    }
}

impl SerdeAttributes {
    /// Serialized name of a field or variant under this container's `rename_all`.
    pub fn renamed(&self, ident: &str) -> String {
        match self.rename_all.as_deref() {
            Some(rule) => apply_rename_rule(ident, rule),
            None => ident.to_string(),
        }
    }
}

/// Applies a serde `rename_all` rule to an identifier.
pub fn apply_rename_rule(ident: &str, rule: &str) -> String {
    let ident = ident.trim_start_matches("r#");
    match rule {
        "lowercase" => ident.to_lowercase(),
        "UPPERCASE" => ident.to_uppercase(),
        "PascalCase" => ident.to_upper_camel_case(),
        "camelCase" => ident.to_lower_camel_case(),
        "snake_case" => ident.to_snake_case(),
        "SCREAMING_SNAKE_CASE" => ident.to_shouty_snake_case(),
        "kebab-case" => ident.to_kebab_case(),
        "SCREAMING-KEBAB-CASE" => ident.to_shouty_kebab_case(),
        _ => ident.to_string(),
    }
}

/// Where an operator field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamLocation {
    Query,
    Path,
    Cookie,
    Header,
    Body,
    Form,
    UrlEncoded,
    Multipart,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Query => "query",
            ParamLocation::Path => "path",
            ParamLocation::Cookie => "cookie",
            ParamLocation::Header => "header",
            ParamLocation::Body => "body",
            ParamLocation::Form => "form",
            ParamLocation::UrlEncoded => "urlencoded",
            ParamLocation::Multipart => "multipart",
        }
    }

    /// Locations that become OpenAPI parameters rather than a request body.
    pub fn is_parameter(&self) -> bool {
        matches!(
            self,
            ParamLocation::Query | ParamLocation::Path | ParamLocation::Cookie | ParamLocation::Header
        )
    }

    /// Media type of the aggregated body for form-like locations.
    pub fn form_media_type(&self) -> Option<&'static str> {
        match self {
            ParamLocation::Form | ParamLocation::Multipart => Some("multipart/form-data"),
            ParamLocation::UrlEncoded => Some("application/x-www-form-urlencoded"),
            _ => None,
        }
    }
}

impl FromStr for ParamLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(ParamLocation::Query),
            "path" => Ok(ParamLocation::Path),
            "cookie" => Ok(ParamLocation::Cookie),
            "header" => Ok(ParamLocation::Header),
            "body" => Ok(ParamLocation::Body),
            "form" => Ok(ParamLocation::Form),
            "urlencoded" => Ok(ParamLocation::UrlEncoded),
            "multipart" => Ok(ParamLocation::Multipart),
            other => Err(format!("unknown parameter location `{}`", other)),
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `#[param(<location>, name = "..", required, default = "..", content_type = "..", security, flatten)]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamAttr {
    pub location: Option<ParamLocation>,
    pub name: Option<String>,
    pub required: Option<bool>,
    pub default: Option<String>,
    pub content_type: Option<String>,
    pub security: bool,
    pub flatten: bool,
}

impl ParamAttr {
    /// Returns `None` when the field carries no `#[param]` attribute at all.
    pub fn from_attrs(attrs: &[Attribute]) -> Option<Self> {
        let attr = attrs.iter().find(|a| a.path().is_ident("param"))?;
        let mut param = ParamAttr::default();
        let parsed = attr.parse_nested_meta(|meta| {
            let key = meta
                .path
                .get_ident()
                .map(|i| i.to_string())
                .unwrap_or_default();
            match key.as_str() {
                "name" => param.name = Some(meta.value()?.parse::<LitStr>()?.value()),
                "default" => param.default = Some(lit_to_string(&meta.value()?.parse::<Lit>()?)),
                "content_type" => {
                    param.content_type = Some(meta.value()?.parse::<LitStr>()?.value())
                }
                "required" => {
                    param.required = Some(if meta.input.peek(syn::Token![=]) {
                        meta.value()?.parse::<LitBool>()?.value
                    } else {
                        true
                    })
                }
                "optional" => param.required = Some(false),
                "security" => param.security = true,
                "flatten" => param.flatten = true,
                other => match other.parse::<ParamLocation>() {
                    Ok(location) => param.location = Some(location),
                    Err(msg) => {
                        debug!("{}", msg);
                        skip_meta(&meta)?;
                    }
                },
            }
            Ok(())
        });
        if let Err(e) = parsed {
            debug!("Ignoring malformed param attribute: {}", e);
        }
        Some(param)
    }
}

/// `#[operator(..)]` overrides on an operator struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorAttr {
    pub id: Option<String>,
    pub tag: Option<String>,
    pub summary: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub response: Option<String>,
}

impl OperatorAttr {
    pub fn from_attrs(attrs: &[Attribute]) -> Self {
        let mut op = OperatorAttr::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("operator")) {
            let parsed = attr.parse_nested_meta(|meta| {
                let key = meta
                    .path
                    .get_ident()
                    .map(|i| i.to_string())
                    .unwrap_or_default();
                match key.as_str() {
                    "status" => op.status = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?),
                    "id" => op.id = Some(meta.value()?.parse::<LitStr>()?.value()),
                    "tag" => op.tag = Some(meta.value()?.parse::<LitStr>()?.value()),
                    "summary" => op.summary = Some(meta.value()?.parse::<LitStr>()?.value()),
                    "method" => {
                        op.method = Some(meta.value()?.parse::<LitStr>()?.value().to_uppercase())
                    }
                    "path" => op.path = Some(meta.value()?.parse::<LitStr>()?.value()),
                    "content_type" => {
                        op.content_type = Some(meta.value()?.parse::<LitStr>()?.value())
                    }
                    "response" => op.response = Some(meta.value()?.parse::<LitStr>()?.value()),
                    _ => skip_meta(&meta)?,
                }
                Ok(())
            });
            if let Err(e) = parsed {
                debug!("Ignoring malformed operator attribute: {}", e);
            }
        }
        op
    }
}

fn lit_to_string(lit: &Lit) -> String {
    match lit {
        Lit::Str(s) => s.value(),
        Lit::Int(i) => i.base10_digits().to_string(),
        Lit::Float(f) => f.base10_digits().to_string(),
        Lit::Bool(b) => b.value.to_string(),
        Lit::Char(c) => c.value().to_string(),
        _ => String::new(),
    }
}

/// Raw token text of `#[validate(..)]`, kept verbatim as an extension.
pub fn validate_tag(attrs: &[Attribute]) -> Option<String> {
    attrs
        .iter()
        .find(|a| a.path().is_ident("validate"))
        .and_then(|a| a.meta.require_list().ok())
        .map(|list| list.tokens.to_string())
}

/// Whether a validation tag demands a value.
pub fn validate_requires(tag: &str) -> bool {
    tag.split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|word| word == "required")
}

/// Whether `#[derive(..)]` lists a path ending in `name`.
pub fn has_derive(attrs: &[Attribute], name: &str) -> bool {
    attrs
        .iter()
        .filter(|a| a.path().is_ident("derive"))
        .any(|attr| {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta
                    .path
                    .segments
                    .last()
                    .map(|s| s.ident == name)
                    .unwrap_or(false)
                {
                    found = true;
                }
                Ok(())
            });
            found
        })
}

/// Whether an attribute whose path ends in `name` is present.
pub fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|a| {
        a.path()
            .segments
            .last()
            .map(|s| s.ident == name)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_docs_split() {
        let item: syn::ItemStruct = parse_quote! {
            /// List users
            ///
            /// Returns one page of users.
            /// Sorted by name.
            struct ListUsers;
        };
        let docs = Docs::from_attrs(&item.attrs);
        assert_eq!(docs.summary.as_deref(), Some("List users"));
        assert_eq!(
            docs.description.as_deref(),
            Some("Returns one page of users.\nSorted by name.")
        );
    }

    #[test]
    fn test_serde_attributes() {
        let field: syn::Field = parse_quote! {
            #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
            name: Option<String>
        };
        let attrs = SerdeAttributes::from_attrs(&field.attrs);
        assert_eq!(attrs.rename.as_deref(), Some("userName"));
        assert!(attrs.default);
        assert!(!attrs.skip);
    }

    #[test]
    fn test_rename_rules() {
        assert_eq!(apply_rename_rule("created_at", "camelCase"), "createdAt");
        assert_eq!(apply_rename_rule("InProgress", "SCREAMING_SNAKE_CASE"), "IN_PROGRESS");
        assert_eq!(apply_rename_rule("InProgress", "kebab-case"), "in-progress");
        assert_eq!(apply_rename_rule("r#type", "UPPERCASE"), "TYPE");
        assert_eq!(apply_rename_rule("x", "unknown"), "x");
    }

    #[test]
    fn test_param_attribute() {
        let field: syn::Field = parse_quote! {
            #[param(header, name = "Authorization", security)]
            auth: String
        };
        let param = ParamAttr::from_attrs(&field.attrs).unwrap();
        assert_eq!(param.location, Some(ParamLocation::Header));
        assert_eq!(param.name.as_deref(), Some("Authorization"));
        assert!(param.security);
    }

    #[test]
    fn test_param_attribute_absent() {
        let field: syn::Field = parse_quote! { size: i32 };
        assert!(ParamAttr::from_attrs(&field.attrs).is_none());
    }

    #[test]
    fn test_operator_attribute() {
        let item: syn::ItemStruct = parse_quote! {
            #[operator(id = "createUser", status = 201, method = "post")]
            struct CreateUser;
        };
        let op = OperatorAttr::from_attrs(&item.attrs);
        assert_eq!(op.id.as_deref(), Some("createUser"));
        assert_eq!(op.status, Some(201));
        assert_eq!(op.method.as_deref(), Some("POST"));
    }

    #[test]
    fn test_validate_and_derive() {
        let item: syn::ItemStruct = parse_quote! {
            #[derive(Debug, httpkit::StatusError)]
            #[validate(required, length(min = 1))]
            struct Thing;
        };
        assert!(has_derive(&item.attrs, "StatusError"));
        let tag = validate_tag(&item.attrs).unwrap();
        assert!(validate_requires(&tag));
        assert!(!validate_requires("length (min = 1)"));
    }
}
