//! Operator compilation: method, path, parameters, request body, success
//! response and reachable status errors of one operator type.

pub mod response;

use crate::error::{Error, Result};
use crate::eval::{is_http_method, returned_exprs, Evaluator};
use crate::index::attrs::{has_attr, Docs, OperatorAttr, ParamAttr, ParamLocation, SerdeAttributes};
use crate::index::{qualify, Declared, FnDecl, TypeDecl, TypeExpr, TypeIndex};
use crate::openapi_builder::{Header, MediaType, Parameter, RequestBody, Response, SecurityScheme};
use crate::router::OperatorRef;
use crate::schema::{Schema, SchemaCompiler, X_TAG_IN, X_TAG_NAME};
use crate::status_error::{ErrorReachability, StatusErr};
use indexmap::IndexMap;
use log::{debug, warn};
use response::{chain_rules, return_shape, ReturnShape, JSON};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Name of the method whose body produces the response.
pub const OUTPUT_METHOD: &str = "output";
/// Zero-argument method marking an operator as middleware.
pub const CONTEXT_KEY_METHOD: &str = "context_key";

/// Successful response of an operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessResponse {
    pub status: u16,
    pub response: Response,
}

/// A compiled operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    /// Qualified type name, `Group(..)` for path groups
    pub name: String,
    pub id: String,
    /// Declared HTTP method; leaves without one default to GET
    pub method: Option<String>,
    pub path: String,
    pub middleware: bool,
    pub tag: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub response: SuccessResponse,
    pub status_errors: Vec<StatusErr>,
    /// `(scheme name, scheme)` from `#[param(security)]` fields
    pub security: Vec<(String, SecurityScheme)>,
}

impl Operator {
    /// A built-in group: contributes its path and nothing else.
    pub fn group(path: &str) -> Self {
        Self {
            name: format!("Group({})", path),
            id: String::new(),
            method: None,
            path: path.to_string(),
            middleware: false,
            tag: None,
            summary: None,
            description: None,
            deprecated: false,
            parameters: Vec::new(),
            request_body: None,
            response: SuccessResponse {
                status: 204,
                response: Response::described("No Content"),
            },
            status_errors: Vec::new(),
            security: Vec::new(),
        }
    }
}

enum CacheState {
    InProgress,
    Ready(Operator),
    /// Missing location on this field
    Failed(String),
}

/// An operator field after flattening, location already checked.
struct FieldSite<'a> {
    field: &'a syn::Field,
    module: &'a [String],
    container: SerdeAttributes,
    param: ParamAttr,
    location: ParamLocation,
}

/// Memoized operator compiler. Owns the schema table and the reachability
/// memo for the whole run.
pub struct OperatorCompiler<'a> {
    index: &'a TypeIndex,
    schemas: SchemaCompiler<'a>,
    errors: ErrorReachability<'a>,
    cache: HashMap<String, CacheState>,
}

impl<'a> OperatorCompiler<'a> {
    pub fn new(index: &'a TypeIndex) -> Self {
        Self {
            index,
            schemas: SchemaCompiler::new(index),
            errors: ErrorReachability::new(index),
            cache: HashMap::new(),
        }
    }

    pub fn schemas_mut(&mut self) -> &mut SchemaCompiler<'a> {
        &mut self.schemas
    }

    pub fn into_schemas(self) -> SchemaCompiler<'a> {
        self.schemas
    }

    pub fn compile(&mut self, operator: &OperatorRef) -> Result<Operator> {
        let (module, name) = match operator {
            OperatorRef::Group { path } => return Ok(Operator::group(path)),
            OperatorRef::Type { module, name } => (module, name),
        };
        let key = qualify(module, name);
        match self.cache.get(&key) {
            Some(CacheState::Ready(op)) => return Ok(op.clone()),
            Some(CacheState::Failed(field)) => {
                return Err(Error::MissingLocation {
                    operator: key,
                    field: field.clone(),
                })
            }
            Some(CacheState::InProgress) => {
                return Err(Error::InvalidArgument(format!(
                    "operator `{}` is compiled while already being compiled",
                    key
                )))
            }
            None => {}
        }

        let index = self.index;
        let decl = index
            .find_struct(module, name)
            .ok_or_else(|| Error::InvalidArgument(format!("operator `{}` is not a declared struct", key)))?;
        self.cache.insert(key.clone(), CacheState::InProgress);
        match self.compile_struct(decl, &key) {
            Ok(op) => {
                self.cache.insert(key, CacheState::Ready(op.clone()));
                Ok(op)
            }
            Err(Error::MissingLocation { operator, field }) => {
                self.cache.insert(key, CacheState::Failed(field.clone()));
                Err(Error::MissingLocation { operator, field })
            }
            Err(e) => {
                self.cache.remove(&key);
                Err(e)
            }
        }
    }

    fn compile_struct(&mut self, decl: &'a Declared<syn::ItemStruct>, key: &str) -> Result<Operator> {
        let index = self.index;
        let type_name = decl.item.ident.to_string();
        let attr = OperatorAttr::from_attrs(&decl.item.attrs);
        let docs = Docs::from_attrs(&decl.item.attrs);

        // Every location is checked before any schema is compiled.
        let mut sites = Vec::new();
        let mut visited = HashSet::new();
        collect_fields(index, decl, key, &mut sites, &mut visited)?;

        let evaluate_method = |method: &str| -> Option<String> {
            let f = index.zero_arg_method(&decl.module, &type_name, method)?;
            let evaluator = Evaluator::new(index, &f.module, f.self_ty.as_deref());
            returned_exprs(&f.block)
                .into_iter()
                .find_map(|e| evaluator.eval_str(e))
        };
        let method = attr.method.clone().or_else(|| {
            evaluate_method("method")
                .map(|m| m.to_uppercase())
                .filter(|m| is_http_method(m))
        });
        let path = attr
            .path
            .clone()
            .or_else(|| evaluate_method("path"))
            .unwrap_or_default();
        let middleware = index.zero_arg_method(&decl.module, &type_name, CONTEXT_KEY_METHOD).is_some();

        let mut parameters = Vec::new();
        let mut security = Vec::new();
        let mut request_body = None;
        let mut form: Option<(&'static str, IndexMap<String, Schema>, Vec<String>)> = None;
        for site in &sites {
            let ty = TypeExpr::from(&site.field.ty);
            let member = self
                .schemas
                .compile_member(site.field, &ty, &site.container, site.module)?;
            let name = site.param.name.clone().unwrap_or_else(|| member.name.clone());

            if let Some(media_type) = site.location.form_media_type() {
                let (_, properties, required) =
                    form.get_or_insert_with(|| (media_type, IndexMap::new(), Vec::new()));
                if site.param.required.unwrap_or(member.required) {
                    required.push(name.clone());
                }
                let schema = member
                    .schema
                    .with_extension(X_TAG_IN, site.location.as_str())
                    .settle();
                properties.insert(name, schema);
                continue;
            }

            if site.location == ParamLocation::Body {
                if request_body.is_some() {
                    debug!("{}: ignoring extra body field {}", key, member.ident);
                    continue;
                }
                let mut schema = member.schema;
                let description = schema.description.take();
                let content_type = site.param.content_type.clone().unwrap_or_else(|| JSON.to_string());
                request_body = Some(RequestBody {
                    description,
                    required: site.param.required.unwrap_or(member.required),
                    content: IndexMap::from([(content_type, MediaType { schema })]),
                });
                continue;
            }

            if site.param.security && site.location != ParamLocation::Path {
                security.push((name.clone(), SecurityScheme::api_key(&name, site.location)));
                continue;
            }

            let mut schema = member.schema;
            let description = schema.description.take();
            if site.param.name.is_some() {
                schema = schema.with_extension(X_TAG_NAME, name.clone());
            }
            if let Some(default) = &site.param.default {
                schema.default = Some(default_value(default));
            }
            let required = site.location == ParamLocation::Path
                || site.param.required.unwrap_or(member.required);
            parameters.push(Parameter {
                name,
                location: site.location.as_str().to_string(),
                required,
                description,
                schema: schema.settle(),
            });
        }

        if let Some((media_type, properties, required)) = form {
            if request_body.is_some() {
                debug!("{}: body field takes precedence over form fields", key);
            } else {
                request_body = Some(RequestBody {
                    description: None,
                    required: !required.is_empty(),
                    content: IndexMap::from([(
                        media_type.to_string(),
                        MediaType {
                            schema: Schema::object(properties, required),
                        },
                    )]),
                });
            }
        }

        let output = index.method(&decl.module, &type_name, OUTPUT_METHOD);
        let response = self.success_response(&attr, output, key)?;
        let status_errors = match output {
            Some(output) => self.errors.reachable(output),
            None => Vec::new(),
        };

        Ok(Operator {
            name: key.to_string(),
            id: attr.id.clone().unwrap_or_else(|| type_name.clone()),
            method,
            path,
            middleware,
            tag: attr.tag.clone().or_else(|| decl.module.last().cloned()),
            summary: attr.summary.clone().or(docs.summary),
            description: docs.description,
            deprecated: has_attr(&decl.item.attrs, "deprecated"),
            parameters,
            request_body,
            response,
            status_errors,
            security,
        })
    }

    fn success_response(&mut self, attr: &OperatorAttr, output: Option<&'a FnDecl>, key: &str) -> Result<SuccessResponse> {
        let index = self.index;
        let (rules, shape, module) = match output {
            Some(f) => {
                let evaluator = Evaluator::new(index, &f.module, f.self_ty.as_deref());
                (chain_rules(f, &evaluator), return_shape(&f.return_type()), f.module.as_slice())
            }
            None => (Default::default(), ReturnShape::Empty, &[][..]),
        };

        let mut headers = None;
        let explicit_type = match &attr.response {
            Some(written) => match syn::parse_str::<syn::Type>(written) {
                Ok(ty) => Some(TypeExpr::from(&ty)),
                Err(e) => {
                    warn!("{}: ignoring unparseable response type `{}`: {}", key, written, e);
                    None
                }
            },
            None => None,
        };

        let body = if let Some((file_name, content_type)) = &rules.attachment {
            headers = Some(IndexMap::from([(
                "Content-Disposition".to_string(),
                Header {
                    description: Some(format!("attachment; filename=\"{}\"", file_name)),
                    schema: Schema::typed("string"),
                },
            )]));
            Some((content_type.clone(), Schema::binary()))
        } else {
            let declared = match &shape {
                ReturnShape::Body(ty, media) => Some((ty.clone(), *media)),
                ReturnShape::Empty => None,
            };
            match explicit_type.or(rules.schema.clone()) {
                Some(ty) => Some((JSON.to_string(), self.schemas.compile(&ty, module)?)),
                None => match declared {
                    Some((ty, media)) => Some((media.to_string(), self.schemas.compile(&ty, module)?)),
                    None => None,
                },
            }
        };

        let status = attr
            .status
            .or(rules.status)
            .unwrap_or(if body.is_some() { 200 } else { 204 });
        let content = body.map(|(media, schema)| {
            let media = attr
                .content_type
                .clone()
                .or_else(|| rules.content_type.clone())
                .unwrap_or(media);
            IndexMap::from([(media, MediaType { schema })])
        });
        Ok(SuccessResponse {
            status,
            response: Response {
                description: reason_phrase(status).to_string(),
                headers,
                content,
                extensions: BTreeMap::new(),
            },
        })
    }
}

/// Gathers the parameter fields of `decl`, inlining flattened fields and
/// failing on the first exported field without a location.
fn collect_fields<'a>(
    index: &'a TypeIndex,
    decl: &'a Declared<syn::ItemStruct>,
    operator: &str,
    sites: &mut Vec<FieldSite<'a>>,
    visited: &mut HashSet<String>,
) -> Result<()> {
    if !visited.insert(qualify(&decl.module, &decl.item.ident.to_string())) {
        return Ok(());
    }
    let container = SerdeAttributes::from_attrs(&decl.item.attrs);
    let syn::Fields::Named(fields) = &decl.item.fields else {
        return Ok(());
    };
    for field in &fields.named {
        let serde_attrs = SerdeAttributes::from_attrs(&field.attrs);
        if serde_attrs.skip {
            continue;
        }
        let param = ParamAttr::from_attrs(&field.attrs);
        let ident = field.ident.as_ref().map(|i| i.to_string()).unwrap_or_default();

        if serde_attrs.flatten || param.as_ref().is_some_and(|p| p.flatten) {
            let ty = TypeExpr::from(&field.ty);
            match ty.peel().as_path().and_then(|p| index.find_type(p, &decl.module)) {
                Some(TypeDecl::Struct(inner)) => collect_fields(index, inner, operator, sites, visited)?,
                _ => debug!("{}: cannot flatten field {}", operator, ident),
            }
            continue;
        }

        match param.and_then(|p| p.location.map(|l| (p, l))) {
            Some((param, location)) => sites.push(FieldSite {
                field,
                module: &decl.module,
                container: container.clone(),
                param,
                location,
            }),
            None if matches!(field.vis, syn::Visibility::Public(_)) => {
                return Err(Error::MissingLocation {
                    operator: operator.to_string(),
                    field: ident,
                })
            }
            None => debug!("{}: private field {} is not a parameter", operator, ident),
        }
    }
    Ok(())
}

/// `"10"` becomes a number, `"true"` a boolean, anything else stays a string.
fn default_value(raw: &str) -> serde_json::Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .filter(|v| !v.is_object() && !v.is_array())
        .unwrap_or_else(|| serde_json::Value::String(raw.to_string()))
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => match status / 100 {
            2 => "Success",
            3 => "Redirection",
            4 => "Client Error",
            _ => "Server Error",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedFile;
    use pretty_assertions::assert_eq;

    fn index_of(source: &str) -> TypeIndex {
        TypeIndex::new(&[ParsedFile::from_source("src/users.rs", source).unwrap()])
    }

    fn op_ref(name: &str) -> OperatorRef {
        OperatorRef::Type {
            module: vec!["users".to_string()],
            name: name.to_string(),
        }
    }

    const USERS: &str = r#"
        pub const USERS_PATH: &str = "/users";

        #[derive(StatusError)]
        pub enum UserErr {
            /// user not found
            NotFound = 404_000_001,
        }

        pub struct User { pub id: u64, pub name: String }

        pub struct Pager {
            #[param(query, default = "10")]
            pub size: Option<u32>,
            #[param(query)]
            pub offset: Option<u32>,
        }

        /// List users
        /// Paged listing of every user.
        #[deprecated]
        pub struct ListUsers {
            #[param(path)]
            pub org: String,
            #[serde(flatten)]
            pub pager: Pager,
            #[param(header, name = "X-Trace-Id")]
            pub trace: Option<String>,
            #[param(header, name = "Authorization", security)]
            pub token: String,
            cache: Cache,
        }

        impl ListUsers {
            pub fn method(&self) -> &'static str { "get" }
            pub fn path(&self) -> &'static str { USERS_PATH }
            pub fn output(&self, ctx: &Context) -> Result<Vec<User>, StatusError> {
                let users = load(self.org.as_str())?;
                if users.is_empty() { return Err(UserErr::NotFound.into()); }
                Ok(users)
            }
        }

        pub struct Upload {
            #[param(multipart)]
            pub file: Bytes,
            #[param(multipart)]
            pub note: Option<String>,
        }

        impl Upload {
            fn method(&self) -> Method { Method::POST }
            fn output(&self) -> Result<(), StatusError> { Ok(()) }
        }

        pub struct Broken {
            #[param(query)]
            pub ok: u32,
            pub missing: u32,
        }

        pub struct Auth {
            #[param(header, name = "X-Tenant")]
            pub tenant: String,
        }
        impl Auth {
            fn context_key(&self) -> &'static str { "auth" }
        }
    "#;

    #[test]
    fn test_compile_leaf_operator() {
        let index = index_of(USERS);
        let mut compiler = OperatorCompiler::new(&index);
        let op = compiler.compile(&op_ref("ListUsers")).unwrap();

        assert_eq!(op.id, "ListUsers");
        assert_eq!(op.method.as_deref(), Some("GET"));
        assert_eq!(op.path, "/users");
        assert_eq!(op.tag.as_deref(), Some("users"));
        assert_eq!(op.summary.as_deref(), Some("List users"));
        assert_eq!(op.description.as_deref(), Some("Paged listing of every user."));
        assert!(op.deprecated);
        assert!(!op.middleware);

        let params: Vec<(&str, &str, bool)> = op
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.location.as_str(), p.required))
            .collect();
        assert_eq!(
            params,
            vec![
                ("org", "path", true),
                ("size", "query", false),
                ("offset", "query", false),
                ("X-Trace-Id", "header", false),
            ]
        );
        assert_eq!(op.parameters[1].schema.default, Some(serde_json::json!(10)));
        assert_eq!(op.security.len(), 1);
        assert_eq!(op.security[0].0, "Authorization");

        assert_eq!(op.response.status, 200);
        let content = op.response.response.content.as_ref().unwrap();
        let schema = &content["application/json"].schema;
        assert_eq!(schema.schema_type.as_deref(), Some("array"));
        assert_eq!(
            op.status_errors.iter().map(|e| e.key.as_str()).collect::<Vec<_>>(),
            vec!["NotFound"]
        );
    }

    #[test]
    fn test_multipart_fields_aggregate() {
        let index = index_of(USERS);
        let mut compiler = OperatorCompiler::new(&index);
        let op = compiler.compile(&op_ref("Upload")).unwrap();

        assert_eq!(op.method.as_deref(), Some("POST"));
        assert_eq!(op.response.status, 204);
        assert!(op.response.response.content.is_none());

        let body = op.request_body.unwrap();
        let schema = &body.content["multipart/form-data"].schema;
        let properties = schema.properties.as_ref().unwrap();
        assert_eq!(properties.keys().collect::<Vec<_>>(), vec!["file", "note"]);
        assert_eq!(properties["file"].format.as_deref(), Some("binary"));
        assert_eq!(schema.required, Some(vec!["file".to_string()]));
    }

    #[test]
    fn test_missing_location_is_cached() {
        let index = index_of(USERS);
        let mut compiler = OperatorCompiler::new(&index);
        for _ in 0..2 {
            let err = compiler.compile(&op_ref("Broken")).unwrap_err();
            assert!(matches!(
                err,
                Error::MissingLocation { ref field, .. } if field == "missing"
            ));
        }
    }

    #[test]
    fn test_middleware_and_groups() {
        let index = index_of(USERS);
        let mut compiler = OperatorCompiler::new(&index);
        let auth = compiler.compile(&op_ref("Auth")).unwrap();
        assert!(auth.middleware);
        assert_eq!(auth.parameters[0].name, "X-Tenant");
        assert_eq!(
            auth.parameters[0].schema.extensions.get(X_TAG_NAME),
            Some(&serde_json::json!("X-Tenant"))
        );

        let group = compiler
            .compile(&OperatorRef::Group {
                path: "/v1".to_string(),
            })
            .unwrap();
        assert_eq!(group.path, "/v1");
        assert!(group.parameters.is_empty());
    }

    #[test]
    fn test_operator_attribute_overrides() {
        let index = index_of(
            r#"
            pub struct Report { pub rows: u32 }
            #[operator(id = "exportReport", method = "post", path = "/export", status = 202, response = "Report")]
            pub struct Export {}
            impl Export {
                fn method(&self) -> &'static str { "GET" }
                fn output(&self) -> Result<String, StatusError> { Ok(String::new()) }
            }
            "#,
        );
        let mut compiler = OperatorCompiler::new(&index);
        let op = compiler.compile(&op_ref("Export")).unwrap();
        assert_eq!(op.id, "exportReport");
        assert_eq!(op.method.as_deref(), Some("POST"));
        assert_eq!(op.path, "/export");
        assert_eq!(op.response.status, 202);
        let content = op.response.response.content.unwrap();
        assert_eq!(
            content["application/json"].schema.ref_name(),
            Some("Report")
        );
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_value("10"), serde_json::json!(10));
        assert_eq!(default_value("true"), serde_json::json!(true));
        assert_eq!(default_value("asc"), serde_json::json!("asc"));
    }
}
