//! Document assembly.
//!
//! Every leaf route of the reconstructed router tree becomes one operation.
//! The operators along the route are folded into it: paths concatenate,
//! middleware contributes parameters and status errors, and the leaf owns
//! everything that describes the operation itself.

use crate::error::{Error, Result};
use crate::index::attrs::ParamLocation;
use crate::index::{TypeExpr, TypeIndex};
use crate::operator::{reason_phrase, Operator, OperatorCompiler};
use crate::router::{OperatorRef, Route, RouteTreeBuilder};
use crate::schema::{Schema, X_STATUS_ERRORS};
use crate::status_error::{default_error_schema, detect_formatter, merge_unique, ErrorFormatter, StatusErr};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const OPENAPI_VERSION: &str = "3.0.3";
const ERROR_MEDIA_TYPE: &str = "application/json";

/// Settings of one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// Server URLs; `/` when empty
    pub servers: Vec<String>,
    /// Functions searched for the serve call
    pub entry_points: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            title: "Generated API".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            servers: Vec::new(),
            entry_points: vec!["main".to_string(), "init".to_string()],
        }
    }
}

/// OpenAPI Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI Server object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Operation>,
}

impl PathItem {
    fn slot(&mut self, method: &str) -> Option<&mut Option<Operation>> {
        match method {
            "GET" => Some(&mut self.get),
            "PUT" => Some(&mut self.put),
            "POST" => Some(&mut self.post),
            "DELETE" => Some(&mut self.delete),
            "OPTIONS" => Some(&mut self.options),
            "HEAD" => Some(&mut self.head),
            "PATCH" => Some(&mut self.patch),
            "TRACE" => Some(&mut self.trace),
            _ => None,
        }
    }

    /// Operations in OpenAPI method order.
    pub fn operations(&self) -> Vec<(&'static str, &Operation)> {
        [
            ("GET", &self.get),
            ("PUT", &self.put),
            ("POST", &self.post),
            ("DELETE", &self.delete),
            ("OPTIONS", &self.options),
            ("HEAD", &self.head),
            ("PATCH", &self.patch),
            ("TRACE", &self.trace),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
        .collect()
    }
}

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub operation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Status code to response, ordered
    pub responses: BTreeMap<String, Response>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security: Vec<BTreeMap<String, Vec<String>>>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Parameter location (path, query, header, cookie)
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Schema,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    /// Content types and their schemas
    pub content: IndexMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// OpenAPI Header object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Schema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<IndexMap<String, Header>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<IndexMap<String, MediaType>>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Response {
    pub fn described(description: &str) -> Self {
        Self {
            description: description.to_string(),
            headers: None,
            content: None,
            extensions: BTreeMap::new(),
        }
    }
}

/// OpenAPI SecurityScheme object; only API keys are declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
}

impl SecurityScheme {
    pub fn api_key(name: &str, location: ParamLocation) -> Self {
        Self {
            scheme_type: "apiKey".to_string(),
            name: name.to_string(),
            location: location.as_str().to_string(),
        }
    }
}

/// OpenAPI Components object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub schemas: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    pub servers: Vec<Server>,
    pub paths: BTreeMap<String, PathItem>,
    pub components: Components,
}

/// An endpoint left out of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEndpoint {
    /// Operator chain of the route
    pub route: String,
    pub reason: String,
}

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct Generation {
    pub document: OpenApiDocument,
    pub skipped: Vec<SkippedEndpoint>,
}

/// A leaf route with its chain folded into one operation.
#[derive(Debug, Clone)]
struct Endpoint {
    path: String,
    method: String,
    label: String,
    leaf: Operator,
    parameters: Vec<Parameter>,
    request_body: Option<RequestBody>,
    status_errors: Vec<StatusErr>,
    security: Vec<(String, SecurityScheme)>,
}

/// OpenAPI document builder
pub struct OpenApiBuilder {
    config: GeneratorConfig,
}

impl OpenApiBuilder {
    /// Creates a builder producing documents described by `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Document metadata, servers and the entry point names
    pub fn new(config: GeneratorConfig) -> Self {
        debug!("Initializing OpenApiBuilder");
        Self { config }
    }

    /// Runs the whole pipeline over an indexed program.
    ///
    /// Reconstructs the router tree, compiles every leaf route's operator chain
    /// and folds it into one operation. Endpoints without a usable location, with
    /// an unsupported method, or on a method and path already served by an
    /// earlier endpoint are left out and listed in `Generation::skipped`.
    ///
    /// # Arguments
    ///
    /// * `index` - Declarations of every parsed file
    ///
    /// # Returns
    ///
    /// Returns a `Generation` holding the document and the skipped endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if no root router is found, if two endpoints share an
    /// operation id, or if a type cannot be expressed as a schema.
    pub fn generate(&self, index: &TypeIndex) -> Result<Generation> {
        let tree = RouteTreeBuilder::new(index, &self.config.entry_points).build()?;
        let routes = tree.routes();
        info!("Found {} leaf route(s)", routes.len());

        let formatter = detect_formatter(index);
        let mut compiler = OperatorCompiler::new(index);
        let mut endpoints = Vec::new();
        let mut skipped = Vec::new();
        for route in &routes {
            if matches!(route.leaf(), Some(OperatorRef::Group { .. })) {
                debug!("Route {} ends in a group, no operation", route.label());
                continue;
            }
            match compile_chain(&mut compiler, route) {
                Ok(chain) => endpoints.push(fold(&chain, route)),
                Err(e) if !e.is_fatal() => {
                    warn!("Skipping endpoint {}: {}", route.label(), e);
                    skipped.push(SkippedEndpoint {
                        route: route.label(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        endpoints.sort_by(|a, b| {
            (&a.path, &a.method, &a.label).cmp(&(&b.path, &b.method, &b.label))
        });
        check_operation_ids(&endpoints)?;

        let error_schema = if endpoints.iter().any(|e| !e.status_errors.is_empty()) {
            Some(error_schema(&mut compiler, formatter.as_ref())?)
        } else {
            None
        };

        let mut paths: BTreeMap<String, PathItem> = BTreeMap::new();
        let mut security_schemes = BTreeMap::new();
        for endpoint in endpoints {
            let item = paths.entry(endpoint.path.clone()).or_default();
            let Some(slot) = item.slot(&endpoint.method) else {
                let reason = format!("unsupported method {}", endpoint.method);
                warn!("Skipping endpoint {}: {}", endpoint.label, reason);
                skipped.push(SkippedEndpoint {
                    route: endpoint.label,
                    reason,
                });
                continue;
            };
            if slot.is_some() {
                let reason = format!("{} {} is already served", endpoint.method, endpoint.path);
                warn!("Skipping endpoint {}: {}", endpoint.label, reason);
                skipped.push(SkippedEndpoint {
                    route: endpoint.label,
                    reason,
                });
                continue;
            }
            for (name, scheme) in &endpoint.security {
                security_schemes
                    .entry(name.clone())
                    .or_insert_with(|| scheme.clone());
            }
            debug!("Adding route: {} {}", endpoint.method, endpoint.path);
            *slot = Some(operation(endpoint, error_schema.as_ref(), formatter.as_ref()));
        }
        paths.retain(|_, item| !item.operations().is_empty());

        let servers = if self.config.servers.is_empty() {
            vec![Server {
                url: "/".to_string(),
            }]
        } else {
            self.config
                .servers
                .iter()
                .map(|url| Server { url: url.clone() })
                .collect()
        };

        let schemas = compiler.into_schemas().into_components();
        info!(
            "Built document with {} path(s) and {} schema(s)",
            paths.len(),
            schemas.len()
        );
        Ok(Generation {
            document: OpenApiDocument {
                openapi: OPENAPI_VERSION.to_string(),
                info: Info {
                    title: self.config.title.clone(),
                    version: self.config.version.clone(),
                    description: self.config.description.clone(),
                },
                servers,
                paths,
                components: Components {
                    schemas,
                    security_schemes,
                },
            },
            skipped,
        })
    }
}

fn compile_chain(compiler: &mut OperatorCompiler<'_>, route: &Route) -> Result<Vec<Operator>> {
    route.chain.iter().map(|op| compiler.compile(op)).collect()
}

/// Folds the operators of one route into an endpoint.
fn fold(chain: &[Operator], route: &Route) -> Endpoint {
    let leaf_index = chain.len().saturating_sub(1);
    let contributes = |i: usize, op: &Operator| i == leaf_index || op.middleware;

    let mut parameters: Vec<Parameter> = Vec::new();
    let mut request_body = None;
    let mut status_errors = Vec::new();
    let mut security: Vec<(String, SecurityScheme)> = Vec::new();
    for (i, op) in chain.iter().enumerate() {
        for param in &op.parameters {
            let is_path = param.location == ParamLocation::Path.as_str();
            if !is_path && !contributes(i, op) {
                continue;
            }
            if !parameters
                .iter()
                .any(|p| p.name == param.name && p.location == param.location)
            {
                parameters.push(param.clone());
            }
        }
        if op.request_body.is_some() {
            request_body = op.request_body.clone();
        }
        if contributes(i, op) {
            merge_unique(&mut status_errors, op.status_errors.iter().cloned());
        }
        for (name, scheme) in &op.security {
            if !security.iter().any(|(n, _)| n == name) {
                security.push((name.clone(), scheme.clone()));
            }
        }
    }

    let raw_path: String = chain.iter().map(|op| op.path.as_str()).collect::<Vec<_>>().join("/");
    let leaf = chain.last().cloned().unwrap_or_else(|| Operator::group(""));
    Endpoint {
        path: template_path(&raw_path, &parameters),
        method: leaf.method.clone().unwrap_or_else(|| "GET".to_string()),
        label: route.label(),
        leaf,
        parameters,
        request_body,
        status_errors,
        security,
    }
}

/// Normalizes slashes and turns `:name` segments into `{name}`, or `0` when
/// no path parameter of that name is declared.
pub fn template_path(raw: &str, parameters: &[Parameter]) -> String {
    let declared = |name: &str| {
        parameters
            .iter()
            .any(|p| p.name == name && p.location == ParamLocation::Path.as_str())
    };
    let segments: Vec<String> = raw
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if declared(name) => format!("{{{}}}", name),
            Some(name) => {
                debug!("Path segment :{} has no declared parameter", name);
                "0".to_string()
            }
            None => segment.to_string(),
        })
        .collect();
    format!("/{}", segments.join("/"))
}

fn check_operation_ids(endpoints: &[Endpoint]) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for endpoint in endpoints {
        if let Some(first) = seen.insert(&endpoint.leaf.id, &endpoint.label) {
            return Err(Error::DuplicateOperationId {
                id: endpoint.leaf.id.clone(),
                first: first.to_string(),
                second: endpoint.label.clone(),
            });
        }
    }
    Ok(())
}

/// Schema of every error response: the formatter type when one is registered,
/// the built-in status error record otherwise.
fn error_schema(compiler: &mut OperatorCompiler<'_>, formatter: Option<&ErrorFormatter>) -> Result<Schema> {
    let schemas = compiler.schemas_mut();
    match formatter {
        Some(formatter) => schemas.compile(&TypeExpr::Path(formatter.type_path.clone()), &formatter.module),
        None => Ok(schemas.register_builtin("StatusError", default_error_schema())),
    }
}

/// Status errors grouped by HTTP status, overrides applied.
pub fn bucket_errors(errors: &[StatusErr], formatter: Option<&ErrorFormatter>) -> BTreeMap<u16, Vec<StatusErr>> {
    let mut buckets: BTreeMap<u16, Vec<StatusErr>> = BTreeMap::new();
    for err in errors {
        let status = formatter.map_or_else(|| err.status(), |f| f.status_of(err));
        merge_unique(buckets.entry(status).or_default(), [err.clone()]);
    }
    buckets
}

fn operation(endpoint: Endpoint, error_schema: Option<&Schema>, formatter: Option<&ErrorFormatter>) -> Operation {
    let Endpoint {
        leaf,
        parameters,
        request_body,
        status_errors,
        security,
        ..
    } = endpoint;

    let mut responses = BTreeMap::new();
    responses.insert(leaf.response.status.to_string(), leaf.response.response.clone());
    if let Some(error_schema) = error_schema {
        for (status, errors) in bucket_errors(&status_errors, formatter) {
            let mut summaries: Vec<String> = errors.iter().map(StatusErr::summary).collect();
            summaries.sort();
            let response = responses.entry(status.to_string()).or_insert_with(|| Response {
                content: Some(IndexMap::from([(
                    ERROR_MEDIA_TYPE.to_string(),
                    MediaType {
                        schema: error_schema.clone(),
                    },
                )])),
                ..Response::described(reason_phrase(status))
            });
            response.extensions.insert(
                X_STATUS_ERRORS.to_string(),
                Value::Array(summaries.into_iter().map(Value::String).collect()),
            );
        }
    }

    Operation {
        tags: leaf.tag.clone().into_iter().collect(),
        summary: leaf.summary.clone(),
        description: leaf.description.clone(),
        operation_id: leaf.id.clone(),
        parameters,
        request_body,
        responses,
        deprecated: leaf.deprecated,
        security: security
            .into_iter()
            .map(|(name, _)| BTreeMap::from([(name, Vec::new())]))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedFile;
    use pretty_assertions::assert_eq;

    fn generate(files: &[(&str, &str)]) -> Result<Generation> {
        let parsed: Vec<ParsedFile> = files
            .iter()
            .map(|(path, source)| ParsedFile::from_source(*path, source).unwrap())
            .collect();
        let index = TypeIndex::new(&parsed);
        OpenApiBuilder::new(GeneratorConfig::default()).generate(&index)
    }

    fn path_param(name: &str) -> Parameter {
        Parameter {
            name: name.to_string(),
            location: "path".to_string(),
            required: true,
            description: None,
            schema: Schema::typed("string"),
        }
    }

    #[test]
    fn test_template_path() {
        let params = vec![path_param("id")];
        assert_eq!(template_path("/users/:id", &params), "/users/{id}");
        assert_eq!(template_path("/users/:ghost", &params), "/users/0");
        assert_eq!(template_path("/api//v1/", &[]), "/api/v1");
        assert_eq!(template_path("", &[]), "/");
    }

    #[test]
    fn test_middleware_chain_end_to_end() {
        let generation = generate(&[(
            "src/main.rs",
            r#"
            pub struct Auth {
                #[param(header, name = "Authorization")]
                pub token: String,
            }
            impl Auth {
                fn context_key(&self) -> &'static str { "auth" }
            }
            pub struct ListUsers {
                #[param(query)]
                pub size: Option<u32>,
            }
            impl ListUsers {
                fn output(&self) -> Result<Vec<String>, StatusError> { Ok(vec![]) }
            }
            fn main() {
                let root = Router::new(Group::new("/api"));
                root.register(router![Group::new("/users"), Auth, ListUsers]);
                httpkit::serve(root);
            }
            "#,
        )])
        .unwrap();
        let doc = generation.document;
        let op = doc.paths["/api/users"].get.as_ref().unwrap();
        assert_eq!(op.operation_id, "ListUsers");
        let names: Vec<&str> = op.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Authorization", "size"]);
        assert_eq!(doc.servers, vec![Server { url: "/".to_string() }]);
        assert!(generation.skipped.is_empty());
    }

    #[test]
    fn test_duplicate_operation_id_is_fatal() {
        let err = generate(&[
            (
                "src/main.rs",
                r#"
                fn main() {
                    let root = router![];
                    root.register(router![Group::new("/a"), crate::a::GetUser]);
                    root.register(router![Group::new("/b"), crate::b::GetUser]);
                    serve(root);
                }
                "#,
            ),
            ("src/a.rs", "pub struct GetUser;"),
            ("src/b.rs", "pub struct GetUser;"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateOperationId { ref id, .. } if id == "GetUser"));
    }

    #[test]
    fn test_missing_location_skips_endpoint() {
        let generation = generate(&[(
            "src/main.rs",
            r#"
            pub struct Good;
            impl Good { fn path(&self) -> &'static str { "/good" } }
            pub struct Bad { pub size: u32 }
            impl Bad { fn path(&self) -> &'static str { "/bad" } }
            fn main() {
                let root = router![];
                root.register(router![Good]);
                root.register(router![Bad]);
                serve(root);
            }
            "#,
        )])
        .unwrap();
        assert_eq!(generation.document.paths.keys().collect::<Vec<_>>(), vec!["/good"]);
        assert_eq!(generation.skipped.len(), 1);
        assert_eq!(generation.skipped[0].route, "Bad");
    }

    #[test]
    fn test_error_buckets_with_default_schema() {
        let generation = generate(&[(
            "src/main.rs",
            r#"
            #[derive(StatusError)]
            pub enum UserErr {
                /// user not found
                NotFound = 404_000_001,
                /// user gone
                /// @errTalk
                Gone = 404_000_002,
                /// conflict
                Conflict = 409_000_001,
            }
            pub struct GetUser {
                #[param(path)]
                pub id: u64,
            }
            impl GetUser {
                fn path(&self) -> &'static str { "/users/:id" }
                fn output(&self) -> Result<String, StatusError> {
                    if self.id == 0 { return Err(UserErr::Gone.into()); }
                    if self.id == 1 { return Err(UserErr::Conflict.into()); }
                    Err(UserErr::NotFound.into())
                }
            }
            fn main() { serve(router![GetUser]); }
            "#,
        )])
        .unwrap();
        let doc = generation.document;
        let op = doc.paths["/users/{id}"].get.as_ref().unwrap();
        assert_eq!(op.responses.keys().collect::<Vec<_>>(), vec!["200", "404", "409"]);
        assert_eq!(
            op.responses["404"].extensions[X_STATUS_ERRORS],
            serde_json::json!([
                "@StatusErr[Gone][404000002][user gone]!",
                "@StatusErr[NotFound][404000001][user not found]"
            ])
        );
        let content = op.responses["404"].content.as_ref().unwrap();
        assert_eq!(content[ERROR_MEDIA_TYPE].schema.ref_name(), Some("StatusError"));
        assert!(doc.components.schemas.contains_key("StatusError"));
    }

    #[test]
    fn test_taken_slot_is_reported() {
        let generation = generate(&[(
            "src/main.rs",
            r#"
            pub struct Alpha;
            impl Alpha { fn path(&self) -> &'static str { "/x" } }
            pub struct Beta;
            impl Beta { fn path(&self) -> &'static str { "/x" } }
            fn main() {
                let root = router![];
                root.register(router![Beta]);
                root.register(router![Alpha]);
                serve(root);
            }
            "#,
        )])
        .unwrap();
        let op = generation.document.paths["/x"].get.as_ref().unwrap();
        assert_eq!(op.operation_id, "Alpha");
        assert_eq!(generation.skipped.len(), 1);
        assert_eq!(generation.skipped[0].route, "Beta");
        assert_eq!(generation.skipped[0].reason, "GET /x is already served");
    }

    #[test]
    fn test_unsupported_method_is_reported() {
        let generation = generate(&[(
            "src/main.rs",
            r#"
            #[operator(method = "connect")]
            pub struct Tunnel;
            impl Tunnel { fn path(&self) -> &'static str { "/tunnel" } }
            pub struct Ping;
            impl Ping { fn path(&self) -> &'static str { "/ping" } }
            fn main() {
                let root = router![];
                root.register(router![Tunnel]);
                root.register(router![Ping]);
                serve(root);
            }
            "#,
        )])
        .unwrap();
        assert_eq!(generation.document.paths.keys().collect::<Vec<_>>(), vec!["/ping"]);
        assert_eq!(generation.skipped.len(), 1);
        assert_eq!(generation.skipped[0].route, "Tunnel");
        assert_eq!(generation.skipped[0].reason, "unsupported method CONNECT");
    }

    #[test]
    fn test_same_named_operators_in_different_modules() {
        let generation = generate(&[
            (
                "src/main.rs",
                r#"
                fn main() {
                    let root = router![];
                    root.register(router![crate::users::Create]);
                    root.register(router![crate::orders::Create]);
                    serve(root);
                }
                "#,
            ),
            (
                "src/users.rs",
                r#"
                #[operator(id = "createUser", method = "post")]
                pub struct Create;
                impl Create { fn path(&self) -> &'static str { "/users" } }
                "#,
            ),
            (
                "src/orders.rs",
                r#"
                #[operator(id = "createOrder", method = "put")]
                pub struct Create;
                impl Create { fn path(&self) -> &'static str { "/orders" } }
                "#,
            ),
        ])
        .unwrap();
        let paths = &generation.document.paths;
        assert_eq!(paths.keys().collect::<Vec<_>>(), vec!["/orders", "/users"]);
        assert_eq!(paths["/users"].post.as_ref().unwrap().operation_id, "createUser");
        assert_eq!(paths["/orders"].put.as_ref().unwrap().operation_id, "createOrder");
        assert!(paths["/users"].put.is_none());
        assert!(generation.skipped.is_empty());
    }
}
