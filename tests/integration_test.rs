//! End-to-end tests driving the whole pipeline over small service projects.

use openapi_from_operators::error::Error;
use openapi_from_operators::index::TypeIndex;
use openapi_from_operators::openapi_builder::{GeneratorConfig, Generation, OpenApiBuilder};
use openapi_from_operators::parser::AstParser;
use openapi_from_operators::scanner::FileScanner;
use openapi_from_operators::serializer::{serialize_json, serialize_yaml};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

/// Helper function to create a temporary project with the given files
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().unwrap();

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(file_path, content).unwrap();
    }

    temp_dir
}

fn service_project() -> TempDir {
    create_test_project(vec![
        ("Cargo.toml", "[package]\nname = \"users\"\nversion = \"0.1.0\"\n"),
        ("src/main.rs", include_str!("fixtures/service/main.rs")),
        ("src/errors.rs", include_str!("fixtures/service/errors.rs")),
        ("src/middleware.rs", include_str!("fixtures/service/middleware.rs")),
        ("src/users.rs", include_str!("fixtures/service/users.rs")),
        ("src/files.rs", include_str!("fixtures/service/files.rs")),
    ])
}

fn run_pipeline(project: &TempDir) -> openapi_from_operators::error::Result<Generation> {
    let scan_result = FileScanner::new(project.path().to_path_buf()).scan().unwrap();
    let parsed_files = AstParser::parse_files(&scan_result.rust_files)
        .into_iter()
        .collect::<openapi_from_operators::error::Result<Vec<_>>>()?;
    let index = TypeIndex::new(&parsed_files);
    let config = GeneratorConfig {
        title: "Users".to_string(),
        ..GeneratorConfig::default()
    };
    OpenApiBuilder::new(config).generate(&index)
}

fn document_json(generation: &Generation) -> Value {
    serde_json::from_str(&serialize_json(&generation.document).unwrap()).unwrap()
}

#[test]
fn test_service_paths_and_methods() {
    let project = service_project();
    let generation = run_pipeline(&project).unwrap();
    assert!(generation.skipped.is_empty());

    let doc = document_json(&generation);
    assert_eq!(doc["openapi"], "3.0.3");
    assert_eq!(doc["info"]["title"], "Users");
    assert_eq!(doc["servers"], json!([{"url": "/"}]));

    let paths: Vec<&String> = doc["paths"].as_object().unwrap().keys().collect();
    assert_eq!(
        paths,
        vec![
            "/api/v1/ghosts/0",
            "/api/v1/storage/files",
            "/api/v1/storage/files/{name}",
            "/api/v1/storage/stats",
            "/api/v1/users",
            "/api/v1/users/{id}",
        ]
    );
    assert!(doc["paths"]["/api/v1/users"]["get"].is_object());
    assert!(doc["paths"]["/api/v1/users"]["post"].is_object());
    assert_eq!(doc["paths"]["/api/v1/users/{id}"]["get"]["operationId"], "GetUser");
    assert_eq!(doc["paths"]["/api/v1/users/{id}"]["get"]["tags"], json!(["users"]));
}

#[test]
fn test_wrapper_registrations() {
    let project = service_project();
    let doc = document_json(&run_pipeline(&project).unwrap());

    // `mount` is called from `main` and sees its scope; `nested` is one
    // level deeper and its registration is dropped.
    let ids: Vec<String> = doc["paths"]
        .as_object()
        .unwrap()
        .values()
        .flat_map(|item| item.as_object().unwrap().values())
        .map(|op| op["operationId"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"ListUsers".to_string()));
    assert!(!ids.contains(&"Hidden".to_string()));
}

#[test]
fn test_middleware_contributions() {
    let project = service_project();
    let doc = document_json(&run_pipeline(&project).unwrap());
    let list = &doc["paths"]["/api/v1/users"]["get"];

    let names: Vec<&str> = list["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["tenant", "size", "pet"]);
    assert_eq!(list["parameters"][1]["schema"]["default"], 10);
    assert_eq!(list["security"], json!([{"Authorization": []}]));
    assert_eq!(
        doc["components"]["securitySchemes"]["Authorization"],
        json!({"type": "apiKey", "name": "Authorization", "in": "header"})
    );
    assert_eq!(
        list["responses"]["401"]["x-status-errors"],
        json!(["@StatusErr[Unauthorized][401000001][unauthorized]"])
    );
}

#[test]
fn test_reachable_errors_are_bucketed() {
    let project = service_project();
    let doc = document_json(&run_pipeline(&project).unwrap());
    let responses = &doc["paths"]["/api/v1/users/{id}"]["get"]["responses"];

    let statuses: Vec<&String> = responses.as_object().unwrap().keys().collect();
    assert_eq!(statuses, vec!["200", "401", "403", "404"]);
    assert_eq!(
        responses["404"]["x-status-errors"],
        json!(["@StatusErr[NotFound][404000001][user not found]"])
    );
    assert_eq!(
        responses["403"]["x-status-errors"],
        json!(["@StatusErr[Forbidden][403000001][forbidden]!"])
    );
    assert_eq!(
        responses["404"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/StatusError"
    );
}

#[test]
fn test_success_responses() {
    let project = service_project();
    let doc = document_json(&run_pipeline(&project).unwrap());
    let paths = &doc["paths"];

    let created = &paths["/api/v1/users"]["post"];
    assert_eq!(created["requestBody"]["required"], true);
    assert_eq!(
        created["requestBody"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/User"
    );
    assert_eq!(
        created["responses"]["201"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/User"
    );

    let download = &paths["/api/v1/storage/files/{name}"]["get"]["responses"]["200"];
    assert_eq!(download["content"]["text/csv"]["schema"], json!({"type": "string", "format": "binary"}));
    assert!(download["headers"]["Content-Disposition"].is_object());

    let upload = &paths["/api/v1/storage/files"]["post"];
    let form = &upload["requestBody"]["content"]["multipart/form-data"]["schema"];
    assert_eq!(
        form["properties"].as_object().unwrap().keys().collect::<Vec<_>>(),
        vec!["file", "comment"]
    );
    assert!(upload["responses"]["204"].is_object());
}

#[test]
fn test_component_schemas() {
    let project = service_project();
    let doc = document_json(&run_pipeline(&project).unwrap());
    let schemas = &doc["components"]["schemas"];

    assert_eq!(schemas["Pet"]["enum"], json!(["DOG", "CAT", "FISH"]));

    let user = &schemas["User"];
    assert_eq!(
        user["properties"].as_object().unwrap().keys().collect::<Vec<_>>(),
        vec!["id", "displayName", "pet", "manager"]
    );
    assert_eq!(user["properties"]["manager"]["allOf"][0]["$ref"], "#/components/schemas/User");
}

#[test]
fn test_output_is_deterministic() {
    let project = service_project();
    let first = serialize_json(&run_pipeline(&project).unwrap().document).unwrap();
    let second = serialize_json(&run_pipeline(&project).unwrap().document).unwrap();
    assert_eq!(first, second);

    let yaml = serialize_yaml(&run_pipeline(&project).unwrap().document).unwrap();
    assert!(yaml.contains("openapi: 3.0.3"));
    assert!(yaml.contains("/api/v1/users/{id}:"));
}

#[test]
fn test_custom_error_formatter() {
    let project = create_test_project(vec![(
        "src/main.rs",
        r#"
        #[derive(StatusError)]
        pub enum ItemErr {
            /// item not found
            NotFound = 404_000_001,
        }

        /// Error body rendered by the service.
        #[derive(Serialize)]
        pub struct ApiError {
            pub code: i64,
            pub message: String,
        }

        impl ApiError {
            pub fn status_codes() -> HashMap<i64, u16> {
                HashMap::from([(404_000_001, 410)])
            }
        }

        pub struct GetItem {
            #[param(path)]
            pub id: u64,
        }

        impl GetItem {
            fn path(&self) -> &'static str { "/items/:id" }
            fn output(&self) -> Result<String, StatusError> {
                Err(ItemErr::NotFound.into())
            }
        }

        fn main() {
            let app = App::new().with_error_formatter(ApiError::default());
            serve(router![GetItem]);
        }
        "#,
    )]);
    let doc = document_json(&run_pipeline(&project).unwrap());
    let responses = &doc["paths"]["/items/{id}"]["get"]["responses"];

    assert!(responses["404"].is_null());
    assert_eq!(
        responses["410"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/ApiError"
    );
    assert!(doc["components"]["schemas"]["StatusError"].is_null());
}

#[test]
fn test_missing_location_is_skipped() {
    let project = create_test_project(vec![(
        "src/main.rs",
        r#"
        pub struct Ping;
        impl Ping {
            fn path(&self) -> &'static str { "/ping" }
        }
        pub struct Search {
            pub keyword: String,
        }
        fn main() {
            let root = router![];
            root.register(router![Ping]);
            root.register(router![Group::new("/search"), Search]);
            serve(root);
        }
        "#,
    )]);
    let generation = run_pipeline(&project).unwrap();
    assert_eq!(generation.skipped.len(), 1);
    assert!(generation.skipped[0].route.contains("Search"));
    assert!(generation.document.paths.contains_key("/ping"));
    assert!(!generation.document.paths.contains_key("/search"));
}

#[test]
fn test_duplicate_operation_id_is_fatal() {
    let project = create_test_project(vec![
        (
            "src/main.rs",
            r#"
            mod a;
            mod b;
            fn main() {
                let root = router![];
                root.register(router![Group::new("/a"), a::Ping]);
                root.register(router![Group::new("/b"), b::Ping]);
                serve(root);
            }
            "#,
        ),
        ("src/a.rs", "pub struct Ping;"),
        ("src/b.rs", "pub struct Ping;"),
    ]);
    let err = run_pipeline(&project).unwrap_err();
    assert!(matches!(err, Error::DuplicateOperationId { ref id, .. } if id == "Ping"));
}

#[test]
fn test_no_root_router() {
    let project = create_test_project(vec![("src/lib.rs", "pub struct Ping;")]);
    assert!(matches!(run_pipeline(&project), Err(Error::NoRootRouter(_))));
}

#[test]
fn test_unparseable_source_is_fatal() {
    let project = create_test_project(vec![("src/main.rs", "fn main( {")]);
    assert!(matches!(run_pipeline(&project), Err(Error::Parse { .. })));
}
