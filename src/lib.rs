//! Static OpenAPI generation for services built from routers and operators.
//!
//! The analyzed program is never compiled or executed. Its sources are
//! parsed with `syn`, router scopes and their `register`/`attach` calls are
//! replayed to rebuild the route tree, and every leaf route is compiled into
//! an OpenAPI operation: parameters and bodies from `#[param(..)]` fields,
//! the success response from the `output` method, and the documented error
//! responses from the status errors that method can reach.
//!
//! # Pipeline
//!
//! 1. [`scanner`] collects the `.rs` files of the project
//! 2. [`parser`] parses them and derives module paths
//! 3. [`index`] builds the declaration table
//! 4. [`router`] reconstructs the router tree from the entry points
//! 5. [`operator`] compiles each operator type, using [`schema`] and [`status_error`]
//! 6. [`openapi_builder`] folds routes into operations and assembles the document
//! 7. [`serializer`] writes JSON or YAML
//!
//! # Example
//!
//! ```no_run
//! use openapi_from_operators::{
//!     index::TypeIndex,
//!     openapi_builder::{GeneratorConfig, OpenApiBuilder},
//!     parser::AstParser,
//!     scanner::FileScanner,
//!     serializer::serialize_json,
//! };
//! use std::path::PathBuf;
//!
//! let scan = FileScanner::new(PathBuf::from("./my-service")).scan().unwrap();
//! let parsed: Vec<_> = AstParser::parse_files(&scan.rust_files)
//!     .into_iter()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! let index = TypeIndex::new(&parsed);
//! let generation = OpenApiBuilder::new(GeneratorConfig::default())
//!     .generate(&index)
//!     .unwrap();
//! println!("{}", serialize_json(&generation.document).unwrap());
//! ```

pub mod cli;
pub mod error;
pub mod eval;
pub mod index;
pub mod openapi_builder;
pub mod operator;
pub mod parser;
pub mod router;
pub mod scanner;
pub mod schema;
pub mod serializer;
pub mod status_error;
