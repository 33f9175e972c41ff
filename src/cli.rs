use crate::index::TypeIndex;
use crate::openapi_builder::{GeneratorConfig, OpenApiBuilder};
use crate::parser::{AstParser, ParsedFile};
use crate::scanner::FileScanner;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Generate an OpenAPI document from the router and operator declarations of a Rust service
#[derive(Parser, Debug)]
#[command(name = "openapi-from-operators")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Rust project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "json")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Document title
    #[arg(long, env = "OPENAPI_TITLE", default_value = "Generated API")]
    pub title: String,

    /// Document version
    #[arg(long = "api-version", env = "OPENAPI_VERSION", default_value = "1.0.0")]
    pub api_version: String,

    /// Document description
    #[arg(long)]
    pub description: Option<String>,

    /// Server URL, may be repeated
    #[arg(long = "server", value_name = "URL")]
    pub servers: Vec<String>,

    /// Entry-point function searched for the serve call, may be repeated
    #[arg(long = "entry", value_name = "FN", default_values_t = ["main".to_string(), "init".to_string()])]
    pub entry_points: Vec<String>,

    /// Fail when any endpoint had to be left out
    #[arg(long)]
    pub strict: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl CliArgs {
    /// Checks the arguments and folds them into a generator configuration.
    pub fn validate(&self) -> Result<GeneratorConfig> {
        debug!("Parsed arguments: {:?}", self);

        if !self.project_path.exists() {
            anyhow::bail!("Project path does not exist: {}", self.project_path.display());
        }
        if !self.project_path.is_dir() {
            anyhow::bail!("Project path is not a directory: {}", self.project_path.display());
        }
        if self.entry_points.iter().any(|e| e.trim().is_empty()) {
            anyhow::bail!("Entry-point names must not be empty");
        }
        if self.title.trim().is_empty() {
            anyhow::bail!("Title must not be empty");
        }

        Ok(GeneratorConfig {
            title: self.title.clone(),
            version: self.api_version.clone(),
            description: self.description.clone(),
            servers: self.servers.clone(),
            entry_points: self.entry_points.clone(),
        })
    }
}

/// Outcome of a run, for the final summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_scanned: usize,
    pub files_parsed: usize,
    pub operations: usize,
    pub skipped: usize,
}

/// Run the main workflow
pub fn run(args: &CliArgs) -> Result<RunSummary> {
    let config = args.validate()?;
    info!("Starting OpenAPI document generation...");
    info!("Project path: {}", args.project_path.display());

    let scan_result = FileScanner::new(args.project_path.clone()).scan()?;
    info!("Found {} Rust files", scan_result.rust_files.len());
    if scan_result.rust_files.is_empty() {
        anyhow::bail!("No Rust files found in the project directory");
    }

    // Unparseable sources abort the run.
    let parsed_files = AstParser::parse_files(&scan_result.rust_files)
        .into_iter()
        .collect::<crate::error::Result<Vec<ParsedFile>>>()?;
    info!("Successfully parsed {} files", parsed_files.len());

    let index = TypeIndex::new(&parsed_files);
    let generation = OpenApiBuilder::new(config).generate(&index)?;

    for skipped in &generation.skipped {
        warn!("Skipped {}: {}", skipped.route, skipped.reason);
    }
    if args.strict && !generation.skipped.is_empty() {
        anyhow::bail!(
            "{} endpoint(s) were skipped and --strict is set",
            generation.skipped.len()
        );
    }

    let content = match args.output_format {
        OutputFormat::Json => serialize_json(&generation.document)?,
        OutputFormat::Yaml => serialize_yaml(&generation.document)?,
    };
    match &args.output_path {
        Some(output_path) => {
            write_to_file(&content, output_path)?;
            info!("Wrote OpenAPI document to {}", output_path.display());
        }
        None => print!("{}", content),
    }

    let summary = RunSummary {
        files_scanned: scan_result.rust_files.len(),
        files_parsed: parsed_files.len(),
        operations: generation
            .document
            .paths
            .values()
            .map(|item| item.operations().len())
            .sum(),
        skipped: generation.skipped.len(),
    };
    info!(
        "Summary: {} file(s), {} operation(s), {} skipped endpoint(s)",
        summary.files_parsed, summary.operations, summary.skipped
    );
    Ok(summary)
}
