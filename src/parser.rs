use crate::error::{Error, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Parses Rust source files into `syn` syntax trees.
///
/// # Example
///
/// ```no_run
/// use openapi_from_operators::parser::AstParser;
/// use std::path::Path;
///
/// let parsed = AstParser::parse_file(Path::new("src/main.rs")).unwrap();
/// println!("Parsed {} items", parsed.syntax_tree.items.len());
/// ```
pub struct AstParser;

/// A parsed Rust file together with the module path it defines.
#[derive(Debug)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    /// Module path derived from the file location (`src/routes/users.rs` -> `routes::users`)
    pub module_path: Vec<String>,
    /// The parsed abstract syntax tree
    pub syntax_tree: syn::File,
}

impl ParsedFile {
    pub fn new(path: PathBuf, syntax_tree: syn::File) -> Self {
        let module_path = module_path_of(&path);
        Self {
            path,
            module_path,
            syntax_tree,
        }
    }

    /// Parses in-memory source, mostly useful for tests and fixtures.
    pub fn from_source(path: impl Into<PathBuf>, source: &str) -> Result<Self> {
        let path = path.into();
        let syntax_tree = syn::parse_file(source).map_err(|e| Error::Parse {
            file: path.clone(),
            message: e.to_string(),
        })?;
        Ok(Self::new(path, syntax_tree))
    }
}

/// Derives the module path of a file from the components after its last `src`
/// directory. `lib.rs`, `main.rs` and `mod.rs` name their parent module.
pub fn module_path_of(path: &Path) -> Vec<String> {
    let components: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    let start = components
        .iter()
        .rposition(|c| c == "src")
        .map(|i| i + 1)
        .unwrap_or(components.len().saturating_sub(1));

    let mut module: Vec<String> = components[start..].to_vec();
    if let Some(last) = module.pop() {
        let stem = last.trim_end_matches(".rs").to_string();
        if !matches!(stem.as_str(), "lib" | "main" | "mod") {
            module.push(stem);
        }
    }
    module
}

impl AstParser {
    /// Parses a single Rust source file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid syntax.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)?;
        ParsedFile::from_source(path, &content)
    }

    /// Parses every path, keeping failures in place so callers can decide
    /// whether a broken file is worth aborting for.
    pub fn parse_files(paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        debug!("Parsing {} files", paths.len());

        let results: Vec<Result<ParsedFile>> = paths
            .iter()
            .map(|path| {
                Self::parse_file(path).map_err(|e| {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    e
                })
            })
            .collect();

        let success_count = results.iter().filter(|r| r.is_ok()).count();
        debug!(
            "Parsing complete: {} succeeded, {} failed",
            success_count,
            results.len() - success_count
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_module_path_from_src_layout() {
        assert_eq!(
            module_path_of(Path::new("/work/svc/src/routes/users.rs")),
            vec!["routes", "users"]
        );
        assert_eq!(
            module_path_of(Path::new("/work/svc/src/routes/mod.rs")),
            vec!["routes"]
        );
        assert!(module_path_of(Path::new("/work/svc/src/main.rs")).is_empty());
    }

    #[test]
    fn test_module_path_without_src() {
        assert_eq!(module_path_of(Path::new("handlers.rs")), vec!["handlers"]);
    }

    #[test]
    fn test_parse_valid_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("valid.rs");
        fs::write(&file_path, "pub struct ListUsers { pub size: i32 }").unwrap();

        let parsed = AstParser::parse_file(&file_path).unwrap();
        assert_eq!(parsed.path, file_path);
        assert_eq!(parsed.syntax_tree.items.len(), 1);
    }

    #[test]
    fn test_parse_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("broken.rs");
        fs::write(&file_path, "pub fn broken( {").unwrap();

        let err = AstParser::parse_file(&file_path).unwrap_err();
        assert!(matches!(err, Error::Parse { ref file, .. } if file == &file_path));
        assert!(err.to_string().starts_with("parse error in"));
    }

    #[test]
    fn test_parse_files_keeps_failures_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.rs");
        let bad = temp_dir.path().join("bad.rs");
        fs::write(&good, "pub fn hello() {}").unwrap();
        fs::write(&bad, "struct Missing }").unwrap();

        let results = AstParser::parse_files(&[good.clone(), bad]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().path, good);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let err = AstParser::parse_file(Path::new("/nonexistent/file.rs")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
