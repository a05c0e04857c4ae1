//! AST-backed Go source analysis.
//!
//! This module turns Go files into interface descriptors in two phases:
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Go Files        │────▶│ GoAnalyzer   │────▶│ FileFacts     │
//! └─────────────────┘     │ (tree-sitter)│     │ (per file)    │
//!                         └──────────────┘     └───────────────┘
//!                                                      │ PackageLoader::load
//!                                                      ▼
//!                                              ┌───────────────┐
//!                                              │ Interface     │
//!                                              │ (resolved)    │
//!                                              └───────────────┘
//! ```
//!
//! Ingestion (`PackageLoader::parse`) is per file and its failures are
//! local to that file. Resolution (`PackageLoader::load`) needs every file
//! of a package and fails as a whole.

mod constraints;
mod facts;
mod languages;
mod loader;
mod traits;

use std::path::PathBuf;

use thiserror::Error;

pub use constraints::{BuildContext, ConstraintError, Expr};
pub use facts::{Embed, FileFacts, Import, Interface, InterfaceDecl, Method, Param, Span};
pub use languages::GoAnalyzer;
pub use loader::PackageLoader;
pub use traits::{LanguageAnalyzer, ParsedFile};

/// Failure to ingest a single file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("reading {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("syntax error in {} at line {}", .path.display(), .line)]
    Syntax { path: PathBuf, line: usize },
    #[error("no package clause in {}", .0.display())]
    MissingPackage(PathBuf),
    #[error("{}: {}", .path.display(), .source)]
    Constraint {
        path: PathBuf,
        #[source]
        source: ConstraintError,
    },
    #[error("tree-sitter grammar: {0}")]
    Grammar(String),
}

/// Failure of the deferred cross-file resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("found packages {} in {}", .names.join(", "), .dir.display())]
    MultiplePackages { dir: PathBuf, names: Vec<String> },
    #[error("{name} redeclared in package {package} ({} and {})", .first.display(), .second.display())]
    Redeclared {
        package: String,
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("embedding cycle in package {package}: {}", .chain.join(" -> "))]
    EmbeddingCycle { package: String, chain: Vec<String> },
}
