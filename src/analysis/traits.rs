//! Core traits for source analysis.

use std::path::Path;

use super::{FileFacts, ParseError};

/// Holds a parsed tree-sitter tree and associated metadata.
///
/// This is kept separate from FileFacts so the tree can be inspected
/// without re-parsing.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// The original source code (kept for node text extraction).
    pub source: Vec<u8>,
    /// The file path (for error reporting).
    pub path: std::path::PathBuf,
}

impl ParsedFile {
    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }
}

/// Language-specific analyzer trait.
///
/// Note: tree_sitter::Parser is not Sync, so implementations should
/// create parsers as needed.
pub trait LanguageAnalyzer {
    /// Parse a source file into a tree-sitter tree.
    ///
    /// Partial parse errors are still returned as a valid tree with ERROR
    /// nodes; rejecting them is up to `extract_facts`.
    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, ParseError>;

    /// Extract package, import, constraint and interface facts.
    fn extract_facts(&self, parsed: &ParsedFile) -> Result<FileFacts, ParseError>;
}
