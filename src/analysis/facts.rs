//! Fact structures extracted from Go source files, and the resolved
//! interface descriptors built from them.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A single parameter or result of a method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Declared name, if any (`_` is kept as written).
    pub name: Option<String>,
    /// Type exactly as written in source, e.g. `[]*http.Request`.
    pub type_text: String,
}

impl Param {
    pub fn unnamed(type_text: impl Into<String>) -> Self {
        Self {
            name: None,
            type_text: type_text.into(),
        }
    }

    pub fn named(name: impl Into<String>, type_text: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            type_text: type_text.into(),
        }
    }
}

/// A method declared in an interface body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    /// Whether the last parameter is variadic (`args ...T`). The variadic
    /// parameter's `type_text` holds the element type `T`.
    pub variadic: bool,
}

/// An embedded element of an interface body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    /// An unqualified interface name from the same package (`Reader`).
    Local(String),
    /// A qualified interface from another package (`io.Reader`).
    Qualified { package: String, name: String },
    /// A type-set element (`~int | ~string`) that only constraint
    /// interfaces may contain.
    Constraint(String),
}

impl fmt::Display for Embed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Embed::Local(name) => write!(f, "{}", name),
            Embed::Qualified { package, name } => write!(f, "{}.{}", package, name),
            Embed::Constraint(text) => write!(f, "{}", text),
        }
    }
}

/// An interface declaration as found in one file, before resolution.
#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub name: String,
    pub span: Span,
    /// Raw type parameter list (`[T any]`) for generic interfaces.
    pub type_params: Option<String>,
    pub methods: Vec<Method>,
    pub embeds: Vec<Embed>,
}

/// An import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// The import path without quotes.
    pub path: String,
    /// Optional alias (e.g., `import log "github.com/sirupsen/logrus"`).
    pub alias: Option<String>,
}

impl Import {
    /// The identifier this import is referenced by in source.
    ///
    /// Without an alias this follows the goimports guess: the last path
    /// element, skipping a trailing `vN` major version, minus a `go-`
    /// prefix and anything from the first non-identifier character on.
    pub fn local_name(&self) -> &str {
        if let Some(alias) = self.alias.as_deref() {
            return alias;
        }

        let mut elems = self.path.rsplit('/');
        let mut last = elems.next().unwrap_or(&self.path);
        if is_major_version(last) {
            if let Some(parent) = elems.next() {
                last = parent;
            }
        }
        let last = last.strip_prefix("go-").unwrap_or(last);
        let end = last
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(last.len());
        &last[..end]
    }
}

fn is_major_version(elem: &str) -> bool {
    elem.strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// All facts extracted from a single Go file.
#[derive(Debug, Clone)]
pub struct FileFacts {
    pub path: PathBuf,
    /// Package name from the package clause.
    pub package: String,
    pub imports: Vec<Import>,
    /// Expression of the `//go:build` line, if present.
    pub go_build: Option<String>,
    /// Bodies of legacy `// +build` lines, in order.
    pub plus_build: Vec<String>,
    /// Every top-level type name declared in the file.
    pub type_names: Vec<String>,
    pub interfaces: Vec<InterfaceDecl>,
}

impl FileFacts {
    /// Find an interface declaration by name.
    pub fn find_interface(&self, name: &str) -> Option<&InterfaceDecl> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

/// A resolved interface: the descriptor handed to the generation step.
///
/// Local embeds are already flattened into `methods`.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    /// Package name from the package clause.
    pub package_name: String,
    /// Import path of the originating package.
    pub package_path: String,
    /// File the interface is declared in.
    pub file: PathBuf,
    pub methods: Vec<Method>,
    /// Imports of every file contributing methods, re-aliased where names clash.
    pub imports: Vec<Import>,
    /// Every type name declared in the originating package.
    pub local_types: BTreeSet<String>,
    pub type_params: Option<String>,
    /// Qualified embeds whose method sets live in other packages.
    pub unresolved_embeds: Vec<String>,
    /// Type-set elements, present only on constraint interfaces.
    pub constraints: Vec<String>,
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package_path, self.name)
    }
}
