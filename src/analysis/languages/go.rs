//! Go language analyzer using tree-sitter.
//!
//! Extracts:
//! - The package clause
//! - Imports
//! - Build constraints from the file header
//! - Top-level type names
//! - Interface declarations with their method sets and embedded elements

use std::collections::HashSet;
use std::path::Path;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use crate::analysis::{
    Embed, FileFacts, Import, InterfaceDecl, LanguageAnalyzer, Method, Param, ParseError,
    ParsedFile, Span,
};

/// Tree-sitter query for top-level type declarations.
const TYPE_QUERY: &str = r#"
(source_file
  (type_declaration
    (type_spec
      name: (type_identifier) @type_name
      type: (_) @type_body
    ) @spec
  )
)

(source_file
  (type_declaration
    (type_alias
      name: (type_identifier) @type_name
    ) @spec
  )
)
"#;

/// Tree-sitter query for extracting imports.
const IMPORT_QUERY: &str = r#"
(import_spec
  name: (_)? @alias
  path: (interpreted_string_literal) @path
) @import
"#;

/// Tree-sitter query for package declaration.
const PACKAGE_QUERY: &str = r#"
(package_clause
  (package_identifier) @package_name
)
"#;

/// Go language analyzer.
pub struct GoAnalyzer {
    language: Language,
}

impl GoAnalyzer {
    /// Create a new Go analyzer.
    pub fn new() -> Self {
        Self {
            language: tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Create a new parser for this call.
    fn create_parser(&self) -> Result<Parser, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| ParseError::Grammar(e.to_string()))?;
        Ok(parser)
    }

    fn query(&self, source: &str) -> Result<Query, ParseError> {
        Query::new(&self.language, source).map_err(|e| ParseError::Grammar(e.to_string()))
    }

    /// Extract the package name from a parsed file.
    fn extract_package(&self, parsed: &ParsedFile) -> Result<Option<String>, ParseError> {
        let query = self.query(PACKAGE_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        if let Some(m) = matches.next() {
            for capture in m.captures {
                let name = query.capture_names()[capture.index as usize];
                if name == "package_name" {
                    return Ok(Some(parsed.node_text(capture.node).to_string()));
                }
            }
        }
        Ok(None)
    }

    /// Extract imports from a parsed file.
    fn extract_imports(&self, parsed: &ParsedFile) -> Result<Vec<Import>, ParseError> {
        let query = self.query(IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut imports = Vec::new();
        let mut seen_paths = HashSet::new();

        while let Some(m) = matches.next() {
            let mut path = String::new();
            let mut alias = None;

            for capture in m.captures {
                let name = query.capture_names()[capture.index as usize];
                match name {
                    "path" => {
                        path = parsed.node_text(capture.node).trim_matches('"').to_string();
                    }
                    "alias" => {
                        alias = Some(parsed.node_text(capture.node).to_string());
                    }
                    _ => {}
                }
            }

            if !path.is_empty() && seen_paths.insert(path.clone()) {
                imports.push(Import { path, alias });
            }
        }

        Ok(imports)
    }

    /// Collect `//go:build` and `// +build` lines from the header comments.
    ///
    /// Only comments before the package clause count.
    fn extract_constraints(&self, parsed: &ParsedFile) -> (Option<String>, Vec<String>) {
        let root = parsed.tree.root_node();
        let mut go_build = None;
        let mut plus_build = Vec::new();

        for child in root.children(&mut root.walk()) {
            if child.kind() == "package_clause" {
                break;
            }
            if child.kind() != "comment" {
                continue;
            }
            let text = parsed.node_text(child);
            if let Some(expr) = text.strip_prefix("//go:build") {
                go_build = Some(expr.trim().to_string());
            } else if let Some(line) = text.strip_prefix("//").map(str::trim_start) {
                if let Some(body) = line.strip_prefix("+build") {
                    plus_build.push(body.trim().to_string());
                }
            }
        }

        (go_build, plus_build)
    }

    /// Extract top-level type names and interface declarations.
    fn extract_types(
        &self,
        parsed: &ParsedFile,
    ) -> Result<(Vec<String>, Vec<InterfaceDecl>), ParseError> {
        let query = self.query(TYPE_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut type_names = Vec::new();
        let mut interfaces = Vec::new();
        let mut seen_positions = HashSet::new();

        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut body = None;
            let mut spec = None;

            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "type_name" => name = parsed.node_text(capture.node).to_string(),
                    "type_body" => body = Some(capture.node),
                    "spec" => spec = Some(capture.node),
                    _ => {}
                }
            }

            let Some(spec) = spec else { continue };
            if name.is_empty() || !seen_positions.insert(spec.start_byte()) {
                continue;
            }

            type_names.push(name.clone());

            if let Some(body) = body.filter(|b| b.kind() == "interface_type") {
                let type_params = spec
                    .child_by_field_name("type_parameters")
                    .map(|n| parsed.node_text(n).to_string());
                let (methods, embeds) = self.extract_interface_body(parsed, body);
                interfaces.push(InterfaceDecl {
                    name,
                    span: Span::from_node(spec),
                    type_params,
                    methods,
                    embeds,
                });
            }
        }

        type_names.sort();
        interfaces.sort_by_key(|i| i.span.start_byte);
        Ok((type_names, interfaces))
    }

    /// Split an `interface_type` body into methods and embedded elements.
    fn extract_interface_body(&self, parsed: &ParsedFile, body: Node) -> (Vec<Method>, Vec<Embed>) {
        let mut methods = Vec::new();
        let mut embeds = Vec::new();

        for elem in body.named_children(&mut body.walk()) {
            match elem.kind() {
                "method_elem" | "method_spec" => {
                    if let Some(method) = self.extract_method(parsed, elem) {
                        methods.push(method);
                    }
                }
                "type_elem" | "constraint_elem" => {
                    let types: Vec<Node> = elem.named_children(&mut elem.walk()).collect();
                    match types.as_slice() {
                        [single] if single.kind() != "negated_type" => {
                            embeds.push(self.embed_for(parsed, *single));
                        }
                        _ => embeds.push(Embed::Constraint(parsed.node_text(elem).to_string())),
                    }
                }
                "type_identifier" | "qualified_type" => {
                    embeds.push(self.embed_for(parsed, elem));
                }
                "comment" => {}
                _ => embeds.push(Embed::Constraint(parsed.node_text(elem).to_string())),
            }
        }

        (methods, embeds)
    }

    fn embed_for(&self, parsed: &ParsedFile, node: Node) -> Embed {
        match node.kind() {
            "type_identifier" => Embed::Local(parsed.node_text(node).to_string()),
            "qualified_type" => {
                let package = node
                    .child_by_field_name("package")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default();
                let name = node
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default();
                Embed::Qualified { package, name }
            }
            _ => Embed::Constraint(parsed.node_text(node).to_string()),
        }
    }

    fn extract_method(&self, parsed: &ParsedFile, elem: Node) -> Option<Method> {
        let name = parsed.node_text(elem.child_by_field_name("name")?).to_string();
        let (params, variadic) = elem
            .child_by_field_name("parameters")
            .map(|list| self.extract_params(parsed, list))
            .unwrap_or_default();

        let results = match elem.child_by_field_name("result") {
            Some(result) if result.kind() == "parameter_list" => {
                self.extract_params(parsed, result).0
            }
            Some(result) => vec![Param::unnamed(parsed.node_text(result))],
            None => Vec::new(),
        };

        Some(Method {
            name,
            params,
            results,
            variadic,
        })
    }

    /// Flatten a `parameter_list` so that `a, b int` yields two params.
    fn extract_params(&self, parsed: &ParsedFile, list: Node) -> (Vec<Param>, bool) {
        let mut params = Vec::new();
        let mut variadic = false;

        for decl in list.named_children(&mut list.walk()) {
            let is_variadic = decl.kind() == "variadic_parameter_declaration";
            if decl.kind() != "parameter_declaration" && !is_variadic {
                continue;
            }
            variadic |= is_variadic;

            let type_text = decl
                .child_by_field_name("type")
                .map(|t| parsed.node_text(t).to_string())
                .unwrap_or_default();

            let names: Vec<String> = decl
                .children_by_field_name("name", &mut decl.walk())
                .map(|n| parsed.node_text(n).to_string())
                .collect();

            if names.is_empty() {
                params.push(Param::unnamed(type_text));
            } else {
                params.extend(names.into_iter().map(|n| Param::named(n, type_text.clone())));
            }
        }

        (params, variadic)
    }
}

impl Default for GoAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for GoAnalyzer {
    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, ParseError> {
        let mut parser = self.create_parser()?;
        let tree = parser.parse(source, None).ok_or_else(|| ParseError::Syntax {
            path: path.to_path_buf(),
            line: 0,
        })?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: path.to_path_buf(),
        })
    }

    fn extract_facts(&self, parsed: &ParsedFile) -> Result<FileFacts, ParseError> {
        let root = parsed.tree.root_node();
        if root.has_error() {
            return Err(ParseError::Syntax {
                path: parsed.path.clone(),
                line: first_error_line(root),
            });
        }

        let package = self
            .extract_package(parsed)?
            .ok_or_else(|| ParseError::MissingPackage(parsed.path.clone()))?;
        let imports = self.extract_imports(parsed)?;
        let (go_build, plus_build) = self.extract_constraints(parsed);
        let (type_names, interfaces) = self.extract_types(parsed)?;

        Ok(FileFacts {
            path: parsed.path.clone(),
            package,
            imports,
            go_build,
            plus_build,
            type_names,
            interfaces,
        })
    }
}

/// 1-indexed line of the first ERROR or MISSING node.
fn first_error_line(node: Node) -> usize {
    if node.is_error() || node.is_missing() {
        return node.start_position().row + 1;
    }
    for child in node.children(&mut node.walk()) {
        if child.has_error() {
            return first_error_line(child);
        }
    }
    node.start_position().row + 1
}
