//! Package loader: ingests Go files one at a time, then resolves them into
//! interface descriptors in a single deferred pass.
//!
//! Resolution is the only step that sees every file of a package at once.
//! It checks package consistency, flattens embedded interfaces declared in
//! other files of the same package and computes import paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::constraints::{BuildContext, Expr};
use super::{
    Embed, FileFacts, GoAnalyzer, Import, Interface, InterfaceDecl, LanguageAnalyzer, Method,
    Param, ParseError, ResolveError,
};

/// Collects per-file facts for one run and resolves them into interfaces.
///
/// A loader is consumed by [`PackageLoader::load`], so descriptors never
/// outlive the pass that produced them.
pub struct PackageLoader {
    analyzer: Box<dyn LanguageAnalyzer>,
    context: BuildContext,
    base_dir: Option<PathBuf>,
    files: Vec<FileFacts>,
    excluded: Vec<PathBuf>,
}

impl PackageLoader {
    /// Create a loader for the host platform and the given build tags.
    pub fn new(build_tags: &[String]) -> Self {
        Self::with_context(BuildContext::host(build_tags))
    }

    /// Create a loader for an explicit build context.
    pub fn with_context(context: BuildContext) -> Self {
        Self {
            analyzer: Box::new(GoAnalyzer::new()),
            context,
            base_dir: None,
            files: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// Set the directory import paths fall back to when no `go.mod` exists.
    pub fn base_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Number of files accepted so far.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Files dropped because their build constraints do not hold.
    pub fn excluded(&self) -> &[PathBuf] {
        &self.excluded
    }

    /// Ingest one file.
    ///
    /// Files whose build constraints do not hold are accepted but left out
    /// of resolution.
    pub fn parse<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ParseError> {
        let path = path.as_ref();
        let source = fs::read(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = self.analyzer.parse(path, &source)?;
        let facts = self.analyzer.extract_facts(&parsed)?;

        if self.is_included(&facts)? {
            debug!(
                "parsed {} ({} interfaces)",
                path.display(),
                facts.interfaces.len()
            );
            self.files.push(facts);
        } else {
            debug!("excluded by build constraints: {}", path.display());
            self.excluded.push(path.to_path_buf());
        }
        Ok(())
    }

    fn is_included(&self, facts: &FileFacts) -> Result<bool, ParseError> {
        let file_name = facts
            .path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if !self.context.matches_file_name(&file_name) {
            return Ok(false);
        }

        if let Some(expr) = &facts.go_build {
            let expr = Expr::parse(expr).map_err(|source| ParseError::Constraint {
                path: facts.path.clone(),
                source,
            })?;
            return Ok(expr.eval(&self.context));
        }

        Ok(facts
            .plus_build
            .iter()
            .all(|line| self.context.satisfies_plus_build(line)))
    }

    /// Resolve every ingested file into interface descriptors.
    ///
    /// Descriptors are ordered by package import path, then name.
    pub fn load(self) -> Result<Vec<Interface>, ResolveError> {
        let mut by_dir: BTreeMap<PathBuf, Vec<&FileFacts>> = BTreeMap::new();
        for facts in &self.files {
            let dir = facts.path.parent().unwrap_or(Path::new("")).to_path_buf();
            by_dir.entry(dir).or_default().push(facts);
        }

        let mut modules = ModuleCache::default();
        let mut interfaces = Vec::new();

        for (dir, files) in &by_dir {
            let package_path = match modules.import_path(dir) {
                Some(path) => path,
                None => self.fallback_import_path(dir),
            };
            let package = Package::new(dir, &package_path, files)?;
            interfaces.extend(package.resolve()?);
        }

        interfaces.sort_by(|a, b| {
            (a.package_path.as_str(), a.name.as_str()).cmp(&(b.package_path.as_str(), b.name.as_str()))
        });
        debug!("resolved {} interfaces", interfaces.len());
        Ok(interfaces)
    }

    fn fallback_import_path(&self, dir: &Path) -> String {
        let rel = self
            .base_dir
            .as_deref()
            .and_then(|base| dir.strip_prefix(base).ok());
        match rel {
            Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Some(rel) => slash_path(rel),
            None => slash_path(dir),
        }
    }
}

/// Files of one directory, checked for consistency.
struct Package<'a> {
    name: String,
    path: String,
    decls: HashMap<&'a str, (&'a FileFacts, &'a InterfaceDecl)>,
    local_types: BTreeSet<String>,
}

impl<'a> Package<'a> {
    fn new(dir: &Path, path: &str, files: &[&'a FileFacts]) -> Result<Self, ResolveError> {
        let names: BTreeSet<&str> = files.iter().map(|f| f.package.as_str()).collect();
        if names.len() > 1 {
            return Err(ResolveError::MultiplePackages {
                dir: dir.to_path_buf(),
                names: names.into_iter().map(String::from).collect(),
            });
        }
        let name = names.into_iter().next().unwrap_or_default().to_string();

        let mut declared_in: HashMap<&str, &Path> = HashMap::new();
        for facts in files {
            for type_name in &facts.type_names {
                if let Some(first) = declared_in.insert(type_name, &facts.path) {
                    return Err(ResolveError::Redeclared {
                        package: path.to_string(),
                        name: type_name.clone(),
                        first: first.to_path_buf(),
                        second: facts.path.clone(),
                    });
                }
            }
        }

        let decls = files
            .iter()
            .flat_map(|&f| f.interfaces.iter().map(move |i| (i.name.as_str(), (f, i))))
            .collect();

        Ok(Self {
            name,
            path: path.to_string(),
            decls,
            local_types: declared_in.keys().map(|k| k.to_string()).collect(),
        })
    }

    fn resolve(&self) -> Result<Vec<Interface>, ResolveError> {
        let mut resolved = Vec::with_capacity(self.decls.len());

        for (facts, decl) in self.decls.values() {
            let mut set = MethodSet::default();
            let mut stack = vec![decl.name.clone()];
            self.collect(facts, decl, &mut set, &mut stack)?;

            resolved.push(Interface {
                name: decl.name.clone(),
                package_name: self.name.clone(),
                package_path: self.path.clone(),
                file: facts.path.clone(),
                methods: set.methods,
                imports: set.imports,
                local_types: self.local_types.clone(),
                type_params: decl.type_params.clone(),
                unresolved_embeds: set.unresolved,
                constraints: set.constraints,
            });
        }

        Ok(resolved)
    }

    /// Merge `decl`'s methods and, recursively, those of its local embeds.
    ///
    /// Methods keep referring to the imports of the file that declares them;
    /// a qualifier that clashes with one already in the set is re-aliased.
    fn collect(
        &self,
        facts: &FileFacts,
        decl: &InterfaceDecl,
        set: &mut MethodSet,
        stack: &mut Vec<String>,
    ) -> Result<(), ResolveError> {
        let renames = set.merge_imports(&facts.imports);
        for method in &decl.methods {
            set.add(method, &renames);
        }

        for embed in &decl.embeds {
            match embed {
                Embed::Local(name) => match self.decls.get(name.as_str()) {
                    Some((embedded_facts, embedded)) => {
                        if stack.contains(name) {
                            let mut chain = stack.clone();
                            chain.push(name.clone());
                            return Err(ResolveError::EmbeddingCycle {
                                package: self.path.clone(),
                                chain,
                            });
                        }
                        stack.push(name.clone());
                        self.collect(embedded_facts, embedded, set, stack)?;
                        stack.pop();
                    }
                    None => self.collect_predeclared(name, set),
                },
                Embed::Qualified { .. } => set.unresolved.push(embed.to_string()),
                Embed::Constraint(text) => set.constraints.push(text.clone()),
            }
        }

        Ok(())
    }

    /// An embedded name with no interface declaration in the package.
    ///
    /// The predeclared `error` and `any` are interfaces; any other name,
    /// `comparable` included, is a type-set term.
    fn collect_predeclared(&self, name: &str, set: &mut MethodSet) {
        if self.local_types.contains(name) {
            set.constraints.push(name.to_string());
            return;
        }
        match name {
            "error" => set.add(
                &Method {
                    name: "Error".to_string(),
                    params: Vec::new(),
                    results: vec![Param::unnamed("string")],
                    variadic: false,
                },
                &HashMap::new(),
            ),
            "any" => {}
            _ => set.constraints.push(name.to_string()),
        }
    }
}

#[derive(Default)]
struct MethodSet {
    methods: Vec<Method>,
    imports: Vec<Import>,
    unresolved: Vec<String>,
    constraints: Vec<String>,
}

impl MethodSet {
    /// Add the imports of one contributing file.
    ///
    /// Returns the qualifier renames that file's type expressions need:
    /// a path already present under another name maps to that name, and a
    /// new path whose name is taken gets a numbered alias.
    fn merge_imports(&mut self, imports: &[Import]) -> HashMap<String, String> {
        let mut renames = HashMap::new();

        for import in imports {
            let local = import.local_name();
            if matches!(import.alias.as_deref(), Some("_") | Some(".")) {
                if !self.imports.iter().any(|i| i.path == import.path) {
                    self.imports.push(import.clone());
                }
                continue;
            }
            if let Some(existing) = self.imports.iter().find(|i| i.path == import.path) {
                if existing.local_name() != local {
                    renames.insert(local.to_string(), existing.local_name().to_string());
                }
                continue;
            }
            if !self.imports.iter().any(|i| i.local_name() == local) {
                self.imports.push(import.clone());
                continue;
            }

            let alias = (1..)
                .map(|n| format!("{}{}", local, n))
                .find(|a| !self.imports.iter().any(|i| i.local_name() == a))
                .unwrap_or_default();
            renames.insert(local.to_string(), alias.clone());
            self.imports.push(Import {
                path: import.path.clone(),
                alias: Some(alias),
            });
        }

        renames
    }

    fn add(&mut self, method: &Method, renames: &HashMap<String, String>) {
        if self.methods.iter().any(|m| m.name == method.name) {
            return;
        }
        let mut method = method.clone();
        if !renames.is_empty() {
            for param in method.params.iter_mut().chain(method.results.iter_mut()) {
                param.type_text = requalify(&param.type_text, renames);
            }
        }
        self.methods.push(method);
    }
}

/// Rewrite package qualifiers in a type expression.
fn requalify(text: &str, renames: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut prev = None;

    while let Some((start, c)) = chars.next() {
        if !(c.is_alphabetic() || c == '_') {
            out.push(c);
            prev = Some(c);
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some((i, n)) = chars.next_if(|&(_, n)| n.is_alphanumeric() || n == '_') {
            end = i + n.len_utf8();
        }

        let ident = &text[start..end];
        let qualifier = text[end..].starts_with('.') && prev != Some('.');
        match renames.get(ident) {
            Some(to) if qualifier => out.push_str(to),
            _ => out.push_str(ident),
        }
        prev = ident.chars().last();
    }

    out
}

/// Memoizes `go.mod` lookups per directory.
#[derive(Default)]
struct ModuleCache {
    roots: HashMap<PathBuf, Option<(PathBuf, String)>>,
}

impl ModuleCache {
    /// Import path of `dir` derived from the nearest enclosing `go.mod`.
    fn import_path(&mut self, dir: &Path) -> Option<String> {
        let (root, module) = self.module_for(dir)?;
        let rel = dir.strip_prefix(&root).ok()?;
        if rel.as_os_str().is_empty() {
            Some(module)
        } else {
            Some(format!("{}/{}", module, slash_path(rel)))
        }
    }

    fn module_for(&mut self, dir: &Path) -> Option<(PathBuf, String)> {
        if let Some(cached) = self.roots.get(dir) {
            return cached.clone();
        }

        let found = match read_module_path(&dir.join("go.mod")) {
            Some(module) => Some((dir.to_path_buf(), module)),
            None => dir.parent().and_then(|parent| self.module_for(parent)),
        };
        self.roots.insert(dir.to_path_buf(), found.clone());
        found
    }
}

fn read_module_path(go_mod: &Path) -> Option<String> {
    let content = fs::read_to_string(go_mod).ok()?;
    content.lines().find_map(|line| {
        line.trim()
            .strip_prefix("module")
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(|rest| rest.trim().trim_matches('"').to_string())
    })
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn loader(base: &Path) -> PackageLoader {
        PackageLoader::with_context(BuildContext::new("linux", "amd64", &[])).base_dir(base)
    }

    #[test]
    fn test_flattens_embeds_across_files() {
        let temp = TempDir::new().unwrap();
        let a = write(
            temp.path(),
            "rw/reader.go",
            "package rw\n\ntype Reader interface {\n\tRead(p []byte) (int, error)\n}\n",
        );
        let b = write(
            temp.path(),
            "rw/readwriter.go",
            "package rw\n\ntype ReadWriter interface {\n\tReader\n\tWrite(p []byte) (int, error)\n}\n",
        );

        let mut loader = loader(temp.path());
        loader.parse(&a).unwrap();
        loader.parse(&b).unwrap();
        let interfaces = loader.load().unwrap();

        let names: Vec<_> = interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ReadWriter", "Reader"]);

        let rw = &interfaces[0];
        let methods: Vec<_> = rw.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["Write", "Read"]);
        assert_eq!(rw.package_path, "rw");
        assert_eq!(rw.package_name, "rw");
        assert!(rw.local_types.contains("Reader"));
    }

    #[test]
    fn test_embedded_methods_carry_their_file_imports() {
        let temp = TempDir::new().unwrap();
        let reader = write(
            temp.path(),
            "store/reader.go",
            "package store\n\nimport \"context\"\n\ntype Reader interface {\n\tGet(ctx context.Context) error\n}\n",
        );
        let store = write(
            temp.path(),
            "store/store.go",
            "package store\n\ntype Store interface {\n\tReader\n\tClose() error\n}\n",
        );

        let mut loader = loader(temp.path());
        loader.parse(&reader).unwrap();
        loader.parse(&store).unwrap();
        let interfaces = loader.load().unwrap();

        let store = interfaces.iter().find(|i| i.name == "Store").unwrap();
        assert_eq!(
            store.imports,
            vec![Import {
                path: "context".to_string(),
                alias: None,
            }]
        );
        assert_eq!(store.methods[1].params[0].type_text, "context.Context");
    }

    #[test]
    fn test_clashing_import_names_are_aliased() {
        let temp = TempDir::new().unwrap();
        let seeded = write(
            temp.path(),
            "gen/seeded.go",
            "package gen\n\nimport \"math/rand\"\n\ntype Seeded interface {\n\tSource() rand.Source\n}\n",
        );
        let secure = write(
            temp.path(),
            "gen/secure.go",
            "package gen\n\nimport \"crypto/rand\"\n\ntype Secure interface {\n\tSeeded\n\tReader() *rand.Reader\n}\n",
        );

        let mut loader = loader(temp.path());
        loader.parse(&seeded).unwrap();
        loader.parse(&secure).unwrap();
        let interfaces = loader.load().unwrap();

        let secure = interfaces.iter().find(|i| i.name == "Secure").unwrap();
        assert_eq!(secure.imports.len(), 2);
        assert_eq!(secure.imports[0].local_name(), "rand");
        assert_eq!(secure.imports[0].path, "crypto/rand");

        // Seeded is flattened after Secure's own methods, so its qualifier moves.
        assert_eq!(secure.imports[1].path, "math/rand");
        assert_eq!(secure.imports[1].local_name(), "rand1");
        assert_eq!(secure.methods[0].results[0].type_text, "*rand.Reader");
        assert_eq!(secure.methods[1].results[0].type_text, "rand1.Source");
    }

    #[test]
    fn test_requalify_only_touches_qualifiers() {
        let renames = HashMap::from([("rand".to_string(), "rand1".to_string())]);
        assert_eq!(
            requalify("map[rand.Source][]rand", &renames),
            "map[rand1.Source][]rand"
        );
        assert_eq!(requalify("func(rand.Rand) x.rand", &renames), "func(rand1.Rand) x.rand");
    }

    #[test]
    fn test_predeclared_embeds() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "errs/errs.go",
            "package errs\n\ntype Coded interface {\n\terror\n\tCode() int\n}\n\ntype Loose interface {\n\tany\n\tName() string\n}\n\ntype Key interface {\n\tcomparable\n}\n",
        );

        let mut loader = loader(temp.path());
        loader.parse(&file).unwrap();
        let interfaces = loader.load().unwrap();

        let coded = &interfaces[0];
        assert_eq!(coded.name, "Coded");
        let methods: Vec<_> = coded.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["Code", "Error"]);
        assert_eq!(coded.methods[1].results, vec![Param::unnamed("string")]);
        assert!(coded.constraints.is_empty());

        let key = &interfaces[1];
        assert_eq!(key.name, "Key");
        assert_eq!(key.constraints, vec!["comparable"]);

        let loose = &interfaces[2];
        assert_eq!(loose.name, "Loose");
        assert_eq!(loose.methods.len(), 1);
        assert!(loose.constraints.is_empty());
    }

    #[test]
    fn test_import_path_from_go_mod() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "module example.com/app\n\ngo 1.21\n");
        let file = write(
            temp.path(),
            "internal/store/store.go",
            "package store\n\ntype Store interface {\n\tGet(key string) string\n}\n",
        );

        let mut loader = loader(temp.path());
        loader.parse(&file).unwrap();
        let interfaces = loader.load().unwrap();

        assert_eq!(interfaces[0].package_path, "example.com/app/internal/store");
    }

    #[test]
    fn test_qualified_embeds_stay_unresolved() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "body.go",
            "package body\n\nimport \"io\"\n\ntype Body interface {\n\tio.ReadCloser\n\tLen() int\n}\n",
        );

        let mut loader = loader(temp.path());
        loader.parse(&file).unwrap();
        let interfaces = loader.load().unwrap();

        assert_eq!(interfaces[0].unresolved_embeds, vec!["io.ReadCloser"]);
        assert_eq!(interfaces[0].package_path, ".");
    }

    #[test]
    fn test_multiple_packages_is_fatal() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "mixed/a.go", "package one\n");
        let b = write(temp.path(), "mixed/b.go", "package two\n");

        let mut loader = loader(temp.path());
        loader.parse(&a).unwrap();
        loader.parse(&b).unwrap();

        let err = loader.load().unwrap_err();
        assert!(matches!(err, ResolveError::MultiplePackages { .. }));
    }

    #[test]
    fn test_redeclared_type_is_fatal() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "dup/a.go", "package dup\n\ntype Thing interface{}\n");
        let b = write(temp.path(), "dup/b.go", "package dup\n\ntype Thing struct{}\n");

        let mut loader = loader(temp.path());
        loader.parse(&a).unwrap();
        loader.parse(&b).unwrap();

        let err = loader.load().unwrap_err();
        assert!(matches!(err, ResolveError::Redeclared { ref name, .. } if name == "Thing"));
    }

    #[test]
    fn test_embedding_cycle_is_fatal() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "cycle.go",
            "package cycle\n\ntype A interface {\n\tB\n}\n\ntype B interface {\n\tA\n}\n",
        );

        let mut loader = loader(temp.path());
        loader.parse(&file).unwrap();

        let err = loader.load().unwrap_err();
        assert!(matches!(err, ResolveError::EmbeddingCycle { .. }));
    }

    #[test]
    fn test_build_constraints_exclude_files() {
        let temp = TempDir::new().unwrap();
        let windows = write(
            temp.path(),
            "plat/plat_windows.go",
            "package plat\n\ntype Win interface{ A() }\n",
        );
        let tagged = write(
            temp.path(),
            "plat/tagged.go",
            "//go:build integration\n\npackage plat\n\ntype Tagged interface{ B() }\n",
        );
        let legacy = write(
            temp.path(),
            "plat/legacy.go",
            "// +build ignore\n\npackage plat\n\ntype Legacy interface{ C() }\n",
        );
        let plain = write(
            temp.path(),
            "plat/plain.go",
            "package plat\n\ntype Plain interface{ D() }\n",
        );

        let mut loader = loader(temp.path());
        for file in [&windows, &tagged, &legacy, &plain] {
            loader.parse(file).unwrap();
        }
        assert_eq!(loader.excluded().len(), 3);

        let interfaces = loader.load().unwrap();
        let names: Vec<_> = interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Plain"]);
    }

    #[test]
    fn test_build_tags_enable_files() {
        let temp = TempDir::new().unwrap();
        let tagged = write(
            temp.path(),
            "tagged.go",
            "//go:build integration\n\npackage plat\n\ntype Tagged interface{ B() }\n",
        );

        let context = BuildContext::new("linux", "amd64", &["integration".to_string()]);
        let mut loader = PackageLoader::with_context(context);
        loader.parse(&tagged).unwrap();

        assert_eq!(loader.load().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_constraint_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let file = write(temp.path(), "bad.go", "//go:build linux &&\n\npackage bad\n");

        let mut loader = loader(temp.path());
        let err = loader.parse(&file).unwrap_err();
        assert!(matches!(err, ParseError::Constraint { .. }));
    }

    #[test]
    fn test_unreadable_file_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let mut loader = loader(temp.path());
        let err = loader.parse(temp.path().join("missing.go")).unwrap_err();
        assert!(matches!(err, ParseError::Read { .. }));
    }
}
