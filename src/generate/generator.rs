//! Emits testify mocks for resolved interfaces.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::analysis::{Interface, Method};

use super::{GenerateError, MOCK_IMPORT};

/// Renders the mock for one interface into an in-memory buffer.
///
/// Call order mirrors the layout of the file: [`generate_prologue_note`],
/// [`generate_prologue`], [`generate`], then [`write`].
///
/// [`generate_prologue_note`]: Generator::generate_prologue_note
/// [`generate_prologue`]: Generator::generate_prologue
/// [`generate`]: Generator::generate
/// [`write`]: Generator::write
pub struct Generator<'a> {
    iface: &'a Interface,
    pkg: String,
    in_package: bool,
    buf: String,
}

impl<'a> Generator<'a> {
    pub fn new(iface: &'a Interface, pkg: &str, in_package: bool) -> Self {
        Self {
            iface,
            pkg: pkg.to_string(),
            in_package,
            buf: String::new(),
        }
    }

    /// Emit the generated-code marker followed by the caller's note.
    ///
    /// Note lines are split on newlines and on literal `\n` sequences.
    pub fn generate_prologue_note(&mut self, note: &str) {
        self.emit("// Code generated by mockwalk. DO NOT EDIT.\n");
        if !note.is_empty() {
            self.emit("\n");
            for line in note.replace("\\n", "\n").lines() {
                self.emit(&format!("// {}\n", line));
            }
        }
        self.emit("\n");
    }

    /// Emit the package clause and imports.
    pub fn generate_prologue(&mut self, pkg: &str) {
        let name = if self.in_package {
            self.iface.package_name.clone()
        } else {
            pkg.rsplit('/').next().unwrap_or(pkg).to_string()
        };
        self.emit(&format!("package {}\n\n", name));

        for (path, local) in self.imports() {
            self.emit(&format!("import {} \"{}\"\n", local, path));
        }
        self.emit("\n");
    }

    /// Emit the mock type and one method per interface method.
    pub fn generate(&mut self) -> Result<(), GenerateError> {
        self.check_mockable()?;

        let iface = self.iface;
        let mock = self.mock_name();
        self.emit(&format!(
            "// {mock} is an autogenerated mock type for the {name} type\ntype {mock} struct {{\n\tmock.Mock\n}}\n\n",
            name = iface.name,
        ));

        let mut methods: Vec<&Method> = iface.methods.iter().collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        for method in methods {
            self.generate_method(method)?;
        }

        while self.buf.ends_with("\n\n") {
            self.buf.pop();
        }
        Ok(())
    }

    /// Name of the emitted mock type.
    ///
    /// Inside the interface's own package the mock cannot reuse the
    /// interface name, so it gets a `Mock` prefix (`mock` when unexported).
    pub fn mock_name(&self) -> String {
        let name = &self.iface.name;
        if !self.in_package {
            return name.clone();
        }
        if is_exported(name) {
            return format!("Mock{}", name);
        }
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("mock{}{}", first.to_uppercase(), chars.as_str()),
            None => "mock".to_string(),
        }
    }

    /// Write everything emitted so far.
    pub fn write<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.buf.as_bytes())
    }

    /// The rendered text so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    fn emit(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    fn check_mockable(&self) -> Result<(), GenerateError> {
        let iface = self.iface;
        if let Some(params) = &iface.type_params {
            return Err(GenerateError::TypeParameters {
                name: iface.name.clone(),
                params: params.clone(),
            });
        }
        if !iface.constraints.is_empty() {
            return Err(GenerateError::ConstraintInterface {
                name: iface.name.clone(),
                elements: iface.constraints.join("; "),
            });
        }
        if let Some(embed) = iface.unresolved_embeds.first() {
            return Err(GenerateError::UnresolvedEmbed {
                name: iface.name.clone(),
                embed: embed.clone(),
            });
        }
        Ok(())
    }

    /// Imports needed by the mock, keyed by path.
    fn imports(&self) -> BTreeMap<String, String> {
        let mut imports = BTreeMap::new();
        imports.insert(MOCK_IMPORT.to_string(), "mock".to_string());

        let types = self
            .iface
            .methods
            .iter()
            .flat_map(|m| m.params.iter().chain(m.results.iter()))
            .map(|p| p.type_text.as_str());

        for text in types {
            for ident in idents(text) {
                if ident.qualifier {
                    if let Some(import) = self.import_for(ident.text) {
                        imports.insert(import.path.clone(), import.local_name().to_string());
                    }
                } else if self.needs_qualifier(&ident) {
                    imports.insert(
                        self.iface.package_path.clone(),
                        self.iface.package_name.clone(),
                    );
                }
            }
        }

        imports
    }

    fn import_for(&self, qualifier: &str) -> Option<&crate::analysis::Import> {
        self.iface
            .imports
            .iter()
            .filter(|i| !matches!(i.alias.as_deref(), Some("_") | Some(".")))
            .find(|i| i.local_name() == qualifier)
    }

    /// Whether an identifier names a type of the source package that the
    /// mock package must qualify.
    fn needs_qualifier(&self, ident: &Ident) -> bool {
        !self.in_package && !ident.selected && self.iface.local_types.contains(ident.text)
    }

    /// Render a source type for use in the mock package.
    fn render_type(&self, method: &str, text: &str) -> Result<String, GenerateError> {
        let unsupported = |reason: String| GenerateError::UnsupportedType {
            name: self.iface.name.clone(),
            method: method.to_string(),
            reason,
        };

        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for ident in idents(text) {
            if ident.qualifier {
                if self.import_for(ident.text).is_none() {
                    return Err(unsupported(format!(
                        "package {} is not imported by {}",
                        ident.text,
                        self.iface.file.display()
                    )));
                }
                continue;
            }
            if !self.needs_qualifier(&ident) {
                continue;
            }
            if !is_exported(ident.text) {
                return Err(unsupported(format!(
                    "unexported type {} cannot be referenced from package {}",
                    ident.text, self.pkg
                )));
            }
            out.push_str(&text[last..ident.start]);
            out.push_str(&self.iface.package_name);
            out.push('.');
            last = ident.start;
        }

        out.push_str(&text[last..]);
        Ok(out)
    }

    fn generate_method(&mut self, method: &Method) -> Result<(), GenerateError> {
        let mut names = Vec::with_capacity(method.params.len());
        let mut types = Vec::with_capacity(method.params.len());
        for (i, param) in method.params.iter().enumerate() {
            let name = match param.name.as_deref() {
                Some(name) if name != "_" => name.to_string(),
                _ => format!("_a{}", i),
            };
            let mut ty = self.render_type(&method.name, &param.type_text)?;
            if method.variadic && i + 1 == method.params.len() {
                ty = format!("...{}", ty);
            }
            names.push(name);
            types.push(ty);
        }

        let results = method
            .results
            .iter()
            .map(|r| self.render_type(&method.name, &r.type_text))
            .collect::<Result<Vec<_>, _>>()?;

        let decls: Vec<String> = names
            .iter()
            .zip(&types)
            .map(|(n, t)| format!("{} {}", n, t))
            .collect();
        let result_sig = match results.len() {
            0 => String::new(),
            1 => format!(" {}", results[0]),
            _ => format!(" ({})", results.join(", ")),
        };

        self.emit(&format!(
            "// {m} provides a mock function with given fields: {fields}\nfunc (_m *{iface}) {m}({decls}){result_sig} {{\n",
            m = method.name,
            fields = names.join(", "),
            iface = self.mock_name(),
            decls = decls.join(", "),
        ));

        let call = if method.variadic {
            let (va, fixed) = names.split_last().map(|(v, f)| (v.as_str(), f)).unwrap_or_default();
            self.emit(&format!(
                "\t_va := make([]interface{{}}, len({va}))\n\tfor _i := range {va} {{\n\t\t_va[_i] = {va}[_i]\n\t}}\n\tvar _ca []interface{{}}\n",
            ));
            if !fixed.is_empty() {
                self.emit(&format!("\t_ca = append(_ca, {})\n", fixed.join(", ")));
            }
            self.emit("\t_ca = append(_ca, _va...)\n");
            "_m.Called(_ca...)".to_string()
        } else {
            format!("_m.Called({})", names.join(", "))
        };

        if results.is_empty() {
            self.emit(&format!("\t{}\n}}\n\n", call));
            return Ok(());
        }
        self.emit(&format!("\tret := {}\n\n", call));

        let mut call_args = names.clone();
        if method.variadic {
            if let Some(last) = call_args.last_mut() {
                last.push_str("...");
            }
        }
        let call_args = call_args.join(", ");
        let param_types = types.join(", ");

        for (i, result) in results.iter().enumerate() {
            self.emit(&format!(
                "\tvar r{i} {result}\n\tif rf, ok := ret.Get({i}).(func({param_types}) {result}); ok {{\n\t\tr{i} = rf({call_args})\n\t}} else {{\n",
            ));
            if result == "error" {
                self.emit(&format!("\t\tr{i} = ret.Error({i})\n"));
            } else if is_nillable(result) {
                self.emit(&format!(
                    "\t\tif ret.Get({i}) != nil {{\n\t\t\tr{i} = ret.Get({i}).({result})\n\t\t}}\n",
                ));
            } else {
                self.emit(&format!("\t\tr{i} = ret.Get({i}).({result})\n"));
            }
            self.emit("\t}\n\n");
        }

        let returns: Vec<String> = (0..results.len()).map(|i| format!("r{}", i)).collect();
        self.emit(&format!("\treturn {}\n}}\n\n", returns.join(", ")));
        Ok(())
    }
}

/// An identifier inside a type expression.
struct Ident<'t> {
    text: &'t str,
    start: usize,
    /// Followed by a selector dot: a package qualifier.
    qualifier: bool,
    /// Preceded by a selector dot: the name part of a qualified type.
    selected: bool,
}

fn idents(text: &str) -> Vec<Ident<'_>> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if !(c.is_alphabetic() || c == '_') {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some((i, n)) = chars.next_if(|&(_, n)| n.is_alphanumeric() || n == '_') {
            end = i + n.len_utf8();
        }

        let before = &text[..start];
        let after = &text[end..];
        out.push(Ident {
            text: &text[start..end],
            start,
            qualifier: after.starts_with('.') && !after.starts_with(".."),
            selected: before.ends_with('.') && !before.ends_with(".."),
        });
    }

    out
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Whether a zero `ret.Get(i)` must be guarded before the type assertion.
fn is_nillable(ty: &str) -> bool {
    ["*", "[]", "map[", "chan", "<-chan", "func", "interface"]
        .iter()
        .any(|prefix| ty.starts_with(prefix))
        || ty == "any"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Import, Param};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn method(name: &str, params: Vec<Param>, results: Vec<Param>) -> Method {
        Method {
            name: name.to_string(),
            params,
            results,
            variadic: false,
        }
    }

    fn interface(name: &str, methods: Vec<Method>) -> Interface {
        Interface {
            name: name.to_string(),
            package_name: "store".to_string(),
            package_path: "example.com/app/store".to_string(),
            file: PathBuf::from("store/store.go"),
            methods,
            imports: vec![Import {
                path: "context".to_string(),
                alias: None,
            }],
            local_types: BTreeSet::from(["Item".to_string(), "Store".to_string(), "entry".to_string()]),
            type_params: None,
            unresolved_embeds: Vec::new(),
            constraints: Vec::new(),
        }
    }

    fn render(iface: &Interface, pkg: &str, in_package: bool) -> Result<String, GenerateError> {
        let mut gen = Generator::new(iface, pkg, in_package);
        gen.generate_prologue_note("");
        gen.generate_prologue(pkg);
        gen.generate()?;
        Ok(gen.as_str().to_string())
    }

    #[test]
    fn test_full_output_for_simple_interface() {
        let iface = interface(
            "Store",
            vec![method(
                "Get",
                vec![Param::named("key", "string")],
                vec![Param::unnamed("string"), Param::unnamed("error")],
            )],
        );

        let out = render(&iface, "mocks", false).unwrap();
        let expected = "// Code generated by mockwalk. DO NOT EDIT.

package mocks

import mock \"github.com/stretchr/testify/mock\"

// Store is an autogenerated mock type for the Store type
type Store struct {
\tmock.Mock
}

// Get provides a mock function with given fields: key
func (_m *Store) Get(key string) (string, error) {
\tret := _m.Called(key)

\tvar r0 string
\tif rf, ok := ret.Get(0).(func(string) string); ok {
\t\tr0 = rf(key)
\t} else {
\t\tr0 = ret.Get(0).(string)
\t}

\tvar r1 error
\tif rf, ok := ret.Get(1).(func(string) error); ok {
\t\tr1 = rf(key)
\t} else {
\t\tr1 = ret.Error(1)
\t}

\treturn r0, r1
}
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_note_lines() {
        let iface = interface("Store", Vec::new());
        let mut gen = Generator::new(&iface, "mocks", false);
        gen.generate_prologue_note("first line\\nsecond line");

        assert_eq!(
            gen.as_str(),
            "// Code generated by mockwalk. DO NOT EDIT.\n\n// first line\n// second line\n\n"
        );
    }

    #[test]
    fn test_local_types_are_qualified_out_of_package() {
        let iface = interface(
            "Store",
            vec![method(
                "Find",
                vec![Param::named("ctx", "context.Context")],
                vec![Param::unnamed("[]*Item"), Param::unnamed("error")],
            )],
        );

        let out = render(&iface, "mocks", false).unwrap();
        assert!(out.contains("import context \"context\"\n"));
        assert!(out.contains("import store \"example.com/app/store\"\n"));
        assert!(out.contains("func (_m *Store) Find(ctx context.Context) ([]*store.Item, error) {"));
        assert!(out.contains("\t\tif ret.Get(0) != nil {\n\t\t\tr0 = ret.Get(0).([]*store.Item)\n\t\t}\n"));
    }

    #[test]
    fn test_in_package_keeps_local_names() {
        let iface = interface(
            "Store",
            vec![method("Put", vec![Param::named("item", "Item")], Vec::new())],
        );

        let out = render(&iface, "example.com/app/store", true).unwrap();
        assert!(out.contains("package store\n"));
        assert!(!out.contains("import store"));
        assert!(out.contains("// MockStore is an autogenerated mock type for the Store type\ntype MockStore struct {"));
        assert!(!out.contains("type Store struct"));
        assert!(out.contains("func (_m *MockStore) Put(item Item) {\n\t_m.Called(item)\n}\n"));
    }

    #[test]
    fn test_mock_name() {
        let exported = interface("Store", Vec::new());
        assert_eq!(Generator::new(&exported, "example.com/app/store", false).mock_name(), "Store");
        assert_eq!(Generator::new(&exported, "example.com/app/store", true).mock_name(), "MockStore");

        let unexported = interface("cache", Vec::new());
        assert_eq!(Generator::new(&unexported, "example.com/app/store", true).mock_name(), "mockCache");
    }

    #[test]
    fn test_variadic_and_unnamed_params() {
        let mut m = method(
            "Log",
            vec![Param::unnamed("string"), Param::named("args", "interface{}")],
            vec![Param::unnamed("int")],
        );
        m.variadic = true;
        let iface = interface("Logger", vec![m]);

        let out = render(&iface, "mocks", false).unwrap();
        assert!(out.contains("func (_m *Logger) Log(_a0 string, args ...interface{}) int {"));
        assert!(out.contains("\t_ca = append(_ca, _a0)\n\t_ca = append(_ca, _va...)\n\tret := _m.Called(_ca...)\n"));
        assert!(out.contains("ret.Get(0).(func(string, ...interface{}) int); ok {\n\t\tr0 = rf(_a0, args...)"));
    }

    #[test]
    fn test_methods_are_sorted() {
        let iface = interface(
            "Store",
            vec![
                method("Zap", Vec::new(), Vec::new()),
                method("Add", Vec::new(), Vec::new()),
            ],
        );

        let out = render(&iface, "mocks", false).unwrap();
        assert!(out.find("Add provides").unwrap() < out.find("Zap provides").unwrap());
    }

    #[test]
    fn test_unexported_local_type_is_rejected() {
        let iface = interface(
            "Store",
            vec![method("Raw", Vec::new(), vec![Param::unnamed("entry")])],
        );

        let err = render(&iface, "mocks", false).unwrap_err();
        assert!(matches!(err, GenerateError::UnsupportedType { ref method, .. } if method == "Raw"));
    }

    #[test]
    fn test_versioned_import_paths_resolve() {
        let mut iface = interface(
            "Store",
            vec![method("Client", Vec::new(), vec![Param::unnamed("*redis.Client")])],
        );
        iface.imports.push(Import {
            path: "github.com/redis/go-redis/v9".to_string(),
            alias: None,
        });

        let out = render(&iface, "mocks", false).unwrap();
        assert!(out.contains("import redis \"github.com/redis/go-redis/v9\"\n"));
        assert!(out.contains("func (_m *Store) Client() *redis.Client {"));
    }

    #[test]
    fn test_unknown_qualifier_is_rejected() {
        let iface = interface(
            "Store",
            vec![method("Handler", Vec::new(), vec![Param::unnamed("http.Handler")])],
        );

        let err = render(&iface, "mocks", false).unwrap_err();
        assert!(err.to_string().contains("package http is not imported"));
    }

    #[test]
    fn test_unmockable_interfaces() {
        let mut generic = interface("Repo", Vec::new());
        generic.type_params = Some("[T any]".to_string());
        assert!(matches!(
            render(&generic, "mocks", false),
            Err(GenerateError::TypeParameters { .. })
        ));

        let mut constraint = interface("Number", Vec::new());
        constraint.constraints = vec!["~int | ~float64".to_string()];
        assert!(matches!(
            render(&constraint, "mocks", false),
            Err(GenerateError::ConstraintInterface { .. })
        ));

        let mut embedding = interface("Body", Vec::new());
        embedding.unresolved_embeds = vec!["io.Reader".to_string()];
        assert!(matches!(
            render(&embedding, "mocks", false),
            Err(GenerateError::UnresolvedEmbed { .. })
        ));
    }

    #[test]
    fn test_idents() {
        let found: Vec<_> = idents("map[string]*http.Request")
            .into_iter()
            .map(|i| (i.text, i.qualifier, i.selected))
            .collect();
        assert_eq!(
            found,
            vec![
                ("map", false, false),
                ("string", false, false),
                ("http", true, false),
                ("Request", false, true),
            ]
        );

        let variadic: Vec<_> = idents("func(...Option)")
            .into_iter()
            .map(|i| (i.text, i.selected))
            .collect();
        assert_eq!(variadic, vec![("func", false), ("Option", false)]);
    }
}
