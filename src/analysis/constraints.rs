//! Go build constraint evaluation.
//!
//! Decides whether a file takes part in an analysis pass, from its
//! `//go:build` line (or legacy `// +build` lines) and its file name
//! suffix, against the host platform plus the configured build tags.

use std::collections::HashSet;

use thiserror::Error;

/// Every GOOS value the Go toolchain recognizes in file names.
const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

/// Every GOARCH value the Go toolchain recognizes in file names.
const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

/// GOOS values that satisfy the `unix` tag.
const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// Malformed `//go:build` expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid build constraint {expr:?}: {message}")]
pub struct ConstraintError {
    pub expr: String,
    pub message: String,
}

/// Parsed `//go:build` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse a `//go:build` expression body.
    pub fn parse(expr: &str) -> Result<Self, ConstraintError> {
        let tokens = tokenize(expr)?;
        let mut parser = ExprParser {
            expr,
            tokens: &tokens,
            pos: 0,
            depth: 0,
        };
        let parsed = parser.or()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("unexpected token after expression"));
        }
        Ok(parsed)
    }

    /// Evaluate against a build context.
    pub fn eval(&self, ctx: &BuildContext) -> bool {
        match self {
            Expr::Tag(tag) => ctx.satisfies(tag),
            Expr::Not(inner) => !inner.eval(ctx),
            Expr::And(a, b) => a.eval(ctx) && b.eval(ctx),
            Expr::Or(a, b) => a.eval(ctx) || b.eval(ctx),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Ident(String),
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ConstraintError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            ' ' | '\t' => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '!' => tokens.push(Token::Not),
            '&' | '|' => {
                if chars.next_if(|&(_, n)| n == c).is_none() {
                    return Err(ConstraintError {
                        expr: expr.to_string(),
                        message: format!("expected {}{} at offset {}", c, c, i),
                    });
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut ident = String::from(c);
                while let Some((_, n)) = chars.next_if(|&(_, n)| n.is_alphanumeric() || n == '_' || n == '.') {
                    ident.push(n);
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ConstraintError {
                    expr: expr.to_string(),
                    message: format!("unexpected character {:?}", other),
                });
            }
        }
    }

    Ok(tokens)
}

struct ExprParser<'a> {
    expr: &'a str,
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

/// Deepest parenthesis nesting accepted in one expression.
const MAX_NESTING: usize = 100;

impl ExprParser<'_> {
    fn error(&self, message: &str) -> ConstraintError {
        ConstraintError {
            expr: self.expr.to_string(),
            message: message.to_string(),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expr, ConstraintError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ConstraintError> {
        let mut left = self.not()?;
        while self.eat(&Token::And) {
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ConstraintError> {
        let mut negations = 0;
        while self.eat(&Token::Not) {
            negations += 1;
        }
        let atom = self.atom()?;
        if negations % 2 == 1 {
            return Ok(Expr::Not(Box::new(atom)));
        }
        Ok(atom)
    }

    fn atom(&mut self) -> Result<Expr, ConstraintError> {
        match self.tokens.get(self.pos) {
            Some(Token::LParen) => {
                if self.depth == MAX_NESTING {
                    return Err(self.error("expression nested too deeply"));
                }
                self.pos += 1;
                self.depth += 1;
                let inner = self.or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(self.error("missing closing parenthesis"));
                }
                Ok(inner)
            }
            Some(Token::Ident(tag)) => {
                self.pos += 1;
                Ok(Expr::Tag(tag.clone()))
            }
            Some(_) => Err(self.error("unexpected operator")),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

/// The platform and tag set a pass is evaluated against.
#[derive(Debug, Clone)]
pub struct BuildContext {
    goos: String,
    goarch: String,
    tags: HashSet<String>,
}

impl BuildContext {
    /// Context for the host platform plus the given tags.
    pub fn host(tags: &[String]) -> Self {
        Self::new(host_goos(), host_goarch(), tags)
    }

    /// Context for an explicit target platform.
    pub fn new(goos: &str, goarch: &str, tags: &[String]) -> Self {
        Self {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
            tags: tags.iter().cloned().collect(),
        }
    }

    pub fn goos(&self) -> &str {
        &self.goos
    }

    pub fn goarch(&self) -> &str {
        &self.goarch
    }

    /// Whether a single build tag holds.
    ///
    /// Release tags (`go1.N`) are always satisfied since the target
    /// toolchain version is unknown.
    pub fn satisfies(&self, tag: &str) -> bool {
        if self.tags.contains(tag) || tag == "gc" || tag.starts_with("go1.") {
            return true;
        }
        if tag == self.goos || tag == self.goarch {
            return true;
        }
        if tag == "unix" {
            return UNIX_OS.contains(&self.goos.as_str());
        }
        // Implied GOOS relationships from the go tool.
        matches!(
            (tag, self.goos.as_str()),
            ("linux", "android") | ("solaris", "illumos") | ("darwin", "ios")
        )
    }

    /// Whether a `// +build` line holds: space-separated alternatives of
    /// comma-separated conjunctions.
    pub fn satisfies_plus_build(&self, line: &str) -> bool {
        line.split_whitespace().any(|alternative| {
            alternative.split(',').all(|term| match term.strip_prefix('!') {
                Some(negated) => !self.satisfies(negated),
                None => self.satisfies(term),
            })
        })
    }

    /// Whether a file name's `_GOOS`, `_GOARCH` or `_GOOS_GOARCH` suffix
    /// matches this context. Names without a known suffix always match.
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let stem = file_name.strip_suffix(".go").unwrap_or(file_name);
        let Some(idx) = stem.find('_') else {
            return true;
        };

        let mut parts: Vec<&str> = stem[idx + 1..].split('_').collect();
        if parts.last() == Some(&"test") {
            parts.pop();
        }

        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.satisfies(parts[n - 2]) && parts[n - 1] == self.goarch;
        }
        if n >= 1 {
            let last = parts[n - 1];
            if KNOWN_OS.contains(&last) {
                return self.satisfies(last);
            }
            if KNOWN_ARCH.contains(&last) {
                return last == self.goarch;
            }
        }
        true
    }
}

fn host_goos() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_goarch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "wasm32" => "wasm",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux(tags: &[&str]) -> BuildContext {
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        BuildContext::new("linux", "amd64", &tags)
    }

    #[test]
    fn test_long_negation_runs_fold() {
        let ctx = linux(&[]);
        let even = format!("{}linux", "!".repeat(10_000));
        assert_eq!(Expr::parse(&even).unwrap(), Expr::Tag("linux".into()));
        assert!(Expr::parse(&even).unwrap().eval(&ctx));

        let odd = format!("{}linux", "!".repeat(10_001));
        assert!(!Expr::parse(&odd).unwrap().eval(&ctx));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let shallow = format!("{}linux{}", "(".repeat(50), ")".repeat(50));
        assert!(Expr::parse(&shallow).is_ok());

        let deep = format!("{}linux{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = Expr::parse(&deep).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = Expr::parse("a || b && !c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::Tag("a".into())),
                Box::new(Expr::And(
                    Box::new(Expr::Tag("b".into())),
                    Box::new(Expr::Not(Box::new(Expr::Tag("c".into())))),
                )),
            )
        );
    }

    #[test]
    fn test_eval_expressions() {
        let ctx = linux(&["integration"]);
        assert!(Expr::parse("linux").unwrap().eval(&ctx));
        assert!(Expr::parse("linux && amd64").unwrap().eval(&ctx));
        assert!(!Expr::parse("windows || darwin").unwrap().eval(&ctx));
        assert!(Expr::parse("(windows || linux) && integration").unwrap().eval(&ctx));
        assert!(!Expr::parse("!integration").unwrap().eval(&ctx));
        assert!(Expr::parse("unix && go1.18").unwrap().eval(&ctx));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("linux &").is_err());
        assert!(Expr::parse("(linux").is_err());
        assert!(Expr::parse("linux darwin").is_err());
        assert!(Expr::parse("linux && $").is_err());
    }

    #[test]
    fn test_plus_build_lines() {
        let ctx = linux(&[]);
        assert!(ctx.satisfies_plus_build("linux darwin"));
        assert!(ctx.satisfies_plus_build("linux,amd64"));
        assert!(!ctx.satisfies_plus_build("linux,!amd64"));
        assert!(!ctx.satisfies_plus_build("ignore"));
    }

    #[test]
    fn test_file_name_suffixes() {
        let ctx = linux(&[]);
        assert!(ctx.matches_file_name("service.go"));
        assert!(ctx.matches_file_name("linux.go"));
        assert!(ctx.matches_file_name("service_linux.go"));
        assert!(ctx.matches_file_name("service_linux_amd64.go"));
        assert!(ctx.matches_file_name("service_amd64.go"));
        assert!(!ctx.matches_file_name("service_windows.go"));
        assert!(!ctx.matches_file_name("service_linux_arm64.go"));
        assert!(!ctx.matches_file_name("service_darwin_test.go"));
        assert!(ctx.matches_file_name("my_service.go"));
    }

    #[test]
    fn test_implied_os() {
        let android = BuildContext::new("android", "arm64", &[]);
        assert!(android.satisfies("linux"));
        assert!(android.satisfies("unix"));
        let windows = BuildContext::new("windows", "amd64", &[]);
        assert!(!windows.satisfies("unix"));
    }
}
