//! Configuration file schema for mockwalk.
//!
//! Every key mirrors a `generate` flag; flags given on the command line
//! take precedence over the file.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::generate::Case;
use crate::walker::Walker;

/// Config file names searched for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &[".mockwalk.yaml", "mockwalk.yaml"];

/// Characters that make `name` a pattern rather than a literal name.
const REGEX_META_CHARS: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Interface name, or a regular expression when it contains
    /// metacharacters.
    #[serde(default)]
    pub name: Option<String>,
    /// Generate mocks for every interface found.
    #[serde(default)]
    pub all: bool,
    /// Directory to search (default: ".").
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub recursive: bool,
    /// Output directory when not generating in-package (default: "./mocks").
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Package name for generated mocks (default: "mocks").
    #[serde(default)]
    pub outpkg: Option<String>,
    #[serde(default)]
    pub inpkg: bool,
    #[serde(default)]
    pub testonly: bool,
    #[serde(default)]
    pub case: Option<Case>,
    #[serde(default)]
    pub note: Option<String>,
    /// Build tags considered when selecting files.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Write mocks to stdout instead of files.
    #[serde(default)]
    pub print: bool,
}

/// How interfaces are selected for a walk.
#[derive(Debug, Clone)]
pub struct Selection {
    pub filter: Regex,
    pub limit_one: bool,
    pub recursive: bool,
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Find a config file in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Returns the search directory (defaults to ".").
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns the output directory (defaults to "./mocks").
    pub fn output(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| PathBuf::from("./mocks"))
    }

    /// Resolve `name`/`all` into a filter.
    ///
    /// A literal name matches exactly and stops after the first mock; a
    /// pattern matches every interface it selects. `all` always recurses.
    pub fn selection(&self) -> anyhow::Result<Selection> {
        match (self.name.as_deref().filter(|n| !n.is_empty()), self.all) {
            (Some(_), true) => anyhow::bail!("specify name or all, but not both"),
            (Some(name), false) if name.contains(REGEX_META_CHARS) => Ok(Selection {
                filter: Regex::new(name)
                    .map_err(|e| anyhow::anyhow!("invalid name pattern {:?}: {}", name, e))?,
                limit_one: false,
                recursive: self.recursive,
            }),
            (Some(name), false) => Ok(Selection {
                filter: Regex::new(&format!("^{}$", name))?,
                limit_one: true,
                recursive: self.recursive,
            }),
            (None, true) => Ok(Selection {
                filter: Regex::new(".*")?,
                limit_one: false,
                recursive: true,
            }),
            (None, false) => anyhow::bail!(
                "use name to specify the name of the interface or all for all interfaces found"
            ),
        }
    }

    /// Build the walker for this configuration.
    pub fn walker(&self) -> anyhow::Result<Walker> {
        let selection = self.selection()?;
        Ok(Walker {
            base_dir: self.dir(),
            recursive: selection.recursive,
            filter: selection.filter,
            limit_one: selection.limit_one,
            build_tags: self.tags.clone(),
        })
    }
}

/// Validate a config beyond what deserialization checks.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    config.selection()?;

    if let Some(outpkg) = &config.outpkg {
        let valid = outpkg
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && outpkg.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid {
            anyhow::bail!("invalid outpkg {:?}: must be a Go identifier", outpkg);
        }
    }

    Ok(())
}
