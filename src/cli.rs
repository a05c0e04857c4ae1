//! Command-line interface for mockwalk.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::generate::{
    Case, FileOutputStreamProvider, GeneratorVisitor, OutputStreamProvider, StdoutStreamProvider,
};
use crate::report;
use crate::walker::ListingVisitor;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Starter config written by `mockwalk init`.
const CONFIG_TEMPLATE: &str = include_str!("templates/mockwalk.yaml");

/// Generate testify mocks for Go interfaces.
///
/// Mockwalk searches a Go source tree for interface declarations, selects
/// them by name or pattern, and writes one mock per interface.
#[derive(Parser)]
#[command(name = "mockwalk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate mocks for matching interfaces
    #[command(visible_alias = "gen")]
    Generate(GenerateArgs),
    /// List matching interfaces without generating anything
    List(SelectArgs),
    /// Create a mockwalk config file from a template
    Init(InitArgs),
}

/// Report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Pretty,
    Json,
}

/// Which interfaces to select, shared by `generate` and `list`.
#[derive(Parser, Default)]
pub struct SelectArgs {
    /// Name or pattern of the interface(s) to select
    #[arg(long)]
    pub name: Option<String>,

    /// Select every interface found (implies --recursive)
    #[arg(long)]
    pub all: bool,

    /// Directory to search
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Search subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Space-separated build tags
    #[arg(long, value_delimiter = ' ')]
    pub tags: Vec<String>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the generate command.
#[derive(Parser, Default)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Directory to write mocks to
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Package name of the generated mocks
    #[arg(long)]
    pub outpkg: Option<String>,

    /// Generate mocks inside the interface's own package
    #[arg(long)]
    pub inpkg: bool,

    /// Write mocks to _test.go files
    #[arg(long)]
    pub testonly: bool,

    /// File name casing
    #[arg(long, value_enum)]
    pub case: Option<Case>,

    /// Comment added below the generated-code marker
    #[arg(long)]
    pub note: Option<String>,

    /// Print mocks to stdout instead of writing files
    #[arg(long)]
    pub print: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
    pub format: Format,

    /// Suppress the report and warnings
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = ".mockwalk.yaml")]
    pub output: PathBuf,
}

impl SelectArgs {
    /// Load the config file (explicit or discovered) and overlay these flags.
    pub fn resolve(&self) -> anyhow::Result<Config> {
        let path = match &self.config {
            Some(p) => Some(p.clone()),
            None => Config::discover(Path::new(".")),
        };

        let mut config = match path {
            Some(p) => Config::parse_file(&p)
                .map_err(|e| anyhow::anyhow!("parsing config {}: {}", p.display(), e))?,
            None => Config::default(),
        };

        if self.name.is_some() {
            config.name = self.name.clone();
            config.all = false;
        }
        if self.all {
            config.all = true;
            config.name = None;
        }
        if self.dir.is_some() {
            config.dir = self.dir.clone();
        }
        config.recursive |= self.recursive;
        if !self.tags.is_empty() {
            config.tags = self.tags.iter().filter(|t| !t.is_empty()).cloned().collect();
        }

        Ok(config)
    }
}

impl GenerateArgs {
    /// Resolved configuration for this invocation.
    pub fn resolve(&self) -> anyhow::Result<Config> {
        let mut config = self.select.resolve()?;

        if self.output.is_some() {
            config.output = self.output.clone();
        }
        if self.outpkg.is_some() {
            config.outpkg = self.outpkg.clone();
        }
        if self.case.is_some() {
            config.case = self.case;
        }
        if self.note.is_some() {
            config.note = self.note.clone();
        }
        config.inpkg |= self.inpkg;
        config.testonly |= self.testonly;
        config.print |= self.print;

        Ok(config)
    }
}

/// Build the visitor that generates mocks for `config`.
pub fn generator_visitor(config: &Config) -> GeneratorVisitor {
    let osp: Box<dyn OutputStreamProvider> = if config.print {
        Box::new(StdoutStreamProvider)
    } else {
        Box::new(FileOutputStreamProvider {
            base_dir: config.output(),
            in_package: config.inpkg,
            test_only: config.testonly,
            case: config.case.unwrap_or_default(),
        })
    };

    GeneratorVisitor {
        in_package: config.inpkg,
        note: config.note.clone().unwrap_or_default(),
        osp,
        package_name: config.outpkg.clone(),
    }
}

fn load_config(resolved: anyhow::Result<Config>) -> Result<Config, i32> {
    let config = match resolved {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(EXIT_ERROR);
        }
    };

    if let Err(e) = config::validate(&config) {
        eprintln!("Error: {}", e);
        return Err(EXIT_ERROR);
    }

    Ok(config)
}

/// Name given for a named search, if any.
fn searched_name(config: &Config) -> Option<&str> {
    config.name.as_deref().filter(|n| !n.is_empty())
}

/// Run the generate command.
pub fn run_generate(args: &GenerateArgs) -> anyhow::Result<i32> {
    let config = match load_config(args.resolve()) {
        Ok(c) => c,
        Err(code) => return Ok(code),
    };

    let walker = config.walker()?;
    let mut visitor = generator_visitor(&config);

    let result = match walker.walk(&mut visitor) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    if !args.quiet {
        // Mocks own stdout under --print.
        let mut out: Box<dyn Write> = if config.print {
            Box::new(io::stderr())
        } else {
            Box::new(io::stdout())
        };
        match args.format {
            Format::Json => report::write_json(&mut out, &walker.base_dir, &result)?,
            Format::Pretty => report::write_pretty(&mut out, &walker.base_dir, &result)?,
        }
    }

    if let Some(name) = searched_name(&config) {
        if !result.generated {
            eprintln!(
                "Error: unable to find '{}' in any go files under this path",
                name
            );
            return Ok(EXIT_FAILED);
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Run the list command.
pub fn run_list(args: &SelectArgs) -> anyhow::Result<i32> {
    let config = match load_config(args.resolve()) {
        Ok(c) => c,
        Err(code) => return Ok(code),
    };

    let walker = config.walker()?;
    let mut visitor = ListingVisitor::default();

    let result = match walker.walk(&mut visitor) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    report::write_listing(&mut io::stdout(), &walker.base_dir, &visitor.interfaces)?;

    if let Some(name) = searched_name(&config) {
        if !result.generated {
            eprintln!(
                "Error: unable to find '{}' in any go files under this path",
                name
            );
            return Ok(EXIT_FAILED);
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    // Check if output already exists
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    // Create output directory if needed
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, CONFIG_TEMPLATE) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to select your interfaces", args.output.display());
    println!("  2. Run: mockwalk generate --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_template_is_valid_config() {
        let config: Config = serde_yaml::from_str(CONFIG_TEMPLATE).unwrap();
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_cli_parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "mockwalk",
            "gen",
            "--name",
            "Store",
            "--dir",
            "pkg",
            "--case",
            "snake",
            "--tags",
            "integration linux",
            "--format",
            "json",
        ])
        .unwrap();

        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.select.name.as_deref(), Some("Store"));
        assert_eq!(args.select.tags, vec!["integration", "linux"]);
        assert_eq!(args.case, Some(Case::Snake));
        assert_eq!(args.format, Format::Json);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mockwalk.yaml");
        fs::write(
            &path,
            "all: true\noutput: ./fakes\noutpkg: fakes\ntags: [integration]\n",
        )
        .unwrap();

        let args = GenerateArgs {
            select: SelectArgs {
                name: Some("Store".to_string()),
                config: Some(path),
                ..Default::default()
            },
            outpkg: Some("stubs".to_string()),
            inpkg: true,
            ..Default::default()
        };
        let config = args.resolve().unwrap();

        assert_eq!(config.name.as_deref(), Some("Store"));
        assert!(!config.all);
        assert_eq!(config.output(), PathBuf::from("./fakes"));
        assert_eq!(config.outpkg.as_deref(), Some("stubs"));
        assert_eq!(config.tags, vec!["integration"]);
        assert!(config.inpkg);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let args = SelectArgs {
            all: true,
            config: Some(temp.path().join("absent.yaml")),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_generator_visitor_uses_config() {
        let config = Config {
            all: true,
            inpkg: true,
            note: Some("hand edits will be lost".to_string()),
            outpkg: Some("fakes".to_string()),
            ..Default::default()
        };
        let visitor = generator_visitor(&config);
        assert!(visitor.in_package);
        assert_eq!(visitor.note, "hand edits will be lost");
        assert_eq!(visitor.package_name.as_deref(), Some("fakes"));
    }

    #[test]
    fn test_init_writes_template_once() {
        let temp = TempDir::new().unwrap();
        let args = InitArgs {
            output: temp.path().join("conf/.mockwalk.yaml"),
        };

        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        assert_eq!(fs::read_to_string(&args.output).unwrap(), CONFIG_TEMPLATE);
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);
    }
}
