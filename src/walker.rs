//! Source tree traversal and per-interface dispatch.
//!
//! A walk runs in three phases over a single [`PackageLoader`]:
//! every eligible file under the base directory is ingested, the loader
//! resolves the package set once, then each resolved interface whose name
//! matches the filter is handed to a [`WalkerVisitor`].

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::analysis::{Interface, PackageLoader, ParseError, ResolveError};
use crate::generate::{GenerateError, SinkError};

/// Fatal conditions that abort a walk.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("error walking: {0}")]
    Resolve(#[from] ResolveError),
    #[error("unable to get writer for {name}: {source}")]
    Sink {
        name: String,
        #[source]
        source: SinkError,
    },
    #[error("error walking {name}: {source}")]
    Dispatch {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// What a visitor did with one interface.
#[derive(Debug)]
pub enum VisitOutcome {
    Generated,
    /// Generation failed for this interface only; the walk continues.
    Skipped(GenerateError),
}

/// Receives each resolved interface that passes the filter.
pub trait WalkerVisitor {
    fn visit_walk(&mut self, iface: &Interface) -> Result<VisitOutcome, WalkError>;
}

/// Summary of a completed walk.
#[derive(Debug, Default)]
pub struct WalkReport {
    /// True iff at least one interface was generated.
    pub generated: bool,
    pub files_parsed: usize,
    /// Files skipped because their build constraints do not hold.
    pub files_excluded: usize,
    pub interfaces_found: usize,
    /// Names of generated interfaces, in dispatch order.
    pub dispatched: Vec<String>,
    /// Interfaces whose generation failed.
    pub faults: Vec<(String, GenerateError)>,
    /// Files that could not be ingested.
    pub parse_faults: Vec<(PathBuf, ParseError)>,
}

/// Traversal configuration for one or more walks.
#[derive(Debug, Clone)]
pub struct Walker {
    pub base_dir: PathBuf,
    pub recursive: bool,
    pub filter: Regex,
    /// Stop after the first successfully generated interface.
    pub limit_one: bool,
    pub build_tags: Vec<String>,
}

impl Walker {
    /// Walk the tree and dispatch matching interfaces to `visitor`.
    pub fn walk(&self, visitor: &mut dyn WalkerVisitor) -> Result<WalkReport, WalkError> {
        let mut report = WalkReport::default();
        let mut loader = PackageLoader::new(&self.build_tags).base_dir(&self.base_dir);

        self.do_walk(&mut loader, &mut report);
        report.files_parsed = loader.file_count();
        report.files_excluded = loader.excluded().len();

        let interfaces = loader.load()?;
        report.interfaces_found = interfaces.len();
        debug!("found {} interfaces", interfaces.len());

        for iface in &interfaces {
            debug!("found interface {}", iface);

            if !self.filter.is_match(&iface.name) {
                continue;
            }

            match visitor.visit_walk(iface)? {
                VisitOutcome::Generated => {
                    debug!("generated for interface {}", iface);
                    report.generated = true;
                    report.dispatched.push(iface.name.clone());
                    if self.limit_one {
                        break;
                    }
                }
                VisitOutcome::Skipped(fault) => {
                    warn!("unable to generate mock for '{}': {}", iface.name, fault);
                    report.faults.push((iface.name.clone(), fault));
                }
            }
        }

        Ok(report)
    }

    /// Feed every eligible file under the base directory to the loader.
    ///
    /// Unreadable directories contribute no files.
    fn do_walk(&self, loader: &mut PackageLoader, report: &mut WalkReport) {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let entries = WalkDir::new(&self.base_dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                debug!("walk dir {}", entry.path().display());
                continue;
            }

            debug!("found file {}", entry.path().display());
            if !is_source_file(entry.file_name()) {
                continue;
            }

            debug!("parse file {}", entry.path().display());
            if let Err(err) = loader.parse(entry.path()) {
                warn!("error parsing file: {}", err);
                report.parse_faults.push((entry.path().to_path_buf(), err));
            }
        }
    }
}

/// Hidden (`.`) and private (`_`) entries are skipped with their subtrees.
fn is_hidden(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name.starts_with('_')
}

/// Go sources, excluding tests.
fn is_source_file(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.ends_with(".go") && !name.ends_with("_test.go")
}

/// Collects matched interfaces without generating anything.
#[derive(Debug, Default)]
pub struct ListingVisitor {
    pub interfaces: Vec<Interface>,
}

impl WalkerVisitor for ListingVisitor {
    fn visit_walk(&mut self, iface: &Interface) -> Result<VisitOutcome, WalkError> {
        self.interfaces.push(iface.clone());
        Ok(VisitOutcome::Generated)
    }
}

/// Path of `path` relative to `base`, for display.
pub fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
