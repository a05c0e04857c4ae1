//! Output sinks for generated mocks.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::Interface;

use super::SinkError;

lazy_static::lazy_static! {
    static ref CAMEL_WORD: regex::Regex = regex::Regex::new(r"(.)([A-Z][a-z]+)").unwrap();
    static ref CAMEL_BOUNDARY: regex::Regex = regex::Regex::new(r"([a-z0-9])([A-Z])").unwrap();
}

/// File name casing for generated mocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Case {
    /// `ReadWriter.go`
    #[default]
    Camel,
    /// `read_writer.go`
    Snake,
    /// Same as `snake`.
    Underscore,
}

impl Case {
    /// Apply this casing to an interface name.
    pub fn apply(&self, name: &str) -> String {
        match self {
            Case::Camel => name.to_string(),
            Case::Snake | Case::Underscore => {
                let s = CAMEL_WORD.replace_all(name, "${1}_${2}");
                CAMEL_BOUNDARY.replace_all(&s, "${1}_${2}").to_lowercase()
            }
        }
    }
}

/// A writable destination for one mock.
///
/// The sink is released exactly once, when it is dropped: the writer is
/// flushed and closed, then the provider's release hook runs.
pub struct Sink {
    writer: Option<Box<dyn Write>>,
    release: Option<Box<dyn FnOnce()>>,
}

impl Sink {
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self {
            writer: Some(writer),
            release: None,
        }
    }

    /// Run `release` after the writer is closed.
    pub fn on_release(mut self, release: impl FnOnce() + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    fn writer(&mut self) -> io::Result<&mut Box<dyn Write>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink already released"))
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Decides where the mock for an interface is written.
pub trait OutputStreamProvider {
    fn writer(&self, iface: &Interface, pkg: &str) -> Result<Sink, SinkError>;
}

/// Writes every mock to standard output.
#[derive(Debug, Default)]
pub struct StdoutStreamProvider;

impl OutputStreamProvider for StdoutStreamProvider {
    fn writer(&self, _iface: &Interface, _pkg: &str) -> Result<Sink, SinkError> {
        Ok(Sink::new(Box::new(io::stdout())))
    }
}

/// Writes each mock to its own file.
#[derive(Debug, Clone)]
pub struct FileOutputStreamProvider {
    /// Output directory when mocks live in a separate package.
    pub base_dir: PathBuf,
    /// Place `mock_<name>.go` next to the interface's source file.
    pub in_package: bool,
    /// Use a `_test.go` suffix so the mock only builds with tests.
    pub test_only: bool,
    pub case: Case,
}

impl FileOutputStreamProvider {
    fn filename(&self, name: &str) -> String {
        let name = self.case.apply(name);
        match (self.in_package, self.test_only) {
            (true, true) => format!("mock_{}_test.go", name),
            (true, false) => format!("mock_{}.go", name),
            (false, true) => format!("{}_test.go", name),
            (false, false) => format!("{}.go", name),
        }
    }

    /// Destination path for an interface's mock.
    pub fn path_for(&self, iface: &Interface) -> PathBuf {
        let file = self.filename(&iface.name);
        if self.in_package {
            iface
                .file
                .parent()
                .unwrap_or(Path::new("."))
                .join(file)
        } else {
            self.base_dir.join(file)
        }
    }
}

impl OutputStreamProvider for FileOutputStreamProvider {
    fn writer(&self, iface: &Interface, _pkg: &str) -> Result<Sink, SinkError> {
        let path = self.path_for(iface);

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| SinkError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let file = File::create(&path).map_err(|source| SinkError::CreateFile {
            path: path.clone(),
            source,
        })?;
        debug!("writing mock for {} to {}", iface.name, path.display());

        Ok(Sink::new(Box::new(BufWriter::new(file))).on_release(move || remove_if_empty(&path)))
    }
}

/// An empty mock file would break the package build, so a sink released
/// without any output removes its file.
fn remove_if_empty(path: &Path) {
    let empty = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false);
    if empty {
        debug!("removing empty mock file {}", path.display());
        let _ = fs::remove_file(path);
    }
}
