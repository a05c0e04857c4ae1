//! Walk visitor that generates one mock per interface.

use std::io::Write;

use crate::analysis::Interface;
use crate::walker::{VisitOutcome, WalkError, WalkerVisitor};

use super::{Generator, OutputStreamProvider};

/// Package name used for mocks generated outside the source package.
pub const DEFAULT_PACKAGE: &str = "mocks";

/// Generates a mock for each visited interface through an output provider.
pub struct GeneratorVisitor {
    /// Generate into the interface's own package.
    pub in_package: bool,
    /// Free-form note emitted below the generated-code marker.
    pub note: String,
    pub osp: Box<dyn OutputStreamProvider>,
    /// Output package when `in_package` is false (defaults to `mocks`).
    pub package_name: Option<String>,
}

impl GeneratorVisitor {
    /// Package the mock for `iface` is generated into.
    pub fn target_package(&self, iface: &Interface) -> String {
        if self.in_package {
            return iface.package_path.clone();
        }
        self.package_name
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PACKAGE)
            .to_string()
    }
}

impl WalkerVisitor for GeneratorVisitor {
    fn visit_walk(&mut self, iface: &Interface) -> Result<VisitOutcome, WalkError> {
        let pkg = self.target_package(iface);

        let mut out = self
            .osp
            .writer(iface, &pkg)
            .map_err(|source| WalkError::Sink {
                name: iface.name.clone(),
                source,
            })?;

        let mut gen = Generator::new(iface, &pkg, self.in_package);
        gen.generate_prologue_note(&self.note);
        gen.generate_prologue(&pkg);

        if let Err(fault) = gen.generate() {
            return Ok(VisitOutcome::Skipped(fault));
        }

        gen.write(&mut out)
            .and_then(|()| out.flush())
            .map_err(|source| WalkError::Dispatch {
                name: iface.name.clone(),
                source,
            })?;

        Ok(VisitOutcome::Generated)
    }
}
