//! Mock generation: the emitter, output sinks, and the visitor that ties
//! them to a walk.

mod generator;
mod output;
mod visitor;

use std::path::PathBuf;

use thiserror::Error;

pub use generator::Generator;
pub use output::{Case, FileOutputStreamProvider, OutputStreamProvider, Sink, StdoutStreamProvider};
pub use visitor::{GeneratorVisitor, DEFAULT_PACKAGE};

/// Import path of the mock runtime every generated file depends on.
pub const MOCK_IMPORT: &str = "github.com/stretchr/testify/mock";

/// Why a mock could not be generated for one interface.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("{name} embeds {embed}, whose methods live in another package")]
    UnresolvedEmbed { name: String, embed: String },
    #[error("{name}{params} is generic; generic interfaces are not supported")]
    TypeParameters { name: String, params: String },
    #[error("{name} is a constraint interface ({elements}) and cannot be mocked")]
    ConstraintInterface { name: String, elements: String },
    #[error("{name}.{method}: {reason}")]
    UnsupportedType {
        name: String,
        method: String,
        reason: String,
    },
}

/// Failure to acquire an output sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("creating directory {}: {}", .path.display(), .source)]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("creating file {}: {}", .path.display(), .source)]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
