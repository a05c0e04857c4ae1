//! Mockwalk - testify mock generation for Go interfaces.
//!
//! Mockwalk searches a Go source tree for interface declarations and hands
//! each one whose name matches a filter to a visitor, which by default
//! writes a mock implementation through an output provider.
//!
//! # Architecture
//!
//! - `analysis`: tree-sitter based Go parsing and package resolution
//! - `walker`: directory traversal, filtering, and per-interface dispatch
//! - `generate`: the mock emitter, output sinks, and generating visitor
//! - `config`: YAML config schema and interface selection
//! - `report`: Output formatting (text, JSON)

pub mod analysis;
pub mod cli;
pub mod config;
pub mod generate;
pub mod report;
pub mod walker;

pub use analysis::{GoAnalyzer, Interface, PackageLoader, ParseError, ResolveError};
pub use config::Config;
pub use generate::{
    Case, FileOutputStreamProvider, GenerateError, Generator, GeneratorVisitor,
    OutputStreamProvider, Sink, SinkError, StdoutStreamProvider,
};
pub use walker::{ListingVisitor, VisitOutcome, WalkError, WalkReport, Walker, WalkerVisitor};
