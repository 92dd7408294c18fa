//! The texbuild build engine.
//!
//! Compiling a LaTeX document is rarely a single run of the typesetter.
//! Cross references, tables of contents and bibliographies only settle after several runs,
//!     and figures, indices and bibliographies are produced by external tools.
//! This crate finds out what a document needs by scanning its source
//!     ([document]), records the build steps in a dependency [graph],
//!     and runs the typesetter until its output is stable ([document::controller]).
//!
//! The main entry point is [Session](session::Session).

pub mod convert;
pub mod digest;
pub mod document;
pub mod environment;
mod error;
pub mod files;
pub mod graph;
pub mod ini;
pub mod logparse;
pub mod modules;
pub mod nodes;
pub mod process;
pub mod report;
pub mod rules;
pub mod session;

pub use error::{Error, Result};
