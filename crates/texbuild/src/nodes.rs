//! Build actions that run a single external program.
use std::any::Any;
use std::path::PathBuf;

use crate::graph::{Action, BuildState, NodeId, NodeKind};
use crate::process::{self, Invocation, Output};
use crate::{files, Result};

/// Runs a command line to produce the node's products.
pub struct Shell {
    invocation: Invocation,
    message: String,
    kind: NodeKind,
}

impl Shell {
    pub fn new(invocation: Invocation, message: String) -> Shell {
        Shell {
            invocation,
            message,
            kind: NodeKind::Shell,
        }
    }

    /// A shell node created by a conversion rule.
    pub fn converter(invocation: Invocation, message: String) -> Shell {
        Shell {
            invocation,
            message,
            kind: NodeKind::Converter,
        }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }
}

impl<S: BuildState> Action<S> for Shell {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn run(&mut self, state: &mut S, node: NodeId) -> Result<()> {
        tracing::info!("{}", self.message);
        process::run_checked(&self.invocation)?;
        for product in state.graph().node(node).products() {
            if !product.exists() {
                tracing::warn!(
                    "`{}` did not produce {}",
                    self.invocation.program(),
                    files::display(product)
                );
            }
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Compression program for [Compressed].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
}

impl Compression {
    pub fn program(&self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
        }
    }
}

/// Writes a compressed copy of a file.
pub struct Compressed {
    compression: Compression,
    source: PathBuf,
    target: PathBuf,
}

impl Compressed {
    pub fn new(compression: Compression, source: PathBuf, target: PathBuf) -> Compressed {
        Compressed {
            compression,
            source,
            target,
        }
    }
}

impl<S: BuildState> Action<S> for Compressed {
    fn kind(&self) -> NodeKind {
        NodeKind::Compressed
    }

    fn run(&mut self, _: &mut S, _: NodeId) -> Result<()> {
        tracing::info!(
            "compressing {} into {}",
            files::display(&self.source),
            files::display(&self.target)
        );
        let invocation = Invocation::new([
            self.compression.program().to_string(),
            "-c".to_string(),
            self.source.display().to_string(),
        ])
        .stdout(Output::File(self.target.clone()));
        let result = process::run_checked(&invocation);
        if result.is_err() {
            files::remove(&self.target);
        }
        result.map(|_| ())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
