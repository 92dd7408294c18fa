//! A build session: one document, its environment and its graph.
//!
//! This is what the binaries drive.
//! Creating a session scans the document; building makes the final node of the graph,
//!     which is the typesetter run or the last post-processing step.
use std::path::{Path, PathBuf};

use crate::document::{with_document, Document};
use crate::environment::Environment;
use crate::graph::{self, BuildState, NodeId, Outcome};
use crate::logparse::{Message, Select};
use crate::{files, Error, Result};

/// How to set up a session.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Overrides the job name, which defaults to the source's name.
    pub jobname: Option<String>,
    /// Directives run before the source is scanned.
    pub prologue: Vec<String>,
    /// Directives run after the source is scanned.
    pub epilogue: Vec<String>,
    /// Compile only these files among those the document includes.
    pub include_only: Option<Vec<String>>,
}

/// Why the last build failed.
pub struct Failure<'a> {
    /// The product of the step that failed.
    pub node: String,
    pub error: Option<&'a Error>,
    /// Diagnostics of the failed step, like the errors in a log.
    pub messages: Vec<Message>,
}

impl<'a> Failure<'a> {
    pub fn interrupted(&self) -> bool {
        matches!(self.error, Some(Error::Interrupted))
    }
}

pub struct Session {
    env: Environment,
    main: NodeId,
}

/// Finds the source named on the command line, trying the `.tex` suffix.
pub fn find_source(name: &str) -> Result<PathBuf> {
    [name.to_string(), format!("{name}.tex")]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .ok_or_else(|| Error::MissingSource(files::absolute(Path::new(name))))
}

impl Session {
    pub fn new(source: &Path, options: &Options) -> Result<Session> {
        let mut env = Environment::new();
        let mut doc = Document::new(source, options.jobname.as_deref(), &mut env)?;
        if let Some(names) = &options.include_only {
            doc.state_mut().force_include_only(names.clone());
        }
        for line in &options.prologue {
            doc.run_directive(&mut env, line)?;
        }
        doc.parse(&mut env)?;
        for line in &options.epilogue {
            doc.run_directive(&mut env, line)?;
        }
        let main = doc.finalize(&mut env)?;
        Ok(Session { env, main })
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// The typesetter node.
    pub fn main(&self) -> NodeId {
        self.main
    }

    fn final_node(&self) -> NodeId {
        self.env.final_node().unwrap_or(self.main)
    }

    /// The file the build produces.
    pub fn final_product(&self) -> Option<PathBuf> {
        self.env.final_product()
    }

    /// Builds the final product.
    ///
    /// Forcing a build runs the typesetter at least once; post-processing steps still run
    ///     only if their input changed.
    pub fn build(&mut self, force: bool) -> Outcome {
        let target = self.final_node();
        if !force {
            return graph::make(&mut self.env, target, false);
        }
        let outcome = graph::make(&mut self.env, self.main, true);
        if outcome == Outcome::Error || target == self.main {
            return outcome;
        }
        graph::make(&mut self.env, target, false)
    }

    /// Removes everything the build produces.
    pub fn clean(&mut self) {
        let target = self.final_node();
        graph::clean(&mut self.env, target);
    }

    /// The cause of the last build's failure, if it failed.
    pub fn failure(&self) -> Option<Failure<'_>> {
        let graph = self.env.graph();
        let target = self.final_node();
        let culprit = graph.failure_source(target);
        let node = graph.node(culprit);
        if node.failure().is_none() && node.failed_dep().is_none() {
            return None;
        }
        Some(Failure {
            node: node.describe(),
            error: node.failure(),
            messages: graph.messages(culprit),
        })
    }

    /// The input files of the build.
    pub fn deps(&self) -> Vec<PathBuf> {
        self.env.graph().leaves(self.final_node())
    }

    /// The build steps as products and sources, each step after those it depends on.
    pub fn rules(&self) -> Vec<(Vec<PathBuf>, Vec<PathBuf>)> {
        let graph = self.env.graph();
        graph
            .post_order(self.final_node())
            .into_iter()
            .map(|id| {
                let node = graph.node(id);
                (node.products().to_vec(), node.sources().to_vec())
            })
            .collect()
    }

    /// Diagnostics from the typesetter's log.
    pub fn messages(&mut self, select: Select) -> Result<Vec<Message>> {
        let main = self.main;
        with_document(&mut self.env, main, |doc, _| doc.log_messages(select))
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Number of typesetter runs in the last build.
    pub fn passes(&mut self) -> usize {
        let main = self.main;
        with_document(&mut self.env, main, |doc, _| doc.state().passes()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(prologue: &[&str], epilogue: &[&str], jobname: &Path) -> Options {
        Options {
            jobname: Some(jobname.display().to_string()),
            prologue: prologue.iter().map(|s| s.to_string()).collect(),
            epilogue: epilogue.iter().map(|s| s.to_string()).collect(),
            include_only: None,
        }
    }

    #[test]
    fn source_without_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "").unwrap();
        let name = dir.path().join("doc").display().to_string();
        assert_eq!(find_source(&name).unwrap(), source);
        assert_eq!(find_source(&source.display().to_string()).unwrap(), source);
        assert!(matches!(
            find_source(&dir.path().join("missing").display().to_string()),
            Err(Error::MissingSource(_))
        ));
    }

    #[test]
    fn missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = Session::new(&dir.path().join("doc.tex"), &Options::default());
        assert!(matches!(result, Err(Error::MissingSource(_))));
    }

    #[test]
    fn dependencies_and_post_processing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        let chapter = dir.path().join("chapter.tex");
        std::fs::write(
            &source,
            format!("\\documentclass{{article}}\n\\input{{{}}}\n", chapter.display()),
        )
        .unwrap();
        std::fs::write(&chapter, "Text.\n").unwrap();
        let jobname = dir.path().join("doc");
        let session = Session::new(
            &source,
            &options(&[], &["module dvips", "module gzip"], &jobname),
        )
        .unwrap();
        assert_eq!(session.deps(), vec![source.clone(), chapter.clone()]);
        assert_eq!(
            session.final_product(),
            Some(dir.path().join("doc.ps.gz"))
        );
        let rules = session.rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].0, vec![dir.path().join("doc.dvi")]);
        assert_eq!(rules[1].0, vec![dir.path().join("doc.ps")]);
        assert_eq!(rules[2].1, vec![dir.path().join("doc.ps")]);
    }

    #[test]
    fn prologue_selects_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "\\documentclass{article}\n").unwrap();
        let jobname = dir.path().join("doc");
        let session = Session::new(&source, &options(&["module pdftex"], &[], &jobname)).unwrap();
        assert_eq!(session.environment().vars.get_str("program"), "pdflatex");
        assert_eq!(session.final_product(), Some(dir.path().join("doc.pdf")));
    }

    #[test]
    fn post_processor_needs_matching_input() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "\\documentclass{article}\n").unwrap();
        let jobname = dir.path().join("doc");
        let result = Session::new(
            &source,
            &options(&["module pdftex"], &["module dvips"], &jobname),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn missing_dependency_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "\\documentclass{article}\n").unwrap();
        let data = dir.path().join("data.csv");
        std::fs::write(&data, "1,2\n").unwrap();
        let jobname = dir.path().join("doc");
        let mut session = Session::new(
            &source,
            &options(&[&format!("depend {}", data.display())], &[], &jobname),
        )
        .unwrap();
        std::fs::remove_file(&data).unwrap();
        assert_eq!(session.build(false), Outcome::Error);
        let failure = session.failure().unwrap();
        assert!(matches!(failure.error, Some(Error::MissingSource(_))));
        assert!(!failure.interrupted());
    }

    #[test]
    fn include_only() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        let one = dir.path().join("one.tex");
        let two = dir.path().join("two.tex");
        std::fs::write(
            &source,
            format!(
                "\\include{{{}}}\n\\include{{{}}}\n",
                dir.path().join("one").display(),
                dir.path().join("two").display()
            ),
        )
        .unwrap();
        std::fs::write(&one, "").unwrap();
        std::fs::write(&two, "").unwrap();
        let options = Options {
            include_only: Some(vec![dir.path().join("two").display().to_string()]),
            ..options(&[], &[], &dir.path().join("doc"))
        };
        let session = Session::new(&source, &options).unwrap();
        assert_eq!(session.deps(), vec![source, two]);
    }
}
