//! Bibliographies processed by BibTeX.
//!
//! BibTeX reads the citations and database names that the typesetter writes in the
//!     auxiliary file and produces a `.bbl` file, which the next typesetter run reads.
//! It is run before the first compilation if its output is out of date,
//!     and after a compilation when the citations or databases changed
//!     or the log reports undefined citations.
use std::path::PathBuf;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Module, Options};
use crate::document::{Handler, HookCall, JobState};
use crate::environment::Environment;
use crate::logparse::{Kind, Message};
use crate::process::{self, Invocation};
use crate::{files, Error, Result};

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\citation\{(?P<cites>.*)\}").unwrap());
static BIBDATA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\bibdata\{(?P<data>.*)\}").unwrap());
static UNDEFINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:LaTeX|Package natbib) Warning: Citation [`'](?P<cite>[^']*)' .*undefined").unwrap()
});
static BLG_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"---(?:line (?P<line>[0-9]+) of|while reading) file (?P<file>.*)").unwrap()
});

/// One bibliography: an auxiliary file and the `.bbl` file BibTeX makes from it.
pub struct Bibliography {
    base: String,
    bbl: PathBuf,
    blg: PathBuf,
    /// The auxiliary files to read; all those of the document if [None].
    aux: Option<PathBuf>,
    tool: String,
    bib_path: Vec<PathBuf>,
    bst_path: Vec<PathBuf>,
    databases: IndexMap<String, Option<PathBuf>>,
    style: Option<(String, Option<PathBuf>)>,
    crossrefs: Option<String>,
    sorted: bool,
    used_cites: Vec<String>,
    previous_databases: Option<Vec<String>>,
    undefined: Vec<String>,
    run_needed: bool,
}

impl Bibliography {
    pub fn new(base: &str, aux: Option<PathBuf>) -> Bibliography {
        Bibliography {
            base: base.to_string(),
            bbl: PathBuf::from(format!("{base}.bbl")),
            blg: PathBuf::from(format!("{base}.blg")),
            aux,
            tool: "bibtex".to_string(),
            bib_path: Vec::new(),
            bst_path: Vec::new(),
            databases: IndexMap::new(),
            style: None,
            crossrefs: None,
            sorted: true,
            used_cites: Vec::new(),
            previous_databases: None,
            undefined: Vec::new(),
            run_needed: false,
        }
    }

    fn find(&self, env: &Environment, name: &str, suffix: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
        let file = if name.ends_with(suffix) {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        };
        dirs.iter()
            .map(|dir| dir.join(&file))
            .find(|path| path.is_file())
            .or_else(|| env.find_file(&file, &[""]))
    }

    /// Adds databases given as a comma separated list, as in `\bibliography`.
    pub fn add_databases(&mut self, job: &mut JobState, env: &mut Environment, list: &str) {
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if self.databases.contains_key(name) {
                continue;
            }
            let path = self.find(env, name, ".bib", &self.bib_path);
            match &path {
                Some(path) => job.add_source(env, path),
                None => tracing::debug!("database {name} is not local, leaving it to {}", self.tool),
            }
            self.databases.insert(name.to_string(), path);
        }
    }

    pub fn set_style(&mut self, job: &mut JobState, env: &mut Environment, name: &str) {
        let name = name.trim();
        let path = self.find(env, name, ".bst", &self.bst_path);
        if let Some(path) = &path {
            job.add_source(env, path);
        }
        self.style = Some((name.to_string(), path));
    }

    /// Reads the citations and databases from the auxiliary files.
    fn parse_aux(&self, job: &JobState) -> (Vec<String>, Vec<String>) {
        let aux_files = match &self.aux {
            Some(aux) => vec![aux.clone()],
            None => job.aux_files(),
        };
        let mut cites: Vec<String> = Vec::new();
        let mut databases = Vec::new();
        for aux in aux_files {
            let text = match std::fs::read_to_string(&aux) {
                Ok(text) => text,
                Err(_) => continue,
            };
            for line in text.lines() {
                if let Some(captures) = CITATION.captures(line) {
                    for cite in captures["cites"].split(',') {
                        if !cites.iter().any(|c| c == cite) {
                            cites.push(cite.to_string());
                        }
                    }
                } else if let Some(captures) = BIBDATA.captures(line) {
                    databases.extend(captures["data"].split(',').map(str::to_string));
                }
            }
        }
        if self.sorted {
            cites.sort();
        }
        databases.sort();
        (cites, databases)
    }

    fn list_undefined(&self, job: &JobState) -> Vec<String> {
        let mut undefined: Vec<String> = job
            .log()
            .lines()
            .iter()
            .filter_map(|line| UNDEFINED.captures(line).map(|c| c["cite"].to_string()))
            .collect();
        undefined.sort();
        undefined.dedup();
        undefined
    }

    /// Whether the output is out of date before any compilation.
    fn first_run_needed(&self) -> bool {
        if !self.bbl.exists() {
            return false;
        }
        if !self.log_errors().is_empty() {
            tracing::debug!("the last run of {} failed", self.tool);
            return true;
        }
        let inputs = self
            .databases
            .values()
            .flatten()
            .chain(self.style.iter().filter_map(|(_, path)| path.as_ref()));
        for input in inputs {
            if files::is_newer(input, &self.bbl) {
                tracing::debug!("{} is newer than {}", files::display(input), files::display(&self.bbl));
                return true;
            }
        }
        false
    }

    /// Whether a run is needed after a compilation.
    fn needed_after_compile(&mut self, job: &JobState) -> bool {
        if self.run_needed {
            return true;
        }
        let (cites, databases) = self.parse_aux(job);
        if let Some(previous) = &self.previous_databases {
            if *previous != databases {
                tracing::debug!("the set of databases changed");
                self.previous_databases = Some(databases);
                self.used_cites = cites;
                self.undefined = self.list_undefined(job);
                return true;
            }
        }
        self.previous_databases = Some(databases);
        if !self.used_cites.is_empty() && cites != self.used_cites {
            tracing::debug!("the list of citations changed");
            self.used_cites = cites;
            self.undefined = self.list_undefined(job);
            return true;
        }
        self.used_cites = cites;
        let undefined = self.list_undefined(job);
        if !self.undefined.is_empty() {
            let new = undefined.iter().any(|cite| !self.undefined.contains(cite));
            self.undefined = undefined;
            if new {
                tracing::debug!("there are new undefined citations");
                return true;
            }
            if !self.undefined.is_empty() {
                tracing::debug!("there are no new undefined citations");
                return false;
            }
        } else {
            self.undefined = undefined;
        }
        if !self.blg.exists() {
            tracing::debug!("{} has never been run", self.tool);
            return true;
        }
        if self.undefined.is_empty() {
            return false;
        }
        files::is_newer(&job.target(".log"), &self.blg)
    }

    fn run(&mut self, job: &mut JobState, env: &Environment) -> Result<()> {
        tracing::info!("running {} on {}", self.tool, self.base);
        let mut argv = vec![self.tool.clone()];
        if let Some(crossrefs) = &self.crossrefs {
            argv.push(format!("-min-crossrefs={crossrefs}"));
        }
        argv.push(self.base.clone());
        let bib_dirs: Vec<PathBuf> = self.bib_path.iter().chain(env.search_path()).cloned().collect();
        let bst_dirs: Vec<PathBuf> = self.bst_path.iter().chain(env.search_path()).cloned().collect();
        let invocation = Invocation::new(argv)
            .env("BIBINPUTS", process::search_path_var("BIBINPUTS", &bib_dirs))
            .env("BSTINPUTS", process::search_path_var("BSTINPUTS", &bst_dirs));
        let tool = &self.tool;
        let completed = process::run(&invocation, &mut |line: &str| tracing::debug!("{tool}: {line}"))?;
        // Warnings give the exit status 1.
        if completed.status.map_or(true, |status| status >= 2) {
            return Err(Error::Tool {
                program: self.tool.clone(),
                status: completed.status,
            });
        }
        self.run_needed = false;
        job.request_compile();
        Ok(())
    }

    pub fn pre_compile(&mut self, job: &mut JobState, env: &Environment) -> Result<()> {
        self.run_needed = self.first_run_needed();
        if job.must_compile() {
            return Ok(());
        }
        if self.run_needed {
            return self.run(job, env);
        }
        if files::is_newer(&self.bbl, &job.target(".log")) {
            job.request_compile();
        }
        Ok(())
    }

    pub fn post_compile(&mut self, job: &mut JobState, env: &Environment) -> Result<()> {
        if !self.needed_after_compile(job) {
            tracing::debug!("{} does not need to run for {}", self.tool, self.base);
            return Ok(());
        }
        self.run(job, env)
    }

    pub fn clean(&self) {
        files::remove(&self.bbl);
        files::remove(&self.blg);
    }

    /// Errors reported in the BibTeX log.
    pub fn log_errors(&self) -> Vec<Message> {
        let text = match std::fs::read_to_string(&self.blg) {
            Ok(text) => text,
            Err(_) => return vec![],
        };
        let mut messages = Vec::new();
        let mut last_line = "";
        for line in text.lines() {
            if let Some(captures) = BLG_ERROR.captures(line) {
                let start = captures.get(0).map_or(0, |m| m.start());
                let text = if start == 0 { last_line } else { &line[..start] };
                let mut message = Message::new(Kind::Error, text.trim());
                message.pkg = Some(self.tool.clone());
                message.line = captures.name("line").and_then(|l| l.as_str().parse().ok());
                let file = captures["file"].trim().to_string();
                let name = file.strip_suffix(".bib").unwrap_or(&file);
                message.file = Some(match self.databases.get(name) {
                    Some(Some(path)) => path.display().to_string(),
                    _ => file.clone(),
                });
                messages.push(message);
            }
            last_line = line;
        }
        messages
    }

    /// Handles the commands shared by [BibTeX] and [MultiBib].
    fn command(&mut self, command: &str, args: &[String]) -> Result<()> {
        match command {
            "path" => self.bib_path.extend(args.iter().map(PathBuf::from)),
            "stylepath" => self.bst_path.extend(args.iter().map(PathBuf::from)),
            "crossrefs" => self.crossrefs = args.first().cloned(),
            "sorted" => {
                self.sorted = args.first().map_or(true, |arg| !matches!(arg.as_str(), "false" | "no" | "0"))
            }
            "tool" => {
                self.tool = args
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::config("`tool` expects a program name"))?
            }
            _ => return Err(Error::config(format!("unknown command `{command}`"))),
        }
        Ok(())
    }
}

/// The `bibtex` module, for the bibliography of the main document.
pub struct BibTeX {
    bibliography: Bibliography,
}

impl BibTeX {
    pub fn new(job: &mut JobState, env: &mut Environment, options: &Options) -> Result<BibTeX> {
        let mut module = BibTeX {
            bibliography: Bibliography::new(job.base(), None),
        };
        super::apply_options(&mut module, options, job, env)?;
        Ok(module)
    }
}

impl Module for BibTeX {
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        vec![("bibliography", "a"), ("bibliographystyle", "a")]
    }

    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        match call.name.as_str() {
            "bibliography" => self.bibliography.add_databases(job, env, call.arg(0)),
            "bibliographystyle" => self.bibliography.set_style(job, env, call.arg(0)),
            _ => {}
        }
        Ok(())
    }

    fn command(
        &mut self,
        _: &mut JobState,
        _: &mut Environment,
        command: &str,
        args: &[String],
    ) -> Result<()> {
        self.bibliography.command(command, args)
    }

    fn pre_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        self.bibliography.pre_compile(job, env)
    }

    fn post_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        self.bibliography.post_compile(job, env)
    }

    fn clean(&mut self, _: &mut JobState, _: &mut Environment) {
        self.bibliography.clean();
    }

    fn errors(&self, _: &JobState) -> Vec<Message> {
        self.bibliography.log_errors()
    }
}

/// The `multibib` package: extra bibliographies declared with `\newcites`.
///
/// A bibliography named `ltex` has its own auxiliary file `ltex.aux`,
///     and its databases and style are given by `\bibliographyltex` and `\bibliographystyleltex`.
/// Bibliographies are processed in the order they are declared.
#[derive(Default)]
pub struct MultiBib {
    bibliographies: IndexMap<String, Bibliography>,
}

impl MultiBib {
    pub fn new() -> MultiBib {
        Default::default()
    }
}

impl Module for MultiBib {
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        vec![("newcites", "aa")]
    }

    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        if call.name == "newcites" {
            for name in call.arg(0).split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if self.bibliographies.contains_key(name) {
                    continue;
                }
                let aux = PathBuf::from(format!("{name}.aux"));
                self.bibliographies
                    .insert(name.to_string(), Bibliography::new(name, Some(aux)));
                job.add_hook(
                    &format!("bibliography{name}"),
                    "a",
                    Handler::Module("multibib".to_string()),
                )?;
                job.add_hook(
                    &format!("bibliographystyle{name}"),
                    "a",
                    Handler::Module("multibib".to_string()),
                )?;
            }
            return Ok(());
        }
        if let Some(name) = call.name.strip_prefix("bibliographystyle") {
            if let Some(bibliography) = self.bibliographies.get_mut(name) {
                bibliography.set_style(job, env, call.arg(0));
            }
        } else if let Some(name) = call.name.strip_prefix("bibliography") {
            if let Some(bibliography) = self.bibliographies.get_mut(name) {
                bibliography.add_databases(job, env, call.arg(0));
            }
        }
        Ok(())
    }

    fn command(
        &mut self,
        _: &mut JobState,
        _: &mut Environment,
        command: &str,
        args: &[String],
    ) -> Result<()> {
        for bibliography in self.bibliographies.values_mut() {
            bibliography.command(command, args)?;
        }
        Ok(())
    }

    fn pre_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        for bibliography in self.bibliographies.values_mut() {
            bibliography.pre_compile(job, env)?;
        }
        Ok(())
    }

    fn post_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        for bibliography in self.bibliographies.values_mut() {
            bibliography.post_compile(job, env)?;
        }
        Ok(())
    }

    fn clean(&mut self, _: &mut JobState, _: &mut Environment) {
        for bibliography in self.bibliographies.values() {
            bibliography.clean();
        }
    }

    fn errors(&self, _: &JobState) -> Vec<Message> {
        self.bibliographies
            .values()
            .flat_map(Bibliography::log_errors)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blg_errors() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("doc").display().to_string();
        let mut bibliography = Bibliography::new(&base, None);
        bibliography
            .databases
            .insert("refs".to_string(), Some(PathBuf::from("bib/refs.bib")));
        std::fs::write(
            dir.path().join("doc.blg"),
            "This is BibTeX, Version 0.99d\n\
             I was expecting a `,' or a `}'---line 12 of file refs.bib\n\
             Repeated entry---line 30 of file other.bib\n\
             I couldn't open style file plain.bst\n\
             ---while reading file doc.aux\n",
        )
        .unwrap();
        let errors = bibliography.log_errors();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].text, "I was expecting a `,' or a `}'");
        assert_eq!(errors[0].file.as_deref(), Some("bib/refs.bib"));
        assert_eq!(errors[0].line, Some(12));
        assert_eq!(errors[1].file.as_deref(), Some("other.bib"));
        assert_eq!(errors[2].text, "I couldn't open style file plain.bst");
        assert_eq!(errors[2].line, None);
        assert!(!bibliography.first_run_needed());
    }

    #[test]
    fn commands() {
        let mut bibliography = Bibliography::new("doc", None);
        bibliography.command("tool", &["biber".to_string()]).unwrap();
        bibliography.command("crossrefs", &["3".to_string()]).unwrap();
        bibliography.command("sorted", &["no".to_string()]).unwrap();
        assert_eq!(bibliography.tool, "biber");
        assert_eq!(bibliography.crossrefs.as_deref(), Some("3"));
        assert!(!bibliography.sorted);
        assert!(bibliography.command("tool", &[]).is_err());
        assert!(bibliography.command("frobnicate", &[]).is_err());
    }

    #[test]
    fn undefined_citation_pattern() {
        let line = "LaTeX Warning: Citation `knuth84' on page 1 undefined on input line 5.";
        assert_eq!(&UNDEFINED.captures(line).unwrap()["cite"], "knuth84");
        let line = "Package natbib Warning: Citation `lamport' on page 2 undefined on input line 9.";
        assert_eq!(&UNDEFINED.captures(line).unwrap()["cite"], "lamport");
    }
}
