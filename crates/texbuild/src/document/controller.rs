//! Running the typesetter until the document is stable.
//!
//! One run of the typesetter is rarely enough.
//! After each run the controller decides whether another one is needed, in this order:
//!
//! 1. something explicitly asked for a run, typically a module whose tool updated an input;
//! 1. the log reports errors;
//! 1. a dependency is newer than the output;
//! 1. a watched file changed;
//! 1. the log asks for a rerun and some auxiliary file changed.
//!
//! Before the first run, modules get a chance to prepare their inputs,
//!     and the typesetter is not run at all if the output is already up to date.
use std::any::Any;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use texscan::variable::Variables;

use super::{Document, JobState};
use crate::digest::Digest;
use crate::environment::Environment;
use crate::graph::{Action, BuildState, NodeId, NodeKind};
use crate::logparse::{Message, Select};
use crate::modules;
use crate::process::{self, Invocation};
use crate::{files, Error, Result};

static MKTEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^kpathsea: Running (?P<tool>mktex\S+) (?P<arg>.*)$").unwrap());

/// The typesetter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub jobname: Option<String>,
    /// `Some("")` for `-src-specials` without a value.
    pub src_specials: Option<String>,
    pub arguments: Vec<String>,
    /// TeX code run before the source is input.
    pub preamble: Vec<String>,
    pub source: String,
}

impl CommandLine {
    pub fn new(vars: &Variables, job: &JobState) -> CommandLine {
        let src_specials = match vars.get_str("src-specials") {
            s if s.is_empty() => None,
            s if s == "yes" => Some(String::new()),
            s => Some(s),
        };
        CommandLine {
            program: vars.get_str("program"),
            jobname: job.jobname.clone(),
            src_specials,
            arguments: vars.get_list("arguments"),
            preamble: job.preamble.clone(),
            source: job.source.display().to_string(),
        }
    }

    /// The program followed by its arguments.
    ///
    /// The last argument is TeX code that sets non-stop mode and inputs the source.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        if let Some(jobname) = &self.jobname {
            argv.push(format!("-jobname={jobname}"));
        }
        match self.src_specials.as_deref() {
            None => {}
            Some("") => argv.push("-src-specials".to_string()),
            Some(specials) => argv.push(format!("-src-specials={specials}")),
        }
        argv.extend(self.arguments.iter().cloned());
        argv.push(format!(
            "{}\\nonstopmode\\input{{{}}}",
            self.preamble.concat(),
            self.source
        ));
        argv
    }
}

fn report_progress(program: &str, line: &str) {
    match MKTEX.captures(line) {
        Some(captures) => tracing::info!("running {} {}", &captures["tool"], &captures["arg"]),
        None => tracing::debug!("{program}: {line}"),
    }
}

impl Document {
    /// Lets modules prepare their inputs and decides whether a run is needed.
    fn pre_compile(&mut self, env: &mut Environment) -> Result<()> {
        tracing::debug!("preparing the compilation of {}", self.state.base);
        self.state.passes = 0;
        self.state.source_times = None;
        for (path, digests) in self.state.aux.iter_mut() {
            digests.after = Digest::of_file(path);
        }
        self.state.failed_module = None;
        for (name, module) in self.modules.iter_mut() {
            if let Err(err) = module.pre_compile(&mut self.state, env) {
                self.state.failed_module = Some(name.to_string());
                return Err(modules::attribute(name, err));
            }
        }
        self.pre_compiled = true;
        if !self.state.must_compile {
            self.state.must_compile = self.compile_needed(env);
        }
        Ok(())
    }

    fn compile_needed(&mut self, env: &Environment) -> bool {
        if self.state.must_compile {
            return true;
        }
        let product = self.state.primary_product();
        if !product.exists() {
            tracing::debug!("{} does not exist", files::display(&product));
            return true;
        }
        let log_path = self.state.target(".log");
        if !log_path.exists() {
            tracing::debug!("{} does not exist", files::display(&log_path));
            return true;
        }
        if files::is_newer(&self.state.source, &product) {
            tracing::debug!("the source is newer than the output");
            return true;
        }
        if self.state.log.read(&log_path).is_err() {
            tracing::debug!("{} is not a valid log", files::display(&log_path));
            return true;
        }
        self.recompile_needed(env)
    }

    fn recompile_needed(&mut self, env: &Environment) -> bool {
        if self.state.must_compile {
            return true;
        }
        if self.state.log.errors() {
            tracing::debug!("the last compilation failed");
            self.update_watches();
            return true;
        }
        if self.dependency_changed(env) {
            self.update_watches();
            return true;
        }
        if let Some(changed) = self.update_watches() {
            tracing::debug!("{} has changed", files::display(&changed));
            return true;
        }
        if self.state.log.run_needed() {
            if self.state.aux.values().any(|d| d.before != d.after) {
                tracing::debug!("the typesetter asks for another run");
                return true;
            }
            tracing::debug!("the typesetter asks for another run but the auxiliary files did not change");
        }
        false
    }

    fn sources<'a>(&'a self, env: &'a Environment) -> &'a [PathBuf] {
        match self.state.node {
            Some(id) => env.graph().node(id).sources(),
            None => self.state.sources.as_slice(),
        }
    }

    /// Whether a source is newer than the output.
    ///
    /// After a run of this build, a source only counts if it was modified after that run started.
    fn dependency_changed(&self, env: &Environment) -> bool {
        let product = match files::mtime(&self.state.primary_product()) {
            Some(time) => time,
            None => return true,
        };
        let changed = self.sources(env).iter().find(|source| {
            let time = match files::mtime(source) {
                Some(time) if time > product => time,
                _ => return false,
            };
            match &self.state.source_times {
                Some(times) => times.get(source.as_path()) != Some(&Some(time)),
                None => true,
            }
        });
        match changed {
            Some(source) => {
                tracing::debug!("{} is newer than the output", files::display(source));
                true
            }
            None => false,
        }
    }

    /// Updates the digests of watched files and returns the first that changed.
    fn update_watches(&mut self) -> Option<PathBuf> {
        let mut changed = None;
        for (path, digest) in self.state.watched.iter_mut() {
            let new = Digest::of_file(path);
            if new != *digest {
                *digest = new;
                if changed.is_none() {
                    changed = Some(path.clone());
                }
            }
        }
        changed
    }

    /// Runs the typesetter once.
    fn compile(&mut self, env: &mut Environment) -> Result<()> {
        self.state.must_compile = false;
        self.state.passes += 1;
        let times = self
            .sources(env)
            .iter()
            .map(|source| (source.clone(), files::mtime(source)))
            .collect();
        self.state.source_times = Some(times);
        let command_line = CommandLine::new(&env.vars, &self.state);
        if command_line.source.contains(|c: char| c == ' ' || c == '(' || c == ')') {
            tracing::warn!(
                "the source name `{}` contains spaces or parentheses, which the typesetter may not handle",
                command_line.source
            );
        }
        tracing::info!(
            "compiling {} (pass {})",
            files::display(&self.state.source),
            self.state.passes
        );
        let invocation = Invocation::new(command_line.argv())
            .env("TEXINPUTS", process::search_path_var("TEXINPUTS", env.search_path()));
        let program = command_line.program;
        let completed = process::run(&invocation, &mut |line: &str| report_progress(&program, line))?;
        let log_path = self.state.target(".log");
        self.state.log.read(&log_path).map_err(|err| match err {
            Error::Io { .. } => {
                Error::Typesetter(format!("`{program}` did not write {}", files::display(&log_path)))
            }
            err => err,
        })?;
        if self.state.log.errors() {
            return Err(Error::Typesetter(format!(
                "there were errors compiling {}",
                files::display(&self.state.source)
            )));
        }
        if !completed.success {
            tracing::debug!("`{program}` exited with status {:?}", completed.status);
        }
        let product = self.state.primary_product();
        if !product.exists() {
            return Err(Error::Typesetter(format!(
                "`{program}` did not produce {}",
                files::display(&product)
            )));
        }
        for (path, digests) in self.state.aux.iter_mut() {
            digests.before = digests.after;
            digests.after = Digest::of_file(path);
        }
        Ok(())
    }

    fn post_compile(&mut self, env: &mut Environment) -> Result<()> {
        for change in self.state.onchange.iter_mut() {
            let digest = Digest::of_file(&change.file);
            if digest != change.digest {
                change.digest = digest;
                tracing::info!("running {}", change.command);
                process::run_checked(&Invocation::new(["sh", "-c", change.command.as_str()]))?;
            }
        }
        for (name, module) in self.modules.iter_mut() {
            if let Err(err) = module.post_compile(&mut self.state, env) {
                self.state.failed_module = Some(name.to_string());
                return Err(modules::attribute(name, err));
            }
        }
        Ok(())
    }

    fn run_passes(&mut self, env: &mut Environment) -> Result<()> {
        if !self.pre_compiled {
            self.pre_compile(env)?;
        }
        self.pre_compiled = false;
        self.state.passes = 0;
        loop {
            self.compile(env)?;
            self.post_compile(env)?;
            if !self.recompile_needed(env) {
                return Ok(());
            }
            if self.state.passes >= self.state.max_passes {
                tracing::warn!(
                    "stopping after {} compilations; the output may not be stable",
                    self.state.passes
                );
                return Ok(());
            }
            process::check_interrupted()?;
        }
    }

    /// Diagnostics of the last typesetter run, read from the log if no run happened in this build.
    pub fn log_messages(&mut self, select: Select) -> Result<Vec<Message>> {
        if !self.state.log.is_loaded() {
            self.state.log.read(&self.state.target(".log"))?;
        }
        Ok(self.state.log.parse(select))
    }

    fn remove_outputs(&mut self, env: &mut Environment) {
        files::remove(&self.state.target(".log"));
        for aux in self.state.aux.keys() {
            files::remove(aux);
        }
        for path in self.state.watched.keys() {
            files::remove(path);
        }
        for path in &self.state.clean_files {
            files::remove(path);
        }
        for (_, module) in self.modules.iter_mut() {
            module.clean(&mut self.state, env);
        }
    }
}

impl Action<Environment> for Document {
    fn kind(&self) -> NodeKind {
        NodeKind::Typesetter
    }

    fn should_run(&mut self, env: &mut Environment, _: NodeId) -> Result<bool> {
        self.pre_compile(env)?;
        Ok(self.state.must_compile)
    }

    fn run(&mut self, env: &mut Environment, _: NodeId) -> Result<()> {
        self.run_passes(env)
    }

    fn force_run(&mut self, env: &mut Environment, _: NodeId) -> Result<()> {
        self.state.must_compile = true;
        self.run_passes(env)
    }

    fn clean(&mut self, env: &mut Environment, _: NodeId) {
        self.remove_outputs(env);
    }

    fn messages(&self) -> Vec<Message> {
        match &self.state.failed_module {
            Some(name) => self
                .modules
                .get(name)
                .map(|module| module.errors(&self.state))
                .unwrap_or_default(),
            None => self.state.log.get_errors(),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_line() -> CommandLine {
        CommandLine {
            program: "latex".to_string(),
            jobname: None,
            src_specials: None,
            arguments: vec![],
            preamble: vec![],
            source: "doc.tex".to_string(),
        }
    }

    #[test]
    fn plain_command_line() {
        assert_eq!(
            command_line().argv(),
            vec!["latex".to_string(), "\\nonstopmode\\input{doc.tex}".to_string()]
        );
    }

    #[test]
    fn full_command_line() {
        let command_line = CommandLine {
            program: "pdflatex".to_string(),
            jobname: Some("out".to_string()),
            src_specials: Some(String::new()),
            arguments: vec!["-shell-escape".to_string()],
            preamble: vec!["\\pdfoutput=1".to_string(), "\\includeonly{a,b}".to_string()],
            ..command_line()
        };
        assert_eq!(
            command_line.argv(),
            vec![
                "pdflatex",
                "-jobname=out",
                "-src-specials",
                "-shell-escape",
                "\\pdfoutput=1\\includeonly{a,b}\\nonstopmode\\input{doc.tex}",
            ]
        );
    }

    #[test]
    fn src_specials_with_value() {
        let command_line = CommandLine {
            src_specials: Some("par,math".to_string()),
            ..command_line()
        };
        assert_eq!(command_line.argv()[1], "-src-specials=par,math");
    }
}
