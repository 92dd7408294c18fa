//! Indices sorted by makeindex or xindy.
//!
//! The typesetter writes raw entries to a file like `doc.idx`;
//!     the index tool sorts them into a file like `doc.ind` that the next run reads.
//! The tool runs after a compilation whenever the raw entries changed.
use std::path::PathBuf;

use indexmap::IndexMap;

use super::Module;
use crate::digest::Digest;
use crate::document::{HookCall, JobState};
use crate::environment::Environment;
use crate::process::{self, Invocation};
use crate::{files, Error, Result};

/// The program that sorts an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    MakeIndex,
    Xindy,
}

/// One index: raw entries, sorted output and transcript.
#[derive(Debug, Clone)]
pub struct Index {
    source: PathBuf,
    target: PathBuf,
    transcript: PathBuf,
    tool: Tool,
    /// Extra makeindex options from `order`.
    options: Vec<String>,
    style: Option<String>,
    path: Vec<PathBuf>,
    language: Option<String>,
    xindy_modules: Vec<String>,
    digest: Option<Digest>,
}

impl Index {
    pub fn new(job: &mut JobState, env: &mut Environment, source: &str, target: &str, transcript: &str) -> Index {
        let index = Index {
            source: job.target(&format!(".{source}")),
            target: job.target(&format!(".{target}")),
            transcript: job.target(&format!(".{transcript}")),
            tool: Tool::MakeIndex,
            options: Vec::new(),
            style: None,
            path: Vec::new(),
            language: None,
            xindy_modules: Vec::new(),
            digest: None,
        };
        if index.target.exists() {
            job.add_source(env, &index.target);
        }
        index
    }

    fn run_needed(&mut self) -> bool {
        if std::fs::metadata(&self.source).map_or(true, |m| m.len() == 0) {
            tracing::debug!("the index {} is empty", files::display(&self.source));
            return false;
        }
        let digest = Digest::of_file(&self.source);
        let previous = std::mem::replace(&mut self.digest, digest);
        if !self.target.exists() {
            return true;
        }
        match previous {
            None => {
                if files::is_newer(&self.source, &self.target) {
                    tracing::debug!("the index {} is new", files::display(&self.source));
                    true
                } else {
                    false
                }
            }
            Some(previous) if Some(previous) == digest => {
                tracing::debug!("the index {} did not change", files::display(&self.source));
                false
            }
            Some(_) => {
                tracing::debug!("the index {} changed", files::display(&self.source));
                true
            }
        }
    }

    /// The command line of the index tool and the variable of its search path.
    fn invocation(&self) -> (Vec<String>, &'static str) {
        let source = self.source.display().to_string();
        match self.tool {
            Tool::MakeIndex => {
                let mut argv = vec![
                    "makeindex".to_string(),
                    "-q".to_string(),
                    "-o".to_string(),
                    self.target.display().to_string(),
                ];
                argv.extend(self.options.iter().cloned());
                argv.push("-t".to_string());
                argv.push(self.transcript.display().to_string());
                if let Some(style) = &self.style {
                    argv.push("-s".to_string());
                    argv.push(style.clone());
                }
                argv.push(source);
                (argv, "INDEXSTYLE")
            }
            Tool::Xindy => {
                let mut argv = vec!["texindy".to_string(), "--quiet".to_string()];
                let mut language = self.language.clone();
                let mut modules = self.xindy_modules.clone();
                for option in &self.options {
                    match option.as_str() {
                        "-g" if language.is_none() => language = Some("german-din".to_string()),
                        "-g" => tracing::warn!("the index language overrides `order german`"),
                        "-l" => modules.push("letter-ordering".to_string()),
                        other => tracing::warn!("xindy has no equivalent of the option {other}"),
                    }
                }
                for module in modules {
                    argv.push("--module".to_string());
                    argv.push(module);
                }
                if let Some(language) = language {
                    argv.push("--language".to_string());
                    argv.push(language);
                }
                argv.push("-o".to_string());
                argv.push(self.target.display().to_string());
                argv.push(source);
                (argv, "XINDY_SEARCHPATH")
            }
        }
    }

    fn post_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        if !self.source.exists() {
            return Ok(());
        }
        if !self.run_needed() {
            return Ok(());
        }
        tracing::info!("processing the index {}", files::display(&self.source));
        let (argv, path_var) = self.invocation();
        let mut invocation = Invocation::new(argv);
        if !self.path.is_empty() {
            invocation = invocation.env(path_var, process::search_path_var(path_var, &self.path));
        }
        process::run_checked(&invocation)?;
        job.add_source(env, &self.target);
        job.request_compile();
        Ok(())
    }

    fn clean(&self) {
        files::remove(&self.target);
        files::remove(&self.transcript);
    }

    fn command(&mut self, command: &str, args: &[String]) -> Result<()> {
        match command {
            "order" => {
                for arg in args {
                    match arg.as_str() {
                        "standard" => {}
                        "german" => self.options.push("-g".to_string()),
                        "letter" => self.options.push("-l".to_string()),
                        other => return Err(Error::config(format!("unknown index order `{other}`"))),
                    }
                }
            }
            "path" => self.path.extend(args.iter().map(PathBuf::from)),
            "style" => self.style = args.first().cloned(),
            "tool" => {
                self.tool = match args.first().map(String::as_str) {
                    Some("makeindex") => Tool::MakeIndex,
                    Some("xindy") | Some("texindy") => Tool::Xindy,
                    Some(other) => return Err(Error::config(format!("unknown index tool `{other}`"))),
                    None => return Err(Error::config("`tool` expects `makeindex` or `xindy`")),
                }
            }
            "language" => self.language = args.first().cloned(),
            "modules" => self.xindy_modules.extend(args.iter().cloned()),
            _ => return Err(Error::config(format!("unknown command `{command}`"))),
        }
        Ok(())
    }
}

/// The `makeidx`, `nomencl` and `index` modules.
///
/// Commands apply to every index of the document.
pub struct IndexModule {
    indices: IndexMap<String, Index>,
    /// Whether `\newindex` may declare more indices.
    multiple: bool,
}

impl IndexModule {
    pub fn makeidx(job: &mut JobState, env: &mut Environment) -> IndexModule {
        let mut indices = IndexMap::new();
        indices.insert("default".to_string(), Index::new(job, env, "idx", "ind", "ilg"));
        IndexModule {
            indices,
            multiple: false,
        }
    }

    pub fn nomencl(job: &mut JobState, env: &mut Environment) -> IndexModule {
        let mut index = Index::new(job, env, "nlo", "nls", "nlg");
        index.style = Some("nomencl.ist".to_string());
        let mut indices = IndexMap::new();
        indices.insert("nomencl".to_string(), index);
        IndexModule {
            indices,
            multiple: false,
        }
    }

    pub fn index(job: &mut JobState, env: &mut Environment) -> IndexModule {
        IndexModule {
            multiple: true,
            ..IndexModule::makeidx(job, env)
        }
    }
}

impl Module for IndexModule {
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        if self.multiple {
            vec![("newindex", "aaaa"), ("renewindex", "aaaa")]
        } else {
            vec![]
        }
    }

    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        // \newindex{tag}{raw suffix}{sorted suffix}{title}
        let tag = call.arg(0).trim();
        if tag.is_empty() {
            return Ok(());
        }
        let transcript = format!("{tag}.ilg");
        let mut index = Index::new(job, env, call.arg(1).trim(), call.arg(2).trim(), &transcript);
        if let Some(existing) = self.indices.get(tag) {
            index.tool = existing.tool;
            index.style = existing.style.clone();
        }
        self.indices.insert(tag.to_string(), index);
        Ok(())
    }

    fn command(
        &mut self,
        _: &mut JobState,
        _: &mut Environment,
        command: &str,
        args: &[String],
    ) -> Result<()> {
        for index in self.indices.values_mut() {
            index.command(command, args)?;
        }
        Ok(())
    }

    fn post_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        for index in self.indices.values_mut() {
            index.post_compile(job, env)?;
        }
        Ok(())
    }

    fn clean(&mut self, _: &mut JobState, _: &mut Environment) {
        for index in self.indices.values() {
            index.clean();
        }
    }
}
