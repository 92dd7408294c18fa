//! The typesetter job: the node of the graph that compiles a LaTeX document.
//!
//! A [Document] is created from a source file and then goes through three phases.
//!
//! 1. *Scanning* ([Document::parse]): the source is read with the lexer's hook scan,
//!     following `\input` and `\include` and looking for the macros that tell the build
//!     what the document needs: packages, bibliographies, figures.
//!     Each package that has build support loads a [module](crate::modules).
//!     Directives embedded in comments are executed along the way.
//!
//! 2. *Finalization* ([Document::finalize]): the document becomes a node of the graph,
//!     and post-processing modules append their own nodes after it.
//!
//! 3. *Compilation* ([controller]): when the node is made the typesetter is run,
//!     and run again, until the document is stable.
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;
use texscan::variable::Value;

use crate::digest::Digest;
use crate::environment::Environment;
use crate::graph::{BuildState, NodeId};
use crate::logparse::LogCheck;
use crate::modules::{self, ModuleRegistry, Options};
use crate::{files, Error, Result};

pub mod controller;
mod directives;
mod scanner;

pub use controller::CommandLine;
pub use scanner::{Flow, HookCall};

/// Maximum number of typesetter runs in one build.
pub const DEFAULT_MAX_PASSES: usize = 8;

/// Macros handled by the scanner itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    Input,
    Include,
    IncludeOnly,
    Begin,
    End,
    EndInput,
    Package,
    Class,
    Bibliography,
    BibliographyStyle,
    /// Watch the file with this suffix, like `.toc` for `\tableofcontents`.
    Watch(&'static str),
}

/// What handles a hooked macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    Builtin(Builtin),
    /// The module with this name.
    Module(String),
}

/// A hooked macro: the format of its arguments and its handler.
///
/// The format has one character per argument: `o` for an optional argument in brackets
///     and `a` for a required argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub format: String,
    pub handler: Handler,
}

const BUILTIN_HOOKS: &[(&str, &str, Builtin)] = &[
    ("input", "", Builtin::Input),
    ("include", "a", Builtin::Include),
    ("includeonly", "a", Builtin::IncludeOnly),
    ("begin", "a", Builtin::Begin),
    ("end", "a", Builtin::End),
    ("endinput", "", Builtin::EndInput),
    ("usepackage", "oa", Builtin::Package),
    ("RequirePackage", "oa", Builtin::Package),
    ("documentclass", "oa", Builtin::Class),
    ("LoadClass", "oa", Builtin::Class),
    ("bibliography", "a", Builtin::Bibliography),
    ("bibliographystyle", "a", Builtin::BibliographyStyle),
    ("tableofcontents", "", Builtin::Watch(".toc")),
    ("listoffigures", "", Builtin::Watch(".lof")),
    ("listoftables", "", Builtin::Watch(".lot")),
];

struct OnChange {
    file: PathBuf,
    command: String,
    digest: Option<Digest>,
}

/// Digests of an auxiliary file before and after the last run.
#[derive(Debug, Clone, Copy, Default)]
struct AuxDigests {
    before: Option<Digest>,
    after: Option<Digest>,
}

/// The state of a typesetter job that modules may inspect and modify.
pub struct JobState {
    source: PathBuf,
    base: String,
    jobname: Option<String>,
    primary_suffix: String,
    node: Option<NodeId>,
    // Scanning.
    hooks: IndexMap<String, Hook>,
    hooks_generation: u64,
    processed: HashSet<PathBuf>,
    include_only: Option<Vec<String>>,
    include_only_forced: bool,
    verbatim_envs: HashSet<String>,
    requested_modules: Vec<(String, Options)>,
    loaded_modules: Vec<String>,
    // Dependencies.
    sources: Vec<PathBuf>,
    watched: IndexMap<PathBuf, Option<Digest>>,
    onchange: Vec<OnChange>,
    aux: IndexMap<PathBuf, AuxDigests>,
    clean_files: Vec<PathBuf>,
    // Compilation.
    preamble: Vec<String>,
    must_compile: bool,
    /// Modification times of the sources when the last run of this build started.
    source_times: Option<HashMap<PathBuf, Option<SystemTime>>>,
    log: LogCheck,
    passes: usize,
    max_passes: usize,
    failed_module: Option<String>,
}

impl JobState {
    fn new(source: PathBuf, base: String, jobname: Option<String>) -> JobState {
        let hooks = BUILTIN_HOOKS
            .iter()
            .map(|(name, format, builtin)| {
                (
                    name.to_string(),
                    Hook {
                        format: format.to_string(),
                        handler: Handler::Builtin(builtin.clone()),
                    },
                )
            })
            .collect();
        let mut aux = IndexMap::new();
        aux.insert(PathBuf::from(format!("{base}.aux")), AuxDigests::default());
        JobState {
            sources: vec![files::absolute(&source)],
            source,
            base,
            jobname,
            primary_suffix: ".dvi".to_string(),
            node: None,
            hooks,
            hooks_generation: 0,
            processed: HashSet::new(),
            include_only: None,
            include_only_forced: false,
            verbatim_envs: ["verbatim", "verbatim*"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            requested_modules: Vec::new(),
            loaded_modules: Vec::new(),
            watched: IndexMap::new(),
            onchange: Vec::new(),
            aux,
            clean_files: Vec::new(),
            preamble: Vec::new(),
            must_compile: false,
            source_times: None,
            log: LogCheck::new(),
            passes: 0,
            max_passes: DEFAULT_MAX_PASSES,
            failed_module: None,
        }
    }

    /// The main source file, as given.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The base name of the files the typesetter writes, like `doc` for `doc.aux`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The path of an output of the typesetter, like `doc.log` for the suffix `.log`.
    pub fn target(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.base, suffix))
    }

    pub fn primary_suffix(&self) -> &str {
        &self.primary_suffix
    }

    /// Sets the suffix of the typesetter's output, `.dvi` by default.
    pub fn set_primary_suffix(&mut self, suffix: &str) {
        self.primary_suffix = suffix.to_string();
    }

    /// The typesetter's output file.
    pub fn primary_product(&self) -> PathBuf {
        self.target(&self.primary_suffix)
    }

    /// The job's node, once the job is finalized.
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// The log of the last typesetter run.
    pub fn log(&self) -> &LogCheck {
        &self.log
    }

    /// Number of typesetter runs in the current build.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn set_max_passes(&mut self, max_passes: usize) {
        self.max_passes = max_passes;
    }

    /// Asks for another typesetter run.
    pub fn request_compile(&mut self) {
        self.must_compile = true;
    }

    pub fn must_compile(&self) -> bool {
        self.must_compile
    }

    /// Adds a file the document depends on.
    pub fn add_source(&mut self, env: &mut Environment, path: &Path) {
        let path = files::absolute(path);
        if self.sources.contains(&path) {
            return;
        }
        tracing::debug!("{} depends on {}", self.base, files::display(&path));
        if let Some(node) = self.node {
            env.graph_mut().add_source(node, &path);
        }
        self.sources.push(path);
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Watches a file: if its content changes during a run, the typesetter runs again.
    pub fn watch(&mut self, path: &Path) {
        if !self.watched.contains_key(path) {
            self.watched.insert(path.to_path_buf(), Digest::of_file(path));
        }
    }

    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.watched.keys().map(PathBuf::as_path)
    }

    /// Tracks an auxiliary file written by the typesetter.
    pub fn add_aux(&mut self, path: &Path) {
        self.aux.entry(path.to_path_buf()).or_default();
    }

    /// The main auxiliary file followed by those of included files.
    pub fn aux_files(&self) -> Vec<PathBuf> {
        self.aux.keys().cloned().collect()
    }

    /// Removes a file on clean.
    pub fn clean_file(&mut self, path: PathBuf) {
        if !self.clean_files.contains(&path) {
            self.clean_files.push(path);
        }
    }

    /// Hooks a macro. Fails if the argument format is invalid.
    pub fn add_hook(&mut self, name: &str, format: &str, handler: Handler) -> Result<()> {
        if !scanner::is_valid_format(format) {
            return Err(Error::config(format!(
                "invalid argument format `{format}` for \\{name}"
            )));
        }
        self.hooks.insert(
            name.to_string(),
            Hook {
                format: format.to_string(),
                handler,
            },
        );
        self.hooks_generation += 1;
        Ok(())
    }

    pub fn hook(&self, name: &str) -> Option<&Hook> {
        self.hooks.get(name)
    }

    /// Declares an environment whose content is not scanned.
    pub fn add_verbatim_env(&mut self, name: &str) {
        self.verbatim_envs.insert(name.to_string());
    }

    pub fn is_verbatim_env(&self, name: &str) -> bool {
        self.verbatim_envs.contains(name)
    }

    /// Asks for a module to be loaded, for modules that build on others.
    pub fn request_module(&mut self, name: &str, options: Options) {
        self.requested_modules.push((name.to_string(), options));
    }

    pub fn has_module(&self, name: &str) -> bool {
        let name = modules::canonical_name(name);
        self.loaded_modules.iter().any(|m| m == name)
    }

    /// Adds TeX code to run before the document is input, like `\pdfoutput=1`.
    pub fn add_tex_preamble(&mut self, code: &str) {
        self.preamble.push(code.to_string());
    }

    /// Restricts `\include` to the given files, overriding `\includeonly` in the document.
    pub fn force_include_only(&mut self, names: Vec<String>) {
        self.add_tex_preamble(&format!("\\includeonly{{{}}}", names.join(",")));
        self.include_only = Some(names);
        self.include_only_forced = true;
    }
}

/// A LaTeX document and the modules supporting it.
pub struct Document {
    state: JobState,
    modules: ModuleRegistry,
    pre_compiled: bool,
}

impl Document {
    /// Creates the job for a source file.
    ///
    /// The typesetter writes its files in the working directory,
    ///     named after the job name, which defaults to the source's file name without extension.
    pub fn new(source: &Path, jobname: Option<&str>, env: &mut Environment) -> Result<Document> {
        if !source.is_file() {
            return Err(Error::MissingSource(files::absolute(source)));
        }
        let source_name = source.display().to_string();
        let (source_base, _) = files::strip_suffix(&source_name);
        let stem = Path::new(source_base)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source_base.to_string());
        let base = jobname.map(str::to_string).unwrap_or_else(|| stem.clone());
        env.set_var("source", source_name.clone());
        env.set_var("base", stem);
        env.set_var("target", base.clone());
        env.set_var("job", base.clone());
        Ok(Document {
            state: JobState::new(source.to_path_buf(), base, jobname.map(str::to_string)),
            modules: ModuleRegistry::new(),
            pre_compiled: false,
        })
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut JobState {
        &mut self.state
    }

    /// Scans the document's source.
    pub fn parse(&mut self, env: &mut Environment) -> Result<()> {
        let source = self.state.source.clone();
        tracing::info!("scanning {}", files::display(&source));
        self.process_file(env, &source)?;
        Ok(())
    }

    /// Adds the document to the graph and lets post-processing modules append their nodes.
    ///
    /// Returns the document's node.
    pub fn finalize(self, env: &mut Environment) -> Result<NodeId> {
        let product = self.state.primary_product();
        let sources = self.state.sources.clone();
        let id = env.graph_mut().add_node(vec![product], sources, Box::new(self))?;
        env.set_main(id);
        with_document(env, id, |doc, env| {
            doc.state.node = Some(id);
            for (name, module) in doc.modules.iter_mut() {
                module
                    .finalize(&mut doc.state, env)
                    .map_err(|err| modules::attribute(name, err))?;
            }
            Ok(())
        })
        .unwrap_or(Ok(()))?;
        Ok(id)
    }

    /// Loads the module with the given name unless it is already loaded.
    ///
    /// Returns false if no module has this name.
    pub fn register_module(
        &mut self,
        env: &mut Environment,
        name: &str,
        options: &Options,
    ) -> Result<bool> {
        let name = modules::canonical_name(name);
        if self.modules.contains(name) {
            return Ok(true);
        }
        let module = match modules::load(name, options, &mut self.state, env)? {
            Some(module) => module,
            None => return Ok(false),
        };
        tracing::debug!("loaded module {name}");
        for (hook, format) in module.hooks() {
            self.state
                .add_hook(hook, format, Handler::Module(name.to_string()))?;
        }
        self.state.loaded_modules.push(name.to_string());
        let delayed = self.modules.insert(name, module);
        for (command, args) in delayed {
            self.module_command(env, name, &command, &args)?;
        }
        self.load_requested_modules(env)?;
        Ok(true)
    }

    fn load_requested_modules(&mut self, env: &mut Environment) -> Result<()> {
        let requested = std::mem::take(&mut self.state.requested_modules);
        for (name, options) in requested {
            if !self.register_module(env, &name, &options)? {
                tracing::warn!("module {name} is not available");
            }
        }
        Ok(())
    }

    /// Sends a command to a module, or keeps it until the module is loaded.
    pub fn module_command(
        &mut self,
        env: &mut Environment,
        module: &str,
        command: &str,
        args: &[String],
    ) -> Result<()> {
        match self.modules.get_mut(module) {
            Some(m) => m
                .command(&mut self.state, env, command, args)
                .map_err(|err| modules::attribute(module, err))?,
            None => {
                tracing::debug!("delaying command {module}.{command} until the module is loaded");
                self.modules.delay(module, command, args.to_vec());
            }
        }
        self.load_requested_modules(env)
    }
}

/// Runs a closure on the document of a typesetter node.
///
/// Returns [None] if the node is not a typesetter node.
pub fn with_document<R, F>(env: &mut Environment, id: NodeId, f: F) -> Option<R>
where
    F: FnOnce(&mut Document, &mut Environment) -> R,
{
    let mut action = env.graph_mut().take_action(id)?;
    let result = action
        .as_any_mut()
        .downcast_mut::<Document>()
        .map(|doc| f(doc, env));
    env.graph_mut().put_action(id, action);
    result
}
