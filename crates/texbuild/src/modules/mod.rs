//! Build support for LaTeX packages.
//!
//! When the scanner finds `\usepackage{name}` and no local `name.sty` exists,
//!     the module with that name is loaded, if there is one.
//! Modules can also be loaded with the `module` directive.
//!
//! A module hooks macros of its package, receives commands from `module.command` directives,
//!     and takes part in each compilation through [Module::pre_compile] and [Module::post_compile].
use indexmap::IndexMap;

use crate::document::{HookCall, JobState};
use crate::environment::Environment;
use crate::logparse::Message;
use crate::{Error, Result};

pub mod bibtex;
pub mod engine;
pub mod extras;
pub mod graphics;
pub mod index;
pub mod postprocess;

/// Options of a package or module, like `[draft,scale=2]`.
pub type Options = IndexMap<String, Option<String>>;

/// Build support for a package.
///
/// Every method has a default that does nothing.
pub trait Module {
    /// Macros to hook, with their argument formats.
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        vec![]
    }

    /// Handles a call of a hooked macro.
    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        _ = (job, env, call);
        Ok(())
    }

    /// Handles a `module.command` directive.
    fn command(
        &mut self,
        job: &mut JobState,
        env: &mut Environment,
        command: &str,
        args: &[String],
    ) -> Result<()> {
        _ = (job, env, args);
        Err(Error::config(format!("unknown command `{command}`")))
    }

    /// Called once the document is in the graph.
    fn finalize(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        _ = (job, env);
        Ok(())
    }

    /// Called before the first typesetter run of a build.
    fn pre_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        _ = (job, env);
        Ok(())
    }

    /// Called after each typesetter run.
    fn post_compile(&mut self, job: &mut JobState, env: &mut Environment) -> Result<()> {
        _ = (job, env);
        Ok(())
    }

    /// Removes the files the module produced.
    fn clean(&mut self, job: &mut JobState, env: &mut Environment) {
        _ = (job, env);
    }

    /// Diagnostics explaining a failure of the module.
    fn errors(&self, job: &JobState) -> Vec<Message> {
        _ = job;
        vec![]
    }
}

/// The loaded modules of a document, in load order.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, Box<dyn Module>>,
    delayed: IndexMap<String, Vec<(String, Vec<String>)>>,
}

impl ModuleRegistry {
    pub fn new() -> ModuleRegistry {
        Default::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(canonical_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.modules.get(canonical_name(name)).map(|m| m.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Module + 'static)> {
        self.modules
            .get_mut(canonical_name(name))
            .map(|m| m.as_mut())
    }

    /// Adds a module and returns the commands delayed until it was loaded.
    pub fn insert(&mut self, name: &str, module: Box<dyn Module>) -> Vec<(String, Vec<String>)> {
        let name = canonical_name(name);
        self.modules.insert(name.to_string(), module);
        self.delayed.shift_remove(name).unwrap_or_default()
    }

    /// Keeps a command for a module that is not loaded yet.
    pub fn delay(&mut self, module: &str, command: &str, args: Vec<String>) {
        self.delayed
            .entry(canonical_name(module).to_string())
            .or_default()
            .push((command.to_string(), args));
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Box<dyn Module>)> {
        self.modules.iter_mut().map(|(name, m)| (name.as_str(), m))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

/// Packages that share a module.
pub fn canonical_name(name: &str) -> &str {
    match name {
        "graphicx" | "epsfig" => "graphics",
        "lualatex" => "luatex",
        "xetex" => "xelatex",
        "xr-hyper" => "xr",
        name => name,
    }
}

/// Creates the module with the given name, or returns [None] if there is none.
pub fn load(
    name: &str,
    options: &Options,
    job: &mut JobState,
    env: &mut Environment,
) -> Result<Option<Box<dyn Module>>> {
    let module: Box<dyn Module> = match canonical_name(name) {
        "bibtex" => Box::new(bibtex::BibTeX::new(job, env, options)?),
        "multibib" => Box::new(bibtex::MultiBib::new()),
        "makeidx" => Box::new(index::IndexModule::makeidx(job, env)),
        "nomencl" => Box::new(index::IndexModule::nomencl(job, env)),
        "index" => Box::new(index::IndexModule::index(job, env)),
        "graphics" => Box::new(graphics::Graphics::new(options, job, env)),
        "dvips" | "dvipdfm" | "ps2pdf" | "gzip" | "bzip2" => {
            Box::new(postprocess::PostProcess::new(name, options)?)
        }
        "pdftex" | "xelatex" | "luatex" | "omega" | "etex" | "vtex" => {
            Box::new(engine::Engine::new(canonical_name(name), options, job, env)?)
        }
        "beamer" => Box::new(extras::Beamer::new(job)),
        "hyperref" => Box::new(extras::Hyperref::new(job)),
        "minitoc" => Box::new(extras::Minitoc),
        "verbatim" | "moreverb" | "fancyvrb" | "listings" | "comment" => {
            Box::new(extras::Verbatim::new(name, job))
        }
        "xr" => Box::new(extras::ExternalDocuments),
        "pdfpages" => Box::new(extras::PdfPages),
        _ => return Ok(None),
    };
    Ok(Some(module))
}

/// Attributes an error to a module.
pub fn attribute(module: &str, err: Error) -> Error {
    match err {
        Error::Module { .. } | Error::Interrupted => err,
        Error::Config(message) => Error::config(format!("{module}: {message}")),
        err => Error::module(module, err.to_string()),
    }
}

/// Applies module options as commands, for options like `[tool=biber]`.
pub(crate) fn apply_options<M: Module>(
    module: &mut M,
    options: &Options,
    job: &mut JobState,
    env: &mut Environment,
) -> Result<()> {
    for (key, value) in options {
        let args: Vec<String> = value.iter().cloned().collect();
        module.command(job, env, key, &args)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(usize);

    impl Module for Counter {
        fn command(
            &mut self,
            _: &mut JobState,
            _: &mut Environment,
            command: &str,
            _: &[String],
        ) -> Result<()> {
            match command {
                "add" => {
                    self.0 += 1;
                    Ok(())
                }
                _ => Err(Error::config(format!("unknown command `{command}`"))),
            }
        }
    }

    #[test]
    fn delayed_commands_are_returned_on_insert() {
        let mut registry = ModuleRegistry::new();
        registry.delay("counter", "add", vec![]);
        registry.delay("other", "add", vec![]);
        let delayed = registry.insert("counter", Box::new(Counter(0)));
        assert_eq!(delayed, vec![("add".to_string(), vec![])]);
        assert!(registry.contains("counter"));
        assert!(!registry.contains("other"));
        assert!(registry.insert("other", Box::new(Counter(0))).len() == 1);
    }

    #[test]
    fn aliases_share_a_module() {
        let mut registry = ModuleRegistry::new();
        registry.insert("graphicx", Box::new(Counter(0)));
        assert!(registry.contains("epsfig"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["graphics"]);
    }

    #[test]
    fn errors_are_attributed() {
        assert_eq!(
            attribute("bibtex", Error::config("unknown command `x`")).to_string(),
            "bibtex: unknown command `x`"
        );
        assert_eq!(
            attribute(
                "bibtex",
                Error::Tool {
                    program: "bibtex".to_string(),
                    status: Some(2)
                }
            )
            .to_string(),
            "bibtex: `bibtex` failed with exit status 2"
        );
    }
}
