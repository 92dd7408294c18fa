//! Modules that select the TeX engine.
//!
//! Loading one of these changes the typesetter program, the `engine` variable,
//!     and the suffix of the typesetter's output.
use super::{Module, Options};
use crate::document::JobState;
use crate::environment::Environment;
use crate::{Error, Result};

/// The `pdftex`, `xelatex`, `luatex`, `omega`, `etex` and `vtex` modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine;

impl Engine {
    pub fn new(name: &str, options: &Options, job: &mut JobState, env: &mut Environment) -> Result<Engine> {
        let (program, engine, suffix) = match name {
            "pdftex" => ("pdflatex", "pdfTeX", ".pdf"),
            "xelatex" => ("xelatex", "XeTeX", ".pdf"),
            "luatex" => ("lualatex", "LuaTeX", ".pdf"),
            "omega" => ("lambda", "Omega", ".dvi"),
            "etex" => ("elatex", "e-TeX", ".dvi"),
            "vtex" => ("vlatex", "VTeX", ".pdf"),
            _ => return Err(Error::config(format!("`{name}` is not a TeX engine"))),
        };
        env.set_var("program", program);
        env.set_var("engine", engine);
        job.set_primary_suffix(suffix);
        for option in options.keys() {
            match (name, option.as_str()) {
                ("pdftex", "dvi") => {
                    job.set_primary_suffix(".dvi");
                    job.add_tex_preamble("\\pdfoutput=0");
                }
                ("pdftex", "pdf") => job.add_tex_preamble("\\pdfoutput=1"),
                ("luatex", "dvi") => {
                    env.set_var("program", "dvilualatex");
                    job.set_primary_suffix(".dvi");
                }
                ("vtex", "ps") => {
                    let mut arguments = env.vars.get_list("arguments");
                    arguments.insert(0, "-ps".to_string());
                    env.set_var("arguments", arguments);
                    job.set_primary_suffix(".ps");
                }
                (_, option) => tracing::warn!("module {name} ignores the option {option}"),
            }
        }
        tracing::debug!(
            "using {} ({engine}), producing {}",
            env.vars.get_str("program"),
            job.primary_suffix()
        );
        Ok(Engine)
    }
}

impl Module for Engine {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn load(name: &str, options: &[&str]) -> (Environment, Document) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "").unwrap();
        let mut env = Environment::new();
        let mut doc = Document::new(&source, None, &mut env).unwrap();
        let options: Options = options.iter().map(|o| (o.to_string(), None)).collect();
        Engine::new(name, &options, doc.state_mut(), &mut env).unwrap();
        (env, doc)
    }

    #[test]
    fn pdftex() {
        let (env, doc) = load("pdftex", &[]);
        assert_eq!(env.vars.get_str("program"), "pdflatex");
        assert_eq!(env.vars.get_str("engine"), "pdfTeX");
        assert_eq!(doc.state().primary_suffix(), ".pdf");
    }

    #[test]
    fn pdftex_in_dvi_mode() {
        let (env, doc) = load("pdftex", &["dvi"]);
        assert_eq!(env.vars.get_str("program"), "pdflatex");
        assert_eq!(doc.state().primary_suffix(), ".dvi");
        let command_line = crate::document::CommandLine::new(&env.vars, doc.state());
        assert_eq!(command_line.preamble, vec!["\\pdfoutput=0".to_string()]);
    }

    #[test]
    fn vtex_in_ps_mode() {
        let (env, doc) = load("vtex", &["ps"]);
        assert_eq!(env.vars.get_list("arguments"), vec!["-ps".to_string()]);
        assert_eq!(doc.state().primary_suffix(), ".ps");
    }

    #[test]
    fn luatex_in_dvi_mode() {
        let (env, doc) = load("luatex", &["dvi"]);
        assert_eq!(env.vars.get_str("program"), "dvilualatex");
        assert_eq!(doc.state().primary_suffix(), ".dvi");
    }
}
