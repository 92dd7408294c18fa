//! Figures included with the `graphics`, `graphicx` and `epsfig` packages.
//!
//! For each `\includegraphics` the module looks for a file the output driver can read,
//!     trying the search prefixes from `\graphicspath` and the suffixes the driver supports.
//! A candidate that some conversion rule can make, like `fig.pdf` from `fig.eps`,
//!     becomes a build step; otherwise the first candidate that exists is used.
use std::path::PathBuf;

use texscan::keyval::parse_keyval;

use super::{Module, Options};
use crate::document::{HookCall, JobState};
use crate::environment::Environment;
use crate::rules::RuleInstance;
use crate::Result;

/// Suffixes of the files each driver can include, in order of preference.
const DRIVER_SUFFIXES: &[(&str, &[&str])] = &[
    ("dvipdf", &["", ".eps", ".ps"]),
    ("dvipdfm", &[".jpg", ".jpeg", ".pdf", ".png"]),
    ("dvips", &[".eps", ".ps"]),
    ("dvipsone", &[".eps", ".ps", ".pcx", ".bmp"]),
    ("dviwin", &["", ".eps", ".ps", ".wmf", ".tif"]),
    ("emtex", &[".eps", ".ps", ".pcx", ".bmp"]),
    ("pctex32", &[".eps", ".ps", ".wmf", ".bmp"]),
    ("pctexps", &[".eps", ".ps"]),
    ("pdftex", &["", ".png", ".pdf", ".jpg", ".mps", ".tif"]),
    ("tcidvi", &[""]),
    ("textures", &["", ".ps", ".eps", ".pict"]),
    ("vtexpdf", &["", ".gif", ".png", ".pdf", ".mps", ".jpg", ".jpeg", ".jpe"]),
    ("xetex", &["", ".pdf", ".png", ".jpg", ".jpeg", ".eps", ".ps"]),
];

fn driver_suffixes(driver: &str) -> Option<Vec<String>> {
    DRIVER_SUFFIXES
        .iter()
        .find(|(name, _)| *name == driver)
        .map(|(_, suffixes)| suffixes.iter().map(|s| s.to_string()).collect())
}

/// Guesses the driver from the engine and the typesetter's output format.
fn default_driver(engine: &str, primary_suffix: &str, dvipdfm: bool) -> &'static str {
    match (engine, primary_suffix) {
        ("VTeX", _) => "vtexpdf",
        ("XeTeX", _) => "xetex",
        (_, ".pdf") => "pdftex",
        _ if dvipdfm => "dvipdfm",
        _ => "dvips",
    }
}

pub struct Graphics {
    /// A driver given as a package option.
    driver: Option<String>,
    /// Suffixes from `\DeclareGraphicsExtensions`.
    declared_suffixes: Option<Vec<String>>,
    prefixes: Vec<String>,
}

impl Graphics {
    pub fn new(options: &Options, _: &mut JobState, _: &mut Environment) -> Graphics {
        let driver = options
            .keys()
            .find(|key| driver_suffixes(key).is_some())
            .cloned();
        Graphics {
            driver,
            declared_suffixes: None,
            prefixes: vec![String::new()],
        }
    }

    /// The suffixes to try for figures without an explicit extension.
    pub fn suffixes(&self, job: &JobState, env: &Environment) -> Vec<String> {
        if let Some(suffixes) = &self.declared_suffixes {
            return suffixes.clone();
        }
        let configured = env.vars.get_list("graphics_suffixes");
        if !configured.is_empty() {
            return configured;
        }
        let driver = match &self.driver {
            Some(driver) => driver.as_str(),
            None => default_driver(
                &env.vars.get_str("engine"),
                job.primary_suffix(),
                job.has_module("dvipdfm"),
            ),
        };
        driver_suffixes(driver).unwrap_or_default()
    }

    fn include(&self, job: &mut JobState, env: &mut Environment, options: Option<&str>, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || name.contains('\\') || name.contains('#') {
            return Ok(());
        }
        let mut name = name.to_string();
        let suffixes = self.suffixes(job, env);
        let mut allowed = suffixes.clone();
        let options = parse_keyval(options.unwrap_or(""));
        if let Some(ext) = options.get("ext") {
            allowed = vec![String::new()];
            if let Some(ext) = ext {
                name.push_str(ext);
            }
        }
        if suffixes.iter().any(|s| !s.is_empty() && name.ends_with(s.as_str())) {
            allowed = vec![String::new()];
        }
        // Files that a rule can make are kept up to date, others are used as they are.
        let check: &dyn Fn(&RuleInstance) -> bool = &|instance| {
            let source = instance.source.display().to_string();
            suffixes == [""] || !allowed.iter().any(|s| !s.is_empty() && source.ends_with(s.as_str()))
        };
        let has_suffix = !crate::files::strip_suffix(&name).1.is_empty();
        for prefix in &self.prefixes {
            for suffix in &allowed {
                let candidate = PathBuf::from(format!("{prefix}{name}{suffix}"));
                let convertible = has_suffix || !suffix.is_empty();
                if (convertible && env.convert(&candidate, Some(check))?.is_some())
                    || candidate.is_file()
                {
                    job.add_source(env, &candidate);
                    return Ok(());
                }
            }
        }
        tracing::warn!("cannot find the figure {name}");
        Ok(())
    }
}

/// Reads a list of braced groups, like the argument of `\graphicspath`.
fn braced_list(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0_usize;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '{' => {
                if depth > 0 {
                    current.push(c);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    items.push(std::mem::take(&mut current));
                } else {
                    current.push(c);
                }
            }
            _ if depth > 0 => current.push(c),
            _ => {}
        }
    }
    items
}

impl Module for Graphics {
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("includegraphics", "ooa"),
            ("graphicspath", "a"),
            ("DeclareGraphicsExtensions", "a"),
            ("DeclareGraphicsRule", "aaaa"),
            ("epsfig", "a"),
            ("psfig", "a"),
        ]
    }

    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        match call.name.as_str() {
            "includegraphics" => {
                // Two optional arguments are bounding box corners, one is a list of keys.
                let options = match call.optional(1) {
                    Some(_) => None,
                    None => call.optional(0),
                };
                self.include(job, env, options, call.arg(2))
            }
            "graphicspath" => {
                for prefix in braced_list(call.arg(0)) {
                    if !self.prefixes.contains(&prefix) {
                        self.prefixes.push(prefix);
                    }
                }
                Ok(())
            }
            "DeclareGraphicsExtensions" => {
                self.declared_suffixes = Some(
                    call.arg(0)
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                );
                Ok(())
            }
            "DeclareGraphicsRule" => {
                let suffix = call.arg(0).trim().to_string();
                if suffix.is_empty() || suffix == "*" {
                    return Ok(());
                }
                let mut suffixes = self.suffixes(job, env);
                if !suffixes.contains(&suffix) {
                    suffixes.push(suffix);
                }
                self.declared_suffixes = Some(suffixes);
                Ok(())
            }
            "epsfig" | "psfig" => {
                let options = parse_keyval(call.arg(0));
                let file = options
                    .get("file")
                    .or_else(|| options.get("figure"))
                    .cloned()
                    .flatten();
                match file {
                    Some(file) => self.include(job, env, None, &file),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn command(
        &mut self,
        job: &mut JobState,
        env: &mut Environment,
        command: &str,
        args: &[String],
    ) -> Result<()> {
        match command {
            "path" => {
                for arg in args {
                    let mut prefix = arg.clone();
                    if !prefix.ends_with('/') {
                        prefix.push('/');
                    }
                    self.prefixes.push(prefix);
                }
                Ok(())
            }
            "suffixes" => {
                self.declared_suffixes = Some(args.to_vec());
                Ok(())
            }
            "known_suffixes" => {
                let mut suffixes = self.suffixes(job, env);
                for suffix in args {
                    if !suffixes.contains(suffix) {
                        suffixes.push(suffix.clone());
                    }
                }
                self.declared_suffixes = Some(suffixes);
                Ok(())
            }
            _ => Err(crate::Error::config(format!("unknown command `{command}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_drivers() {
        assert_eq!(default_driver("pdfTeX", ".pdf", false), "pdftex");
        assert_eq!(default_driver("TeX", ".dvi", false), "dvips");
        assert_eq!(default_driver("TeX", ".dvi", true), "dvipdfm");
        assert_eq!(default_driver("VTeX", ".ps", false), "vtexpdf");
        assert_eq!(default_driver("XeTeX", ".pdf", false), "xetex");
    }

    #[test]
    fn graphics_path() {
        assert_eq!(
            braced_list("{figures/}{ {nested}/}"),
            vec!["figures/".to_string(), " {nested}/".to_string()]
        );
        assert_eq!(braced_list(""), Vec::<String>::new());
    }

    #[test]
    fn suffix_commands() {
        let mut env = Environment::new();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "").unwrap();
        let mut doc = crate::document::Document::new(&source, None, &mut env).unwrap();
        let mut graphics = Graphics::new(&Options::new(), doc.state_mut(), &mut env);
        let args = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        graphics
            .command(doc.state_mut(), &mut env, "suffixes", &args(&[".eps"]))
            .unwrap();
        graphics
            .command(doc.state_mut(), &mut env, "known_suffixes", &args(&[".ps", ".eps"]))
            .unwrap();
        assert_eq!(graphics.suffixes(doc.state(), &env), vec![".eps", ".ps"]);
        assert!(graphics
            .command(doc.state_mut(), &mut env, "resize", &[])
            .is_err());
    }

    #[test]
    fn driver_option() {
        let mut options = Options::new();
        options.insert("draft".to_string(), None);
        options.insert("dvipdfm".to_string(), None);
        let mut env = Environment::new();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "").unwrap();
        let mut doc = crate::document::Document::new(&source, None, &mut env).unwrap();
        let graphics = Graphics::new(&options, doc.state_mut(), &mut env);
        assert_eq!(graphics.driver.as_deref(), Some("dvipdfm"));
        assert_eq!(
            graphics.suffixes(doc.state(), &env),
            vec![".jpg", ".jpeg", ".pdf", ".png"]
        );
    }
}
