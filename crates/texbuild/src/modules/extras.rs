//! Small modules for packages that read or write extra files.
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Module, Options};
use crate::document::{HookCall, JobState};
use crate::environment::Environment;
use crate::{files, Result};

/// `beamer` keeps navigation data in `.nav` and `.snm` files and loads `hyperref`.
pub struct Beamer;

impl Beamer {
    pub fn new(job: &mut JobState) -> Beamer {
        for suffix in [".nav", ".snm"] {
            let path = job.target(suffix);
            job.watch(&path);
        }
        job.request_module("hyperref", Options::new());
        Beamer
    }
}

impl Module for Beamer {
    fn clean(&mut self, job: &mut JobState, _: &mut Environment) {
        files::remove(&job.target(".vrb"));
    }
}

/// `hyperref` writes PDF bookmarks to an `.out` file read by the next run.
pub struct Hyperref;

impl Hyperref {
    pub fn new(job: &mut JobState) -> Hyperref {
        let path = job.target(".out");
        job.watch(&path);
        Hyperref
    }
}

impl Module for Hyperref {}

static MINITOC_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:mtc|stc|ptc)[0-9]*|maf)$").unwrap());

/// `minitoc` writes one file per partial table of contents.
pub struct Minitoc;

/// Files named after the job with an extension the predicate accepts.
fn job_files<F: Fn(&str) -> bool>(job: &JobState, accept: F) -> Vec<PathBuf> {
    let base = job.target("");
    let dir = match base.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = match base.file_name() {
        Some(name) => format!("{}.", name.to_string_lossy()),
        None => return vec![],
    };
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return vec![],
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_prefix(&prefix).map_or(false, &accept)
        })
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

impl Module for Minitoc {
    fn clean(&mut self, job: &mut JobState, _: &mut Environment) {
        for path in job_files(job, |suffix| MINITOC_SUFFIX.is_match(suffix)) {
            files::remove(&path);
        }
    }
}

/// Packages with environments whose content must not be scanned,
///     and with macros that read files verbatim.
pub struct Verbatim {
    hooks: Vec<(&'static str, &'static str)>,
}

impl Verbatim {
    pub fn new(name: &str, job: &mut JobState) -> Verbatim {
        let (envs, hooks): (&[&str], Vec<(&'static str, &'static str)>) = match name {
            "verbatim" => (&["comment"], vec![("verbatiminput", "a")]),
            "moreverb" => (
                &["verbatimtab", "verbatimwrite", "listing", "listing*", "boxedverbatim"],
                vec![
                    ("verbatimtabinput", "oa"),
                    ("listinginput", "oaa"),
                    ("boxedverbatiminput", "a"),
                ],
            ),
            "fancyvrb" => (
                &["Verbatim", "BVerbatim", "LVerbatim", "SaveVerbatim", "VerbatimOut"],
                vec![
                    ("VerbatimInput", "oa"),
                    ("BVerbatimInput", "oa"),
                    ("LVerbatimInput", "oa"),
                ],
            ),
            "listings" => (&["lstlisting"], vec![("lstinputlisting", "oa")]),
            "comment" => (&["comment"], vec![("excludecomment", "a")]),
            _ => (&[], vec![]),
        };
        for env in envs {
            job.add_verbatim_env(env);
        }
        Verbatim { hooks }
    }
}

impl Module for Verbatim {
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        self.hooks.clone()
    }

    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        let arg = call.args.last().cloned().flatten().unwrap_or_default();
        let arg = arg.trim();
        if call.name == "excludecomment" {
            for name in arg.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                job.add_verbatim_env(name);
            }
            return Ok(());
        }
        match env.find_file(arg, &[""]) {
            Some(path) => job.add_source(env, &path),
            None => tracing::debug!("{}: verbatim input {arg} not found", call.position),
        }
        Ok(())
    }
}

/// `xr` and `xr-hyper`: references to other documents through their auxiliary files.
pub struct ExternalDocuments;

impl Module for ExternalDocuments {
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        vec![("externaldocument", "oa")]
    }

    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        let aux = PathBuf::from(format!("{}.aux", call.arg(1).trim()));
        if aux.is_file() {
            job.add_source(env, &aux);
        } else {
            tracing::warn!(
                "{}: {} does not exist; compile the external document first",
                call.position,
                files::display(&aux)
            );
        }
        Ok(())
    }
}

/// `pdfpages` includes pages of PDF files.
pub struct PdfPages;

impl Module for PdfPages {
    fn hooks(&self) -> Vec<(&'static str, &'static str)> {
        vec![("includepdf", "oa")]
    }

    fn hook(&mut self, job: &mut JobState, env: &mut Environment, call: &HookCall) -> Result<()> {
        let name = call.arg(1).trim();
        if name.is_empty() || name.contains('\\') {
            return Ok(());
        }
        if let Some(path) = env.find_file(name, &[".pdf", ""]) {
            job.add_source(env, &path);
            return Ok(());
        }
        let target = Path::new(name).with_extension("pdf");
        if env.convert(&target, None)?.is_some() {
            job.add_source(env, &target);
        } else {
            tracing::warn!("{}: cannot find {name}", call.position);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn minitoc_suffixes() {
        for suffix in ["mtc", "mtc12", "stc3", "ptc", "maf"] {
            assert!(MINITOC_SUFFIX.is_match(suffix), "{suffix}");
        }
        for suffix in ["aux", "mtcx", "xmtc", "maf1", "log"] {
            assert!(!MINITOC_SUFFIX.is_match(suffix), "{suffix}");
        }
    }

    #[test]
    fn minitoc_clean() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "").unwrap();
        for name in ["doc.mtc1", "doc.maf", "doc.aux", "other.mtc1"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let mut env = Environment::new();
        let jobname = dir.path().join("doc").display().to_string();
        let mut doc = Document::new(&source, Some(&jobname), &mut env).unwrap();
        Minitoc.clean(doc.state_mut(), &mut env);
        assert!(!dir.path().join("doc.mtc1").exists());
        assert!(!dir.path().join("doc.maf").exists());
        assert!(dir.path().join("doc.aux").exists());
        assert!(dir.path().join("other.mtc1").exists());
    }

    #[test]
    fn verbatim_environments() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tex");
        std::fs::write(&source, "").unwrap();
        let mut env = Environment::new();
        let mut doc = Document::new(&source, None, &mut env).unwrap();
        let module = Verbatim::new("fancyvrb", doc.state_mut());
        assert_eq!(module.hooks().len(), 3);
        assert!(doc.state().is_verbatim_env("Verbatim"));
        assert!(!doc.state().is_verbatim_env("lstlisting"));
    }
}
