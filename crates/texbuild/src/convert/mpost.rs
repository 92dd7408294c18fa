use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::Converter;
use crate::environment::Environment;
use crate::graph::{BuildState, NodeId};
use crate::nodes::Shell;
use crate::process::Invocation;
use crate::rules::RuleInstance;
use crate::{files, Error, Result};

static BEGINFIG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"beginfig\s*\(\s*(?P<num>[0-9]+)\s*\)").unwrap());
static INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*input\s+(?P<file>[^\s;]+)").unwrap());

/// Runs MetaPost on a `.mp` file.
///
/// One run produces a file `NAME.N` for every `beginfig(N)` of the source,
///     so all of them are products of a single node.
/// Files read with `input` are sources of that node.
pub struct MetaPost;

fn figures(source: &Path) -> Vec<String> {
    match std::fs::read_to_string(source) {
        Ok(text) => BEGINFIG
            .captures_iter(&text)
            .map(|c| c["num"].to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn inputs(source: &Path) -> Vec<PathBuf> {
    let text = match std::fs::read_to_string(source) {
        Ok(text) => text,
        Err(_) => return Vec::new(),
    };
    let dir = source.parent().unwrap_or(Path::new(""));
    INPUT
        .captures_iter(&text)
        .filter_map(|c| {
            let name = &c["file"];
            [format!("{name}.mp"), name.to_string()]
                .into_iter()
                .map(|n| dir.join(n))
                .find(|p| p.is_file())
        })
        .collect()
}

impl Converter for MetaPost {
    fn check(&self, instance: &RuleInstance, _: &Environment) -> bool {
        let target = instance.target.display().to_string();
        let (_, ext) = files::strip_suffix(&target);
        figures(&instance.source)
            .iter()
            .any(|n| ext.strip_prefix('.') == Some(n.as_str()))
    }

    fn convert(&self, instance: &RuleInstance, env: &mut Environment) -> Result<NodeId> {
        let source = instance.source.display().to_string();
        let (base, _) = files::strip_suffix(&source);
        let products: Vec<PathBuf> = figures(&instance.source)
            .iter()
            .map(|n| PathBuf::from(format!("{base}.{n}")))
            .collect();
        if products.is_empty() {
            return Err(Error::config(format!("{source} contains no figures")));
        }
        let mut sources = vec![instance.source.clone()];
        sources.extend(inputs(&instance.source));
        let dir = files::absolute(instance.source.parent().unwrap_or(Path::new("")));
        let file_name = instance
            .source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let invocation = Invocation::new(["mpost", "-interaction=batchmode", file_name.as_str()])
            .cwd(dir);
        env.graph_mut().add_node(
            products,
            sources,
            Box::new(Shell::converter(invocation, format!("running MetaPost on {source}"))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_figures_share_one_node() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("macros.mp"), "def box = enddef;\n").unwrap();
        std::fs::write(
            dir.path().join("diagrams.mp"),
            "input macros\nbeginfig(1); draw box; endfig;\nbeginfig (2); endfig;\nend\n",
        )
        .unwrap();
        let mut env = Environment::new();
        let first = env
            .convert(&dir.path().join("diagrams.1"), None)
            .unwrap()
            .unwrap();
        let second = env
            .convert(&dir.path().join("diagrams.2"), None)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            env.graph().node(first).sources(),
            &[dir.path().join("diagrams.mp"), dir.path().join("macros.mp")]
        );
    }

    #[test]
    fn missing_figure_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("diagrams.mp"), "beginfig(1); endfig;\n").unwrap();
        let env = Environment::new();
        assert!(env.best_rule(&dir.path().join("diagrams.3"), None).is_none());
    }
}
