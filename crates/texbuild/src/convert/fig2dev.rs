use std::path::PathBuf;

use super::Converter;
use crate::environment::Environment;
use crate::graph::{BuildState, NodeId};
use crate::nodes::Shell;
use crate::process::Invocation;
use crate::rules::RuleInstance;
use crate::{files, Error, Result};

/// Exports XFig drawings with `fig2dev`.
///
/// The output language follows from the target's extension.
/// The `pstex_t` and `pdftex_t` targets are TeX files that include an image part,
///     `.pstex` and `.pdftex` respectively, which is converted as a separate target.
pub struct Fig2Dev;

fn language(target: &str) -> Option<&'static str> {
    let (_, ext) = files::strip_suffix(target);
    Some(match ext {
        ".eps" => "eps",
        ".pdf" => "pdf",
        ".png" => "png",
        ".pstex" => "pstex",
        ".pdftex" => "pdftex",
        ".pstex_t" => "pstex_t",
        ".pdftex_t" => "pdftex_t",
        _ => return None,
    })
}

impl Converter for Fig2Dev {
    fn check(&self, instance: &RuleInstance, _: &Environment) -> bool {
        language(&instance.target.display().to_string()).is_some()
    }

    fn convert(&self, instance: &RuleInstance, env: &mut Environment) -> Result<NodeId> {
        let target = instance.target.display().to_string();
        let source = instance.source.display().to_string();
        let language = language(&target)
            .ok_or_else(|| Error::config(format!("fig2dev cannot produce `{target}`")))?;
        let mut argv = vec!["fig2dev".to_string(), "-L".to_string(), language.to_string()];
        let mut sources = vec![instance.source.clone()];
        let image_suffix = match language {
            "pstex_t" => Some(".pstex"),
            "pdftex_t" => Some(".pdftex"),
            _ => None,
        };
        if let Some(suffix) = image_suffix {
            let image = files::with_suffix(&target, suffix);
            if env.convert(&PathBuf::from(&image), None)?.is_none() {
                tracing::warn!("cannot produce the image part {image} of {target}");
            }
            argv.push("-p".to_string());
            argv.push(image.clone());
            sources.push(PathBuf::from(image));
        }
        argv.push(source.clone());
        argv.push(target.clone());
        env.graph_mut().add_node(
            vec![instance.target.clone()],
            sources,
            Box::new(Shell::converter(
                Invocation::new(argv),
                format!("converting {source} into {target}"),
            )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_figure_depends_on_image_part() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plot.fig"), "#FIG 3.2\n").unwrap();
        let mut env = Environment::new();
        let id = env
            .convert(&dir.path().join("plot.pdftex_t"), None)
            .unwrap()
            .unwrap();
        let image = dir.path().join("plot.pdftex");
        assert_eq!(
            env.graph().node(id).sources(),
            &[dir.path().join("plot.fig"), image.clone()]
        );
        let image_node = env.graph().lookup(&image).unwrap();
        assert!(!env.graph().node(image_node).is_leaf());
    }
}
