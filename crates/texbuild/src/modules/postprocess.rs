//! Post-processing of the typesetter's output: format conversion and compression.
//!
//! Each of these modules appends a node after the current final node of the graph,
//!     which becomes the new final node. They can be chained, as in `dvips` then `gzip`,
//!     as long as each one accepts the format the previous one produces.
use super::{Module, Options};
use crate::document::JobState;
use crate::environment::Environment;
use crate::graph::{Action, BuildState};
use crate::nodes::{Compressed, Compression, Shell};
use crate::process::Invocation;
use crate::{files, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Dvips,
    Dvipdfm,
    Ps2Pdf,
    Compress(Compression),
}

impl Kind {
    /// The input and output suffixes of a format conversion.
    fn conversion(&self) -> (&'static str, &'static str) {
        match self {
            Kind::Dvips => (".dvi", ".ps"),
            Kind::Dvipdfm => (".dvi", ".pdf"),
            Kind::Ps2Pdf => (".ps", ".pdf"),
            Kind::Compress(_) => ("", ""),
        }
    }
}

/// The `dvips`, `dvipdfm`, `ps2pdf`, `gzip` and `bzip2` modules.
pub struct PostProcess {
    name: String,
    kind: Kind,
    /// Extra arguments for the program.
    options: Vec<String>,
}

impl PostProcess {
    pub fn new(name: &str, options: &Options) -> Result<PostProcess> {
        let kind = match name {
            "dvips" => Kind::Dvips,
            "dvipdfm" => Kind::Dvipdfm,
            "ps2pdf" => Kind::Ps2Pdf,
            "gzip" => Kind::Compress(Compression::Gzip),
            "bzip2" => Kind::Compress(Compression::Bzip2),
            _ => return Err(Error::config(format!("`{name}` is not a post-processor"))),
        };
        let options = options
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{key}={value}"),
                None => key.clone(),
            })
            .collect();
        Ok(PostProcess {
            name: name.to_string(),
            kind,
            options,
        })
    }

    fn argv(&self, paper: &str, input: &str, output: &str) -> Vec<String> {
        let mut argv = vec![self.name.clone()];
        for size in paper.split_whitespace() {
            match self.kind {
                Kind::Dvips => argv.extend(["-t".to_string(), size.to_string()]),
                Kind::Dvipdfm => argv.extend(["-p".to_string(), size.to_string()]),
                _ => {}
            }
        }
        argv.extend(self.options.iter().cloned());
        match self.kind {
            Kind::Ps2Pdf => argv.extend([input.to_string(), output.to_string()]),
            _ => argv.extend(["-o".to_string(), output.to_string(), input.to_string()]),
        }
        argv
    }
}

impl Module for PostProcess {
    fn command(
        &mut self,
        _: &mut JobState,
        _: &mut Environment,
        command: &str,
        args: &[String],
    ) -> Result<()> {
        match command {
            "options" => {
                self.options.extend(args.iter().cloned());
                Ok(())
            }
            _ => Err(Error::config(format!("unknown command `{command}`"))),
        }
    }

    fn finalize(&mut self, _: &mut JobState, env: &mut Environment) -> Result<()> {
        let input = env
            .final_product()
            .ok_or_else(|| Error::config("there is no output to post-process"))?;
        let input_name = input.display().to_string();
        let (base, suffix) = files::strip_suffix(&input_name);
        let (output, action): (String, Box<dyn Action<Environment>>) = match self.kind {
            Kind::Compress(compression) => {
                let output = format!("{input_name}{}", compression.suffix());
                let action: Box<dyn Action<Environment>> =
                    Box::new(Compressed::new(compression, input.clone(), output.clone().into()));
                (output, action)
            }
            kind => {
                let (expected, produced) = kind.conversion();
                if suffix != expected {
                    return Err(Error::config(format!(
                        "{} needs a {} file but the output is {}",
                        self.name,
                        expected,
                        files::display(&input)
                    )));
                }
                let output = format!("{base}{produced}");
                let argv = self.argv(&env.vars.get_str("paper"), &input_name, &output);
                let message = format!("running {} on {}", self.name, files::display(&input));
                let action: Box<dyn Action<Environment>> =
                    Box::new(Shell::new(Invocation::new(argv), message));
                (output, action)
            }
        };
        let id = env
            .graph_mut()
            .add_node(vec![output.into()], vec![input], action)?;
        env.set_final_node(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(items: &[&str]) -> Options {
        items.iter().map(|item| (item.to_string(), None)).collect()
    }

    #[test]
    fn dvips_command_line() {
        let module = PostProcess::new("dvips", &options(&["-Ppdf"])).unwrap();
        assert_eq!(
            module.argv("a4 landscape", "doc.dvi", "doc.ps"),
            vec!["dvips", "-t", "a4", "-t", "landscape", "-Ppdf", "-o", "doc.ps", "doc.dvi"]
        );
    }

    #[test]
    fn dvipdfm_and_ps2pdf_command_lines() {
        let module = PostProcess::new("dvipdfm", &Options::new()).unwrap();
        assert_eq!(
            module.argv("letter", "doc.dvi", "doc.pdf"),
            vec!["dvipdfm", "-p", "letter", "-o", "doc.pdf", "doc.dvi"]
        );
        let module = PostProcess::new("ps2pdf", &Options::new()).unwrap();
        assert_eq!(
            module.argv("a4", "doc.ps", "doc.pdf"),
            vec!["ps2pdf", "doc.ps", "doc.pdf"]
        );
    }

    #[test]
    fn unknown_post_processor() {
        assert!(PostProcess::new("lpr", &Options::new()).is_err());
    }
}
