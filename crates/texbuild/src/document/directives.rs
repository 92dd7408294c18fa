//! Directives: build instructions given on the command line or in `% texbuild:` comments.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use texbuild_stdext::algorithms::spellcheck;
use texscan::cmdline;
use texscan::keyval::parse_keyval;
use texscan::variable::Value;

use super::{Document, OnChange};
use crate::digest::Digest;
use crate::environment::Environment;
use crate::rules::Constraints;
use crate::{Error, Result};

const DIRECTIVES: &[&str] = &[
    "alias", "clean", "depend", "make", "module", "onchange", "paper", "path", "read", "rules",
    "set", "setlist", "watch",
];

fn expect_args(name: &str, args: &[String], min: usize) -> Result<()> {
    if args.len() < min {
        return Err(Error::config(format!(
            "directive `{name}` expects at least {min} argument{}",
            if min == 1 { "" } else { "s" }
        )));
    }
    Ok(())
}

impl Document {
    /// Splits a directive line, expanding variables, and runs it.
    pub fn run_directive(&mut self, env: &mut Environment, line: &str) -> Result<()> {
        let words = cmdline::split(line, &env.vars);
        match words.split_first() {
            Some((name, args)) => self.command(env, name, args),
            None => Ok(()),
        }
    }

    /// Runs a directive.
    ///
    /// A name of the form `module.command` is a command for a module.
    /// Unknown directives are reported and ignored.
    pub fn command(&mut self, env: &mut Environment, name: &str, args: &[String]) -> Result<()> {
        if let Some((module, command)) = name.split_once('.') {
            return self.module_command(env, module, command, args);
        }
        match name {
            "alias" => {
                expect_args(name, args, 2)?;
                let hook = self.state.hook(&args[1]).cloned().ok_or_else(|| {
                    Error::config(format!("cannot alias \\{}, which is not hooked", args[1]))
                })?;
                self.state.add_hook(&args[0], &hook.format, hook.handler)
            }
            "clean" => {
                for file in args {
                    self.state.clean_file(PathBuf::from(file));
                }
                Ok(())
            }
            "depend" => {
                for file in args {
                    self.depend(env, file);
                }
                Ok(())
            }
            "make" => {
                expect_args(name, args, 1)?;
                let constraints = parse_make_options(&args[1..])?;
                env.set_constraints(Path::new(&args[0]), constraints);
                Ok(())
            }
            "module" => {
                expect_args(name, args, 1)?;
                let options = parse_keyval(&args[1..].join(","));
                if self.register_module(env, &args[0], &options)? {
                    Ok(())
                } else {
                    Err(Error::config(format!("there is no module `{}`", args[0])))
                }
            }
            "onchange" => {
                expect_args(name, args, 2)?;
                let file = PathBuf::from(&args[0]);
                self.state.onchange.push(OnChange {
                    digest: Digest::of_file(&file),
                    file,
                    command: args[1..].join(" "),
                });
                Ok(())
            }
            "paper" => {
                env.set_var("paper", args.join(" "));
                Ok(())
            }
            "path" => {
                for dir in args {
                    env.add_search_path(PathBuf::from(dir));
                }
                Ok(())
            }
            "read" => {
                for file in args {
                    self.read_directives(env, Path::new(file))?;
                }
                Ok(())
            }
            "rules" => {
                for file in args {
                    env.rules.load_file(Path::new(file))?;
                }
                Ok(())
            }
            "set" => {
                expect_args(name, args, 2)?;
                set_variable(env, &args[0], Value::from(args[1..].join(" ")))
            }
            "setlist" => {
                expect_args(name, args, 1)?;
                set_variable(env, &args[0], Value::from(args[1..].to_vec()))
            }
            "watch" => {
                for file in args {
                    self.state.watch(Path::new(file));
                }
                Ok(())
            }
            _ => {
                match spellcheck::closest_word(DIRECTIVES.iter().copied(), name) {
                    Some(suggestion) => tracing::warn!(
                        "unknown directive `{name}`; did you mean `{suggestion}`?"
                    ),
                    None => tracing::warn!("unknown directive `{name}`"),
                }
                Ok(())
            }
        }
    }

    fn depend(&mut self, env: &mut Environment, file: &str) {
        let path = PathBuf::from(file);
        if path.is_file() || env.convert(&path, None).ok().flatten().is_some() {
            self.state.add_source(env, &path);
        } else {
            tracing::warn!("cannot find the dependency {file}");
        }
    }

    /// Runs the directives of a file, one per line. Lines starting with `#` are comments.
    fn read_directives(&mut self, env: &mut Environment, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Err(err) = self.run_directive(env, line) {
                if matches!(err, Error::Interrupted) {
                    return Err(err);
                }
                tracing::warn!("{}:{}: {}", path.display(), i + 1, err);
            }
        }
        Ok(())
    }
}

fn set_variable(env: &mut Environment, name: &str, value: Value) -> Result<()> {
    if env.vars.set(name, value).is_ok() {
        return Ok(());
    }
    let names = env.vars.names();
    match spellcheck::closest_word(names.iter().copied(), name) {
        Some(suggestion) => tracing::warn!(
            "unknown variable `{name}`; did you mean `{suggestion}`?"
        ),
        None => tracing::warn!("unknown variable `{name}`"),
    }
    Ok(())
}

/// Parses the options of `make`: `from SOURCE`, `with RULE` and `KEY=VALUE` parameters.
fn parse_make_options(args: &[String]) -> Result<Constraints> {
    let mut constraints = Constraints::default();
    let mut params = IndexMap::new();
    let mut words = args.iter();
    while let Some(word) = words.next() {
        match word.as_str() {
            "from" | "with" => {
                let value = words
                    .next()
                    .ok_or_else(|| Error::config(format!("`make`: missing value after `{word}`")))?
                    .clone();
                if word == "from" {
                    constraints.source = Some(value);
                } else {
                    constraints.rule = Some(value);
                }
            }
            other => match other.split_once('=') {
                Some((key, value)) => {
                    params.insert(key.to_string(), value.to_string());
                }
                None => {
                    return Err(Error::config(format!("`make`: unexpected argument `{other}`")))
                }
            },
        }
    }
    constraints.params = params;
    Ok(constraints)
}
