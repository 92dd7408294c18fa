//! Scanning sources for hooked macros and directives.
use std::path::{Path, PathBuf};

use texscan::cmdline;
use texscan::keyval::parse_keyval;
use texscan::token::lexer::Lexer;
use texscan::token::{Category, Position};
use texscan::variable::Value;

use super::{Builtin, Document, Handler};
use crate::environment::Environment;
use crate::modules::Options;
use crate::{files, Error, Result};

/// What the scanner does after a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop reading the current file, as for `\endinput`.
    EndInput,
    /// Stop reading the document, as for `\end{document}`.
    EndDocument,
}

/// A call of a hooked macro with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCall {
    pub name: String,
    pub position: Position,
    /// Whether the name was followed by a star, like `\includegraphics*`.
    pub starred: bool,
    /// One entry per character of the hook's format. Optional arguments that are absent are [None].
    pub args: Vec<Option<String>>,
}

impl HookCall {
    /// The argument at the given index, or the empty string if it is absent.
    pub fn arg(&self, index: usize) -> &str {
        self.optional(index).unwrap_or("")
    }

    pub fn optional(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(|arg| arg.as_deref())
    }
}

pub(super) fn is_valid_format(format: &str) -> bool {
    format.chars().all(|c| c == 'o' || c == 'a')
}

fn read_args(lexer: &mut Lexer, format: &str) -> Vec<Option<String>> {
    format
        .chars()
        .map(|c| match c {
            'o' => lexer.get_latex_optional_text(),
            _ => Some(lexer.get_argument_text()),
        })
        .collect()
}

/// Splits a comma separated list of names.
pub(crate) fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl Document {
    /// Scans a file unless it was already scanned.
    pub(super) fn process_file(&mut self, env: &mut Environment, path: &Path) -> Result<Flow> {
        if !self.state.processed.insert(files::absolute(path)) {
            tracing::debug!("{} was already scanned", files::display(path));
            return Ok(Flow::Continue);
        }
        let mut lexer = Lexer::from_file(path).map_err(|err| Error::io(path, err))?;
        tracing::debug!("scanning {}", files::display(path));
        let mut env = env.scope([
            ("file", Value::from(path.display().to_string())),
            ("line", Value::Int(0)),
        ]);
        match self.scan(&mut env, &mut lexer)? {
            Flow::EndInput => Ok(Flow::Continue),
            flow => Ok(flow),
        }
    }

    fn scan(&mut self, env: &mut Environment, lexer: &mut Lexer) -> Result<Flow> {
        let mut generation = None;
        loop {
            if generation != Some(self.state.hooks_generation) {
                // Environment hooks are dispatched by the `begin` hook.
                lexer.set_hooks(self.state.hooks.keys().filter(|name| !name.contains('{')));
                generation = Some(self.state.hooks_generation);
            }
            let token = lexer.next_hook();
            let position = token.position().clone();
            env.vars.define("line", Value::Int(position.line as i64));
            match token.category() {
                Category::EndOfFile => return Ok(Flow::Continue),
                Category::Comment => {
                    let text = token.value().unwrap_or_default().to_string();
                    self.source_directive(env, &text, &position);
                }
                Category::ControlSequence => {
                    let name = token.value().unwrap_or_default().to_string();
                    let hook = match self.state.hooks.get(&name) {
                        Some(hook) => hook.clone(),
                        None => continue,
                    };
                    let starred = lexer.peek().is_char('*');
                    if starred {
                        lexer.next_token();
                    }
                    let call = HookCall {
                        args: read_args(lexer, &hook.format),
                        name,
                        position,
                        starred,
                    };
                    match self.dispatch(env, lexer, &hook.handler, &call) {
                        Ok(Flow::Continue) => {}
                        Ok(flow) => return Ok(flow),
                        Err(Error::Interrupted) => return Err(Error::Interrupted),
                        Err(err) => tracing::warn!("{}: {}", call.position, err),
                    }
                }
                _ => {}
            }
        }
    }

    fn source_directive(&mut self, env: &mut Environment, text: &str, position: &Position) {
        let words = cmdline::split(text, &env.vars);
        if let Some((name, args)) = words.split_first() {
            if let Err(err) = self.command(env, name, args) {
                tracing::warn!("{position}: {err}");
            }
        }
    }

    fn dispatch(
        &mut self,
        env: &mut Environment,
        lexer: &mut Lexer,
        handler: &Handler,
        call: &HookCall,
    ) -> Result<Flow> {
        match handler {
            Handler::Builtin(builtin) => self.builtin(env, lexer, builtin, call),
            Handler::Module(module) => {
                self.call_module(env, module, call)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn call_module(&mut self, env: &mut Environment, module: &str, call: &HookCall) -> Result<()> {
        if let Some(m) = self.modules.get_mut(module) {
            m.hook(&mut self.state, env, call)?;
        }
        self.load_requested_modules(env)
    }

    fn builtin(
        &mut self,
        env: &mut Environment,
        lexer: &mut Lexer,
        builtin: &Builtin,
        call: &HookCall,
    ) -> Result<Flow> {
        match builtin {
            Builtin::Input => {
                lexer.skip_space();
                let name = if lexer.peek().category() == Category::BeginGroup {
                    lexer.get_argument_text()
                } else {
                    lexer.get_word_text()
                };
                self.input_file(env, name.trim(), false)
            }
            Builtin::Include => self.input_file(env, call.arg(0).trim(), true),
            Builtin::IncludeOnly => {
                if !self.state.include_only_forced {
                    self.state.include_only = Some(split_names(call.arg(0)));
                }
                Ok(Flow::Continue)
            }
            Builtin::Begin => {
                let name = call.arg(0).trim().to_string();
                let hook_name = format!("begin{{{name}}}");
                if let Some(hook) = self.state.hooks.get(&hook_name).cloned() {
                    let inner = HookCall {
                        args: read_args(lexer, &hook.format),
                        name: hook_name,
                        position: call.position.clone(),
                        starred: false,
                    };
                    return self.dispatch(env, lexer, &hook.handler, &inner);
                }
                if self.state.verbatim_envs.contains(&name)
                    && !lexer.skip_until(&format!("\\end{{{name}}}"))
                {
                    tracing::warn!("{}: unterminated environment {name}", call.position);
                }
                Ok(Flow::Continue)
            }
            Builtin::End => Ok(if call.arg(0).trim() == "document" {
                Flow::EndDocument
            } else {
                Flow::Continue
            }),
            Builtin::EndInput => Ok(Flow::EndInput),
            Builtin::Package | Builtin::Class => {
                let suffix = if *builtin == Builtin::Class { ".cls" } else { ".sty" };
                let options: Options = parse_keyval(call.optional(0).unwrap_or(""));
                for name in split_names(call.arg(1)) {
                    match env.find_file(&name, &[suffix]) {
                        Some(path) if path.is_file() => {
                            self.state.add_source(env, &path);
                            self.process_file(env, &path)?;
                        }
                        _ => {
                            if !self.register_module(env, &name, &options)? {
                                tracing::debug!("no build support for {name}");
                            }
                        }
                    }
                }
                Ok(Flow::Continue)
            }
            Builtin::Bibliography | Builtin::BibliographyStyle => {
                self.register_module(env, "bibtex", &Options::new())?;
                match self.state.hooks.get(&call.name).map(|hook| hook.handler.clone()) {
                    Some(Handler::Module(module)) => self.call_module(env, &module, call)?,
                    _ => tracing::warn!("{}: nothing handles \\{}", call.position, call.name),
                }
                Ok(Flow::Continue)
            }
            Builtin::Watch(suffix) => {
                let path = self.state.target(suffix);
                self.state.watch(&path);
                Ok(Flow::Continue)
            }
        }
    }

    fn input_file(&mut self, env: &mut Environment, name: &str, include: bool) -> Result<Flow> {
        // Arguments containing macros cannot be resolved without expansion.
        if name.is_empty() || name.contains('\\') || name.contains('#') {
            return Ok(Flow::Continue);
        }
        if include {
            if let Some(only) = &self.state.include_only {
                if !only.iter().any(|n| n == name) {
                    tracing::debug!("skipping {name}, not in the include list");
                    return Ok(Flow::Continue);
                }
            }
        }
        let path = match env.find_file(name, &[".tex", ""]) {
            Some(path) => path,
            None => {
                let (_, suffix) = files::strip_suffix(name);
                let target = if suffix.is_empty() {
                    PathBuf::from(format!("{name}.tex"))
                } else {
                    PathBuf::from(name)
                };
                if env.convert(&target, None)?.is_some() {
                    self.state.add_source(env, &target);
                } else {
                    tracing::debug!("input file {name} not found");
                }
                return Ok(Flow::Continue);
            }
        };
        if include {
            let (base, _) = files::strip_suffix(name);
            self.state.add_aux(&PathBuf::from(format!("{base}.aux")));
        }
        self.state.add_source(env, &path);
        if !path.is_file() {
            // Produced by another build step; there is nothing to scan yet.
            return Ok(Flow::Continue);
        }
        match self.process_file(env, &path)? {
            Flow::EndDocument => Ok(Flow::EndDocument),
            _ => Ok(Flow::Continue),
        }
    }
}
