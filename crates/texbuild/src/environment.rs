//! The build environment: the dependency graph and everything shared by the nodes in it.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use texscan::variable::{Value, Variables};

use crate::convert::ConverterRegistry;
use crate::graph::{BuildState, Graph, NodeId};
use crate::rules::{Constraints, RuleInstance, RuleRegistry};
use crate::{files, Error, Result};

/// Shared state of a build.
pub struct Environment {
    graph: Graph<Environment>,
    /// The root variable scope.
    pub vars: Variables,
    pub rules: RuleRegistry,
    converters: ConverterRegistry,
    search_path: Vec<PathBuf>,
    constraints: HashMap<PathBuf, Constraints>,
    main: Option<NodeId>,
    final_node: Option<NodeId>,
}

impl BuildState for Environment {
    fn graph(&self) -> &Graph<Self> {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut Graph<Self> {
        &mut self.graph
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    /// An environment with the default variables, rules and converters.
    pub fn new() -> Environment {
        let mut vars = Variables::new();
        let empty = || Value::List(Vec::new());
        vars.define("program", "latex");
        vars.define("engine", "TeX");
        vars.define("arguments", empty());
        vars.define("src-specials", "");
        vars.define("paper", "");
        vars.define("path", empty());
        vars.define("base", "");
        vars.define("source", "");
        vars.define("target", "");
        vars.define("job", "");
        vars.define("file", "");
        vars.define("line", Value::Int(0));
        vars.define("graphics_suffixes", empty());
        let cwd = std::env::current_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        vars.define("cwd", cwd);
        Environment {
            graph: Graph::new(),
            vars,
            rules: RuleRegistry::with_defaults(),
            converters: ConverterRegistry::builtin(),
            search_path: Vec::new(),
            constraints: HashMap::new(),
            main: None,
            final_node: None,
        }
    }

    /// Directories searched for input files after the working directory.
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn add_search_path(&mut self, dir: PathBuf) {
        if self.search_path.contains(&dir) {
            return;
        }
        self.search_path.push(dir);
        let list: Vec<String> = self
            .search_path
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        self.set_var("path", list);
    }

    /// Assigns a variable that is known to exist in the root scope.
    pub fn set_var<V: Into<Value>>(&mut self, name: &str, value: V) {
        let value = value.into();
        if self.vars.set(name, value.clone()).is_err() {
            self.vars.define(name, value);
        }
    }

    /// The node of the typesetter run for the main document.
    pub fn main(&self) -> Option<NodeId> {
        self.main
    }

    pub fn set_main(&mut self, id: NodeId) {
        self.main = Some(id);
        if self.final_node.is_none() {
            self.final_node = Some(id);
        }
    }

    /// The node producing the final output, after all post-processing.
    pub fn final_node(&self) -> Option<NodeId> {
        self.final_node
    }

    pub fn set_final_node(&mut self, id: NodeId) {
        self.final_node = Some(id);
    }

    /// The path produced by the final node.
    pub fn final_product(&self) -> Option<PathBuf> {
        let id = self.final_node?;
        self.graph.node(id).products().first().cloned()
    }

    /// Looks for a file in the working directory and then in the search path.
    ///
    /// Each suffix is tried in turn; pass `""` to try the name as given.
    /// A file counts as found if it exists or if some build step produces it.
    pub fn find_file(&self, name: &str, suffixes: &[&str]) -> Option<PathBuf> {
        let name_path = Path::new(name);
        let dirs: Vec<&Path> = if name_path.is_absolute() {
            vec![Path::new("")]
        } else {
            std::iter::once(Path::new(""))
                .chain(self.search_path.iter().map(PathBuf::as_path))
                .collect()
        };
        for dir in dirs {
            for suffix in suffixes {
                let candidate = dir.join(format!("{name}{suffix}"));
                if candidate.is_file() || self.graph.is_built(&candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Sets restrictions on how a target may be produced.
    pub fn set_constraints(&mut self, target: &Path, constraints: Constraints) {
        self.constraints.insert(files::absolute(target), constraints);
    }

    /// Chooses the cheapest rule that can produce a target.
    ///
    /// A candidate must pass the optional `check` of the caller and then the check of its converter.
    pub fn best_rule(
        &self,
        target: &Path,
        check: Option<&dyn Fn(&RuleInstance) -> bool>,
    ) -> Option<RuleInstance> {
        let default = Constraints::default();
        let constraints = self
            .constraints
            .get(&files::absolute(target))
            .unwrap_or(&default);
        let available = |source: &str| {
            let path = Path::new(source);
            path.is_file() || self.graph.is_built(path)
        };
        let target = target.display().to_string();
        self.rules
            .candidates(&target, &self.vars, constraints, &available)
            .into_iter()
            .filter(|instance| check.map_or(true, |check| check(instance)))
            .find(|instance| match self.converters.get(&instance.converter) {
                Some(converter) => converter.check(instance, self),
                None => {
                    tracing::warn!(
                        "rule `{}` uses the unknown converter `{}`",
                        instance.rule,
                        instance.converter
                    );
                    false
                }
            })
    }

    /// Whether the target is produced by a build step or could be produced by a rule.
    pub fn may_produce(&self, target: &Path) -> bool {
        self.graph.is_built(target) || self.best_rule(target, None).is_some()
    }

    /// Returns the node producing a target, creating it from the best rule if needed.
    ///
    /// Returns [None] if the target cannot be produced.
    pub fn convert(
        &mut self,
        target: &Path,
        check: Option<&dyn Fn(&RuleInstance) -> bool>,
    ) -> Result<Option<NodeId>> {
        if let Some(id) = self.graph.lookup(target) {
            if !self.graph.node(id).is_leaf() {
                return Ok(Some(id));
            }
        }
        let instance = match self.best_rule(target, check) {
            Some(instance) => instance,
            None => return Ok(None),
        };
        let converter = self.converters.get(&instance.converter).ok_or_else(|| {
            Error::config(format!("unknown converter `{}`", instance.converter))
        })?;
        tracing::debug!(
            "{} will be produced from {} using rule `{}`",
            instance.target.display(),
            instance.source.display(),
            instance.rule
        );
        converter.convert(&instance, self).map(Some)
    }
}

/// An [Environment] with an extra variable scope, popped when the guard is dropped.
pub struct VarScope<'a> {
    env: &'a mut Environment,
}

impl Environment {
    /// Pushes a variable scope with the given bindings for as long as the returned guard lives.
    pub fn scope<I, V>(&mut self, bindings: I) -> VarScope<'_>
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<Value>,
    {
        self.vars.push(bindings);
        VarScope { env: self }
    }
}

impl std::ops::Deref for VarScope<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        self.env
    }
}

impl std::ops::DerefMut for VarScope<'_> {
    fn deref_mut(&mut self) -> &mut Environment {
        self.env
    }
}

impl Drop for VarScope<'_> {
    fn drop(&mut self) {
        self.env.vars.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    // Tests that depend on the working directory use absolute paths under a temporary directory.

    #[test]
    fn default_variables() {
        let env = Environment::new();
        assert_eq!(env.vars.get_str("program"), "latex");
        assert_eq!(env.vars.get_str("engine"), "TeX");
        assert_eq!(env.vars.get_list("arguments"), Vec::<String>::new());
    }

    #[test]
    fn scope_is_popped_on_every_exit() {
        fn fails(env: &mut Environment) -> Result<()> {
            let env = env.scope([("file", Value::from("chapter.tex"))]);
            assert_eq!(env.vars.get_str("file"), "chapter.tex");
            Err(Error::config("stop"))
        }
        let mut env = Environment::new();
        {
            let mut inner = env.scope([("line", Value::Int(3))]);
            inner.set_var("line", Value::Int(4));
            assert_eq!(inner.vars.get_str("line"), "4");
        }
        assert_eq!(env.vars.get_str("line"), "0");
        assert!(fails(&mut env).is_err());
        assert_eq!(env.vars.get_str("file"), "");
    }

    #[test]
    fn find_file_tries_suffixes_then_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = dir.path().join("inputs");
        std::fs::create_dir(&inputs).unwrap();
        std::fs::write(inputs.join("chapter.tex"), "").unwrap();
        let mut env = Environment::new();
        let name = dir.path().join("chapter").display().to_string();
        assert_eq!(env.find_file(&name, &[".tex", ""]), None);
        env.add_search_path(inputs.clone());
        assert_eq!(
            env.find_file("chapter", &[".tex", ""]),
            Some(inputs.join("chapter.tex"))
        );
        assert_eq!(env.vars.get_list("path"), vec![inputs.display().to_string()]);
    }

    #[test]
    fn convert_creates_a_node_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fig.eps"), "%!PS").unwrap();
        let mut env = Environment::new();
        let target = dir.path().join("fig.pdf");
        assert!(env.may_produce(&target));
        let id = env.convert(&target, None).unwrap().unwrap();
        assert_eq!(env.graph().node(id).kind(), NodeKind::Converter);
        assert_eq!(env.graph().node(id).sources(), &[dir.path().join("fig.eps")]);
        assert_eq!(env.convert(&target, None).unwrap(), Some(id));
    }

    #[test]
    fn caller_check_can_reject_rules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fig.eps"), "%!PS").unwrap();
        std::fs::write(dir.path().join("fig.ps"), "%!PS").unwrap();
        let env = Environment::new();
        let check: &dyn Fn(&RuleInstance) -> bool = &|instance| instance.rule != "eps-to-pdf";
        let instance = env
            .best_rule(&dir.path().join("fig.pdf"), Some(check))
            .unwrap();
        assert_eq!(instance.rule, "ps-to-pdf");
    }

    #[test]
    fn constraints_apply_to_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fig.eps"), "%!PS").unwrap();
        std::fs::write(dir.path().join("fig.ps"), "%!PS").unwrap();
        let mut env = Environment::new();
        let target = dir.path().join("fig.pdf");
        env.set_constraints(
            &target,
            Constraints {
                source: Some(dir.path().join("fig.ps").display().to_string()),
                ..Default::default()
            },
        );
        assert_eq!(env.best_rule(&target, None).unwrap().rule, "ps-to-pdf");
    }

    #[test]
    fn unknown_target_cannot_be_produced() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new();
        let target = dir.path().join("fig.pdf");
        assert!(!env.may_produce(&target));
        assert_eq!(env.convert(&target, None).unwrap(), None);
    }
}
