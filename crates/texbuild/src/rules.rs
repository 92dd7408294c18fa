//! Conversion rules: how to produce a file that does not exist from one that does.
//!
//! A rule has a regular expression matched against the target path,
//!     a template for the source path, a cost, and the name of the converter that performs the conversion.
//! Rules are read from INI files; the default rules are built in.
//! See [crate::convert] for how a rule is chosen and applied.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use texscan::cmdline;
use texscan::variable::{Chain, Lookup};

use crate::{ini, Error, Result};

static DEFAULT_RULES: &str = include_str!("rules.ini");

/// A conversion rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pattern: String,
    target: Regex,
    pub source: String,
    pub cost: i64,
    pub converter: String,
    pub params: IndexMap<String, String>,
}

impl Rule {
    pub fn new(name: &str, mut entries: IndexMap<String, String>) -> Result<Rule> {
        let pattern = entries
            .shift_remove("target")
            .ok_or_else(|| Error::config(format!("rule `{name}` has no target")))?;
        let target = Regex::new(&format!("^(?:{pattern})")).map_err(|err| {
            Error::config(format!("rule `{name}` has an invalid target expression: {err}"))
        })?;
        let source = entries
            .shift_remove("source")
            .ok_or_else(|| Error::config(format!("rule `{name}` has no source")))?;
        let cost = entries
            .shift_remove("cost")
            .ok_or_else(|| Error::config(format!("rule `{name}` has no cost")))?;
        let cost = cost.trim().parse().map_err(|_| {
            Error::config(format!("rule `{name}` has an invalid cost `{cost}`"))
        })?;
        let converter = entries
            .shift_remove("rule")
            .ok_or_else(|| Error::config(format!("rule `{name}` names no converter")))?;
        Ok(Rule {
            name: name.to_string(),
            pattern,
            target,
            source,
            cost,
            converter,
            params: entries,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Source path templates for a target, with group references substituted,
    ///     or [None] if the rule does not apply to the target.
    fn source_template(&self, target: &str) -> Option<String> {
        let captures = self.target.captures(target)?;
        let mut result = String::new();
        let mut chars = self.source.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, chars.peek().and_then(|d| d.to_digit(10))) {
                ('\\', Some(group)) => {
                    chars.next();
                    if let Some(m) = captures.get(group as usize) {
                        result.push_str(m.as_str());
                    }
                }
                (c, _) => result.push(c),
            }
        }
        Some(result)
    }
}

/// Restrictions on the conversion of one target, set with the `make` directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    /// Only this source may be used.
    pub source: Option<String>,
    /// Only the rule with this name may be used.
    pub rule: Option<String>,
    /// Extra parameters for the converter. Parameters of the rule take precedence.
    pub params: IndexMap<String, String>,
}

/// A rule applied to a concrete target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInstance {
    pub rule: String,
    pub converter: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub cost: i64,
    pub params: IndexMap<String, String>,
}

impl RuleInstance {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl Lookup for RuleInstance {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "source" => Some(self.source.display().to_string()),
            "target" => Some(self.target.display().to_string()),
            "cost" => Some(self.cost.to_string()),
            "rule" => Some(self.rule.clone()),
            "base" => {
                let target = self.target.display().to_string();
                Some(crate::files::strip_suffix(&target).0.to_string())
            }
            _ => self.params.get(name).cloned(),
        }
    }
}

/// The conversion rules known to a build, in order of definition.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: IndexMap<String, Rule>,
}

impl RuleRegistry {
    pub fn new() -> RuleRegistry {
        Default::default()
    }

    /// A registry with the built-in rules.
    pub fn with_defaults() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        if let Err(err) = registry.load_str(DEFAULT_RULES, "built-in rules") {
            tracing::error!("{err}");
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Adds a rule, replacing any rule with the same name.
    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.name.clone(), rule);
    }

    /// Loads rules from INI text and returns how many were loaded.
    ///
    /// Invalid rules are skipped with a warning; only a malformed file is an error.
    pub fn load_str(&mut self, text: &str, origin: &str) -> Result<usize> {
        let sections = ini::parse(text).map_err(|err| Error::config(format!("{origin}: {err}")))?;
        let mut count = 0;
        for section in sections {
            match Rule::new(&section.name, section.entries) {
                Ok(rule) => {
                    self.insert(rule);
                    count += 1;
                }
                Err(err) => tracing::warn!("{origin}:{}: {err}, skipping it", section.line),
            }
        }
        Ok(count)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let count = self.load_str(&text, &crate::files::display(path))?;
        tracing::debug!("loaded {count} rules from {}", crate::files::display(path));
        Ok(count)
    }

    /// All ways of producing the target from an available source, cheapest first.
    ///
    /// A source is a candidate if it differs from the target and `available` accepts it.
    /// Among rules of equal cost the one defined first comes first.
    pub fn candidates(
        &self,
        target: &str,
        vars: &dyn Lookup,
        constraints: &Constraints,
        available: &dyn Fn(&str) -> bool,
    ) -> Vec<RuleInstance> {
        let mut result = Vec::new();
        for rule in self.rules.values() {
            if constraints.rule.as_ref().map_or(false, |r| r != &rule.name) {
                continue;
            }
            let template = match rule.source_template(target) {
                Some(template) => template,
                None => continue,
            };
            let mut params = constraints.params.clone();
            params.extend(rule.params.iter().map(|(k, v)| (k.clone(), v.clone())));
            for source in cmdline::expand_cases(&template, &Chain(&params, vars)) {
                if source == target
                    || constraints.source.as_ref().map_or(false, |s| s != &source)
                    || !available(&source)
                {
                    continue;
                }
                result.push(RuleInstance {
                    rule: rule.name.clone(),
                    converter: rule.converter.clone(),
                    source: PathBuf::from(source),
                    target: PathBuf::from(target),
                    cost: rule.cost,
                    params: params.clone(),
                });
            }
        }
        result.sort_by_key(|instance| instance.cost);
        result
    }
}
