//! Variables that directives, command templates and conversion rules expand.
//!
//! Variables live in a [Variables] store made of nested scopes.
//! The root scope holds settings such as `program` or `engine`;
//!     each processed source file pushes a scope binding `file` and `line`.
//! Assigning a variable with [Variables::set] requires it to be defined in some scope.
use indexmap::IndexMap;
use std::collections::HashMap;
use texbuild_stdext::collections::scopedmap::ScopedMap;

/// Value of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    List(Vec<String>),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// The string form used when the variable is expanded.
    ///
    /// Lists are joined with spaces and booleans expand to `1` or the empty string.
    pub fn as_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::List(items) => items.join(" "),
            Value::Int(i) => i.to_string(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => String::new(),
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            Value::List(items) => items.clone(),
            Value::Str(s) if s.is_empty() => vec![],
            other => vec![other.as_string()],
        }
    }

    /// Whether the value counts as true: non-empty strings and lists, non-zero integers.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Int(i) => *i != 0,
            Value::Bool(b) => *b,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Error returned when assigning a variable that is not defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedVariable(pub String);

impl std::fmt::Display for UndefinedVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "variable `{}` is not defined", self.0)
    }
}

impl std::error::Error for UndefinedVariable {}

/// Anything variables can be looked up in.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl Lookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl Lookup for IndexMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A lookup in which every variable is missing.
pub struct NoVariables;

impl Lookup for NoVariables {
    fn lookup(&self, _: &str) -> Option<String> {
        None
    }
}

/// Looks a name up in the first map, then in the second.
pub struct Chain<'a>(pub &'a dyn Lookup, pub &'a dyn Lookup);

impl<'a> Lookup for Chain<'a> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.0.lookup(name).or_else(|| self.1.lookup(name))
    }
}

/// Scoped variable store.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    map: ScopedMap<String, Value>,
}

impl Variables {
    pub fn new() -> Variables {
        Default::default()
    }

    /// Defines a variable in the innermost scope.
    pub fn define<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.map.define(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    /// Returns the string form of a variable, or the empty string if it is not defined.
    pub fn get_str(&self, name: &str) -> String {
        self.get(name).map(Value::as_string).unwrap_or_default()
    }

    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.get(name).map(Value::as_list).unwrap_or_default()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Assigns a variable in the scope that defines it.
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<(), UndefinedVariable> {
        self.map
            .set(name, value.into())
            .map_err(|_| UndefinedVariable(name.to_string()))
    }

    /// Pushes a scope with the given bindings. Every push must be matched by a [pop](Variables::pop).
    pub fn push<I, V>(&mut self, bindings: I)
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<Value>,
    {
        self.map.push_scope(
            bindings
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.into())),
        );
    }

    /// Pops the innermost scope. Popping the root scope is a no-op.
    pub fn pop(&mut self) {
        if self.map.pop_scope().is_err() {
            tracing::error!("attempted to pop the root variable scope");
        }
    }

    /// Runs the closure in a new scope with the given bindings.
    pub fn with_scope<I, V, F, R>(&mut self, bindings: I, f: F) -> R
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<Value>,
        F: FnOnce(&mut Variables) -> R,
    {
        self.push(bindings);
        let result = f(self);
        self.pop();
        result
    }

    /// Names of all visible variables, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.iter().map(|(k, _)| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Lookup for Variables {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).map(Value::as_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_requires_definition() {
        let mut vars = Variables::new();
        vars.define("engine", "TeX");
        assert_eq!(vars.set("engine", "pdfTeX"), Ok(()));
        assert_eq!(vars.get_str("engine"), "pdfTeX");
        assert_eq!(
            vars.set("engin", "pdfTeX"),
            Err(UndefinedVariable("engin".to_string()))
        );
    }

    #[test]
    fn scopes_are_released() {
        let mut vars = Variables::new();
        vars.define("file", "main.tex");
        let inner = vars.with_scope([("file", "chapter.tex")], |vars| {
            vars.set("file", "other.tex").unwrap();
            vars.get_str("file")
        });
        assert_eq!(inner, "other.tex");
        assert_eq!(vars.get_str("file"), "main.tex");
    }

    #[test]
    fn value_forms() {
        let list = Value::List(vec!["-shell-escape".into(), "-8bit".into()]);
        assert_eq!(list.as_string(), "-shell-escape -8bit");
        assert_eq!(Value::from("").as_list(), Vec::<String>::new());
        assert_eq!(Value::from(true).as_string(), "1");
        assert!(!Value::from(0_i64).is_truthy());
    }

    #[test]
    fn chain_lookup() {
        let mut vars = Variables::new();
        vars.define("base", "doc");
        let mut rule = HashMap::new();
        rule.insert("target".to_string(), "fig.pdf".to_string());
        let chain = Chain(&rule, &vars);
        assert_eq!(chain.lookup("target"), Some("fig.pdf".to_string()));
        assert_eq!(chain.lookup("base"), Some("doc".to_string()));
        assert_eq!(chain.lookup("none"), None);
    }
}
