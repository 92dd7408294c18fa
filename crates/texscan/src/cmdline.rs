//! Shell-like splitting of directive and command lines.
//!
//! The syntax is a small subset of the POSIX shell:
//!
//! - Words are separated by unquoted whitespace.
//! - Single and double quotes protect whitespace. Quoted and unquoted parts of a word are joined,
//!     so `a"b c"d` is the single word `ab cd`.
//! - `$NAME` (letters only) and `${NAME}` expand to the value of a variable.
//!     Missing variables expand to the empty string with a warning.
//! - `$$` is a literal `$`.
//! - Inside single quotes nothing is expanded.
//!
//! Backslashes have no special meaning, so TeX code such as `\nonstopmode` passes through unchanged.
use crate::variable::Lookup;

/// Part of an argument that needs variable expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Variable(String),
}

/// One argument of a parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// An argument without variables.
    Literal(String),
    /// An argument containing variable references, to be instantiated later.
    Template(Vec<Piece>),
}

impl Arg {
    /// Expands the argument's variables.
    pub fn instantiate(&self, vars: &dyn Lookup) -> String {
        match self {
            Arg::Literal(s) => s.clone(),
            Arg::Template(pieces) => pieces
                .iter()
                .map(|piece| match piece {
                    Piece::Text(s) => s.clone(),
                    Piece::Variable(name) => lookup_or_warn(vars, name),
                })
                .collect(),
        }
    }
}

fn lookup_or_warn(vars: &dyn Lookup, name: &str) -> String {
    match vars.lookup(name) {
        Some(value) => value,
        None => {
            tracing::warn!("variable `{name}` is not defined and expands to nothing");
            String::new()
        }
    }
}

#[derive(Default)]
struct ArgBuilder {
    pieces: Vec<Piece>,
    text: String,
}

impl ArgBuilder {
    fn push_variable(&mut self, name: String) {
        if !self.text.is_empty() {
            self.pieces.push(Piece::Text(std::mem::take(&mut self.text)));
        }
        self.pieces.push(Piece::Variable(name));
    }

    fn finish(&mut self) -> Arg {
        let text = std::mem::take(&mut self.text);
        if self.pieces.is_empty() {
            return Arg::Literal(text);
        }
        let mut pieces = std::mem::take(&mut self.pieces);
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Arg::Template(pieces)
    }
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

/// Handles the text after a `$`.
fn read_dollar(chars: &mut Chars, builder: &mut ArgBuilder) {
    match chars.peek() {
        Some('$') => {
            chars.next();
            builder.text.push('$');
        }
        Some('{') => {
            chars.next();
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    builder.push_variable(name);
                    return;
                }
                name.push(c);
            }
            // Unterminated reference: keep the text as written.
            builder.text.push_str("${");
            builder.text.push_str(&name);
        }
        Some(c) if c.is_ascii_alphabetic() => {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if !c.is_ascii_alphabetic() {
                    break;
                }
                name.push(c);
                chars.next();
            }
            builder.push_variable(name);
        }
        _ => builder.text.push('$'),
    }
}

/// Parses a command line without expanding variables.
pub fn parse_line(line: &str) -> Vec<Arg> {
    let mut args = vec![];
    let mut builder = ArgBuilder::default();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    builder.text.push(c);
                }
            }
            Some(_) => match c {
                '"' => quote = None,
                '$' => read_dollar(&mut chars, &mut builder),
                c => builder.text.push(c),
            },
            None => {
                if c.is_whitespace() {
                    if in_word {
                        args.push(builder.finish());
                        in_word = false;
                    }
                    continue;
                }
                in_word = true;
                match c {
                    '\'' | '"' => quote = Some(c),
                    '$' => read_dollar(&mut chars, &mut builder),
                    c => builder.text.push(c),
                }
            }
        }
    }
    if in_word {
        args.push(builder.finish());
    }
    args
}

/// Splits a command line and expands its variables.
pub fn split(line: &str, vars: &dyn Lookup) -> Vec<String> {
    parse_line(line)
        .iter()
        .map(|arg| arg.instantiate(vars))
        .collect()
}

/// Expands the variables of a string without splitting it or interpreting quotes.
pub fn expand_variables(text: &str, vars: &dyn Lookup) -> String {
    let mut builder = ArgBuilder::default();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => read_dollar(&mut chars, &mut builder),
            c => builder.text.push(c),
        }
    }
    builder.finish().instantiate(vars)
}

/// Expands `{a,b}` alternatives, then variables.
///
/// `{a,b}x{c,d}` expands to `axc`, `axd`, `bxc`, `bxd`, in that order.
/// `${NAME}` is a variable reference, not a list of alternatives.
pub fn expand_cases(template: &str, vars: &dyn Lookup) -> Vec<String> {
    let mut results = vec![String::new()];
    let mut literal = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' if chars.peek() == Some(&'{') => {
                literal.push('$');
                for c in chars.by_ref() {
                    literal.push(c);
                    if c == '}' {
                        break;
                    }
                }
            }
            '$' if chars.peek() == Some(&'$') => {
                chars.next();
                literal.push_str("$$");
            }
            '{' => {
                let mut body = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed {
                    literal.push('{');
                    literal.push_str(&body);
                    continue;
                }
                let alternatives: Vec<&str> = body.split(',').collect();
                results = results
                    .iter()
                    .flat_map(|prefix| {
                        let prefix = format!("{prefix}{literal}");
                        alternatives.iter().map(move |alt| format!("{prefix}{alt}"))
                    })
                    .collect();
                literal.clear();
            }
            c => literal.push(c),
        }
    }
    results
        .into_iter()
        .map(|prefix| expand_variables(&format!("{prefix}{literal}"), vars))
        .collect()
}
