//! The lexer, which reads a source text and outputs tokens.
//!
//! The lexer works in two modes.
//! The first is the ordinary token-by-token mode used when parsing macro arguments:
//!     see [Lexer::next_token], [Lexer::peek] and the parsing primitives in [crate::parse].
//! The second is the *hook scan*, [Lexer::next_hook].
//! A build tool is only interested in a handful of macros (`\input`, `\usepackage`, ...)
//!     and the overwhelming majority of a document is irrelevant text.
//! After [Lexer::set_hooks] is called the lexer compiles a regular expression matching
//!     a call to any of the hooked macros and skips directly from one call to the next,
//!     line by line, without producing the tokens in between.
//! The two modes can be interleaved freely: after a hook is found, its arguments are read token by token
//!     and then the hook scan is resumed.
//!
//! Lines of the form `% texbuild: NAME ARGS` are directives to the build system.
//! The hook scan reports them as [Comment](Category::Comment) tokens whose value
//!     is the text of the directive.

use std::path::Path;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::catcode::{CatCode, CatCodeTable};
use super::{Category, Position, Token};

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*%[ \t]*texbuild:[ \t]*(?P<directive>.*?)[ \t\r]*$").unwrap()
});

/// Math mode, as tracked from math shift tokens.
///
/// The lexer never filters tokens based on the math mode; it is only exposed so that
///     callers can consult it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum MathMode {
    #[default]
    Text,
    Inline,
    Display,
}

/// The lexer.
pub struct Lexer {
    source: String,
    pos: usize,
    line: usize,
    column: usize,
    file: Option<Rc<Path>>,
    cat_codes: CatCodeTable,
    math_mode: MathMode,
    // Put back tokens; the last element is returned next.
    pending: Vec<Token>,
    hooks: Option<Regex>,
    exhausted: bool,
}

impl Lexer {
    pub fn new<S: Into<String>>(source: S) -> Lexer {
        Lexer {
            source: source.into(),
            pos: 0,
            line: 1,
            column: 1,
            file: None,
            cat_codes: Default::default(),
            math_mode: Default::default(),
            pending: Vec::new(),
            hooks: None,
            exhausted: false,
        }
    }

    /// Creates a lexer whose token positions refer to the given file.
    pub fn with_file<S: Into<String>>(source: S, file: &Path) -> Lexer {
        let mut lexer = Lexer::new(source);
        lexer.file = Some(Rc::from(file));
        lexer
    }

    /// Reads a file into a new lexer. Invalid UTF-8 sequences are replaced.
    pub fn from_file(path: &Path) -> std::io::Result<Lexer> {
        let bytes = std::fs::read(path)?;
        let source = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Lexer::with_file(source, path))
    }

    pub fn cat_codes(&self) -> &CatCodeTable {
        &self.cat_codes
    }

    pub fn cat_codes_mut(&mut self) -> &mut CatCodeTable {
        &mut self.cat_codes
    }

    pub fn math_mode(&self) -> MathMode {
        self.math_mode
    }

    pub fn file(&self) -> Option<&Rc<Path>> {
        self.file.as_ref()
    }

    /// Position of the next unread character.
    ///
    /// Put back tokens are not taken into account.
    pub fn current_position(&self) -> Position {
        Position::new(self.file.clone(), self.line, self.column)
    }

    /// Returns the next token.
    ///
    /// At the end of the input an end of file token is returned, and is returned again on every
    ///     subsequent call.
    pub fn next_token(&mut self) -> Token {
        match self.pending.pop() {
            Some(token) => token,
            None => self.read_token(),
        }
    }

    /// Returns a reference to the next token without consuming it.
    pub fn peek(&mut self) -> &Token {
        if self.pending.is_empty() {
            let token = self.read_token();
            self.pending.push(token);
        }
        // The buffer was just filled.
        &self.pending[self.pending.len() - 1]
    }

    /// Puts a token back; it is returned by the next call to [Lexer::next_token].
    pub fn put_back(&mut self, token: Token) {
        self.pending.push(token);
    }

    /// Puts a list of tokens back so that the first element of the list is returned next.
    pub fn put_list(&mut self, tokens: Vec<Token>) {
        self.pending.extend(tokens.into_iter().rev());
    }

    /// Sets the names of the control sequences the hook scan looks for.
    pub fn set_hooks<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternation: Vec<String> = names
            .into_iter()
            .map(|name| regex::escape(name.as_ref()))
            .collect();
        self.hooks = if alternation.is_empty() {
            None
        } else {
            // Text before the call may contain anything except an unescaped comment character.
            // The name must not be followed by a letter, so `\input` does not match `\inputencoding`.
            let pattern = format!(
                r"^(?:[^\\%]|\\(?:[A-Za-z]+|[^A-Za-z]))*?\\(?P<name>{})(?:(?P<space>[ \t]+)|[^A-Za-z]|$)",
                alternation.join("|")
            );
            match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    tracing::error!("failed to compile the macro hook pattern: {err}");
                    None
                }
            }
        };
    }

    /// Advances to the next call of a hooked control sequence or to the next directive line.
    ///
    /// The returned token is either a control sequence whose name is one of the hooks,
    ///     a comment whose value is the text of a directive,
    ///     or the end of file.
    /// Put back tokens are searched first; those that do not match are discarded.
    pub fn next_hook(&mut self) -> Token {
        while let Some(token) = self.pending.pop() {
            if token.category() == Category::ControlSequence {
                if let Some(name) = token.value() {
                    if self.is_hooked(name) {
                        return token;
                    }
                }
            }
        }
        loop {
            if self.pos >= self.source.len() {
                return self.read_token();
            }
            let line_end = match self.source[self.pos..].find('\n') {
                None => self.source.len(),
                Some(i) => self.pos + i,
            };
            let line = &self.source[self.pos..line_end];
            if self.column == 1 {
                if let Some(captures) = DIRECTIVE.captures(line) {
                    let position = self.current_position();
                    let directive = captures["directive"].to_string();
                    let raw = line.to_string();
                    self.advance_to(line_end);
                    return Token::new(Category::Comment, Some(directive), raw, position);
                }
            }
            let found = self.hooks.as_ref().and_then(|hooks| {
                hooks.captures(line).and_then(|captures| {
                    let name = captures.name("name")?;
                    let end = match captures.name("space") {
                        Some(space) => space.end(),
                        None => name.end(),
                    };
                    Some((name.start() - 1, end, name.as_str().to_string()))
                })
            });
            match found {
                None => {
                    let next_line = (line_end + 1).min(self.source.len());
                    self.advance_to(next_line);
                }
                Some((start, end, name)) => {
                    let base = self.pos;
                    self.advance_to(base + start);
                    let position = self.current_position();
                    let raw = self.source[base + start..base + end].to_string();
                    self.advance_to(base + end);
                    return Token::new(Category::ControlSequence, Some(name), raw, position);
                }
            }
        }
    }

    /// Skips the input up to and including the next occurrence of the marker.
    ///
    /// Put back tokens are discarded. Returns false, after skipping to the end of the input,
    ///     if the marker is not found.
    pub fn skip_until(&mut self, marker: &str) -> bool {
        self.pending.clear();
        match self.source[self.pos..].find(marker) {
            Some(i) => {
                self.advance_to(self.pos + i + marker.len());
                true
            }
            None => {
                self.advance_to(self.source.len());
                false
            }
        }
    }

    fn is_hooked(&self, name: &str) -> bool {
        match &self.hooks {
            None => false,
            Some(hooks) => hooks
                .captures(&format!("\\{name}"))
                .and_then(|captures| captures.name("name").map(|m| m.as_str() == name))
                .unwrap_or(false),
        }
    }

    fn read_token(&mut self) -> Token {
        let position = self.current_position();
        let start = self.pos;
        let c = match self.peek_char() {
            None => return Token::end_of_file(position),
            Some(c) => c,
        };
        self.advance_char(c);
        let (category, value) = match self.cat_codes.get(c) {
            CatCode::Escape => match self.peek_char() {
                None => (Category::Escape, None),
                Some(next) if self.cat_codes.get(next) == CatCode::Letter => {
                    let name_start = self.pos;
                    self.advance_while(|code| code == CatCode::Letter);
                    let name = self.source[name_start..self.pos].to_string();
                    self.advance_while(|code| code == CatCode::Space);
                    (Category::ControlSequence, Some(name))
                }
                Some(next) => {
                    self.advance_char(next);
                    (Category::ControlSequence, Some(next.to_string()))
                }
            },
            CatCode::Space => {
                self.advance_while(|code| code == CatCode::Space);
                (Category::Space, None)
            }
            CatCode::EndOfLine => {
                if c == '\r' && self.peek_char() == Some('\n') {
                    self.advance_char('\n');
                }
                (Category::EndOfLine, None)
            }
            CatCode::Comment => {
                self.advance_while(|code| code != CatCode::EndOfLine);
                let text = self.source[start + c.len_utf8()..self.pos].to_string();
                (Category::Comment, Some(text))
            }
            CatCode::MathShift => {
                let doubled = self.peek_char().map(|n| self.cat_codes.get(n)) == Some(CatCode::MathShift);
                self.math_mode = match self.math_mode {
                    MathMode::Text if doubled => {
                        self.advance_one();
                        MathMode::Display
                    }
                    MathMode::Display if doubled => {
                        self.advance_one();
                        MathMode::Text
                    }
                    MathMode::Text => MathMode::Inline,
                    MathMode::Inline => MathMode::Text,
                    MathMode::Display => MathMode::Display,
                };
                (Category::MathShift, Some(c.to_string()))
            }
            code => (Category::from(code), Some(c.to_string())),
        };
        let raw = self.source[start..self.pos].to_string();
        Token::new(category, value, raw, position)
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    #[inline]
    fn advance_char(&mut self, c: char) {
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn advance_one(&mut self) {
        if let Some(c) = self.peek_char() {
            self.advance_char(c);
        }
    }

    fn advance_while<F: Fn(CatCode) -> bool>(&mut self, predicate: F) {
        while let Some(c) = self.peek_char() {
            if !predicate(self.cat_codes.get(c)) {
                break;
            }
            self.advance_char(c);
        }
    }

    fn advance_to(&mut self, target: usize) {
        while self.pos < target {
            match self.peek_char() {
                None => break,
                Some(c) => self.advance_char(c),
            }
        }
    }
}

impl Iterator for Lexer {
    type Item = Token;

    /// Returns tokens up to and including a single end of file token.
    fn next(&mut self) -> Option<Token> {
        if self.exhausted {
            return None;
        }
        let token = self.next_token();
        if token.is_end_of_file() {
            self.exhausted = true;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::raw_text;
    use Category::*;

    fn lexer_test(input: &str, expected: Vec<(Category, Option<&str>, &str)>) {
        let lexer = Lexer::new(input);
        let actual: Vec<(Category, Option<String>, String)> = lexer
            .map(|t| (t.category(), t.value().map(String::from), t.raw().to_string()))
            .collect();
        let expected: Vec<(Category, Option<String>, String)> = expected
            .into_iter()
            .map(|(c, v, r)| (c, v.map(String::from), r.to_string()))
            .collect();
        assert_eq!(expected, actual);
    }

    macro_rules! lexer_tests {
        ($( ( $name: ident, $input: expr, $( $expected: expr, )* ), )+) => {
            $(
            #[test]
            fn $name() {
                lexer_test($input, vec![ $( $expected ),* ]);
            }
            )+
        };
    }

    lexer_tests![
        (
            control_sequence_and_group,
            r"\a{b}",
            (ControlSequence, Some("a"), r"\a"),
            (BeginGroup, Some("{"), "{"),
            (Letter, Some("b"), "b"),
            (EndGroup, Some("}"), "}"),
            (EndOfFile, None, ""),
        ),
        (
            trailing_spaces_belong_to_control_sequence,
            "\\foo  b",
            (ControlSequence, Some("foo"), "\\foo  "),
            (Letter, Some("b"), "b"),
            (EndOfFile, None, ""),
        ),
        (
            non_letter_control_sequence_keeps_spaces,
            "\\{ a",
            (ControlSequence, Some("{"), "\\{"),
            (Space, None, " "),
            (Letter, Some("a"), "a"),
            (EndOfFile, None, ""),
        ),
        (
            escape_at_end_of_input,
            "a\\",
            (Letter, Some("a"), "a"),
            (Escape, None, "\\"),
            (EndOfFile, None, ""),
        ),
        (
            space_runs_are_folded,
            "a \t b",
            (Letter, Some("a"), "a"),
            (Space, None, " \t "),
            (Letter, Some("b"), "b"),
            (EndOfFile, None, ""),
        ),
        (
            comment_runs_to_end_of_line,
            "a% note\nb",
            (Letter, Some("a"), "a"),
            (Comment, Some(" note"), "% note"),
            (EndOfLine, None, "\n"),
            (Letter, Some("b"), "b"),
            (EndOfFile, None, ""),
        ),
        (
            crlf_is_one_end_of_line,
            "a\r\nb",
            (Letter, Some("a"), "a"),
            (EndOfLine, None, "\r\n"),
            (Letter, Some("b"), "b"),
            (EndOfFile, None, ""),
        ),
        (
            display_math_is_one_token,
            "$$x$$",
            (MathShift, Some("$"), "$$"),
            (Letter, Some("x"), "x"),
            (MathShift, Some("$"), "$$"),
            (EndOfFile, None, ""),
        ),
        (
            inline_math_does_not_fold,
            "$a$$b$",
            (MathShift, Some("$"), "$"),
            (Letter, Some("a"), "a"),
            (MathShift, Some("$"), "$"),
            (MathShift, Some("$"), "$"),
            (Letter, Some("b"), "b"),
            (MathShift, Some("$"), "$"),
            (EndOfFile, None, ""),
        ),
        (
            other_categories,
            "&#^_~1\u{7f}",
            (AlignmentTab, Some("&"), "&"),
            (Parameter, Some("#"), "#"),
            (Superscript, Some("^"), "^"),
            (Subscript, Some("_"), "_"),
            (Active, Some("~"), "~"),
            (Other, Some("1"), "1"),
            (Invalid, Some("\u{7f}"), "\u{7f}"),
            (EndOfFile, None, ""),
        ),
    ];

    #[test]
    fn raw_text_round_trips() {
        let inputs = [
            "\\documentclass[a4paper]{article}\n% comment\n\\begin{document}\n",
            "$$ x^2 $$ and $y$ \\\\ \\foo   \\bar{baz}%\r\n\tend\\",
            "unicode: é λ \\é",
            "",
        ];
        for input in inputs {
            let tokens: Vec<Token> = Lexer::new(input).collect();
            assert_eq!(raw_text(&tokens), input);
        }
    }

    #[test]
    fn raw_text_round_trip_exhaustive() {
        const ALPHABET: [char; 8] = ['\\', '%', '{', '}', '$', 'a', ' ', '\n'];
        let mut input = String::new();
        for len in 0..=6_u32 {
            for mut n in 0..ALPHABET.len().pow(len) {
                input.clear();
                for _ in 0..len {
                    input.push(ALPHABET[n % ALPHABET.len()]);
                    n /= ALPHABET.len();
                }
                let tokens: Vec<Token> = Lexer::new(input.as_str()).collect();
                assert_eq!(raw_text(&tokens), input, "{input:?}");
            }
        }
    }

    #[test]
    fn end_of_file_is_yielded_once() {
        let mut lexer = Lexer::new("a");
        assert_eq!(lexer.next().map(|t| t.category()), Some(Letter));
        assert_eq!(lexer.next().map(|t| t.category()), Some(EndOfFile));
        assert_eq!(lexer.next(), None);
        assert!(lexer.next_token().is_end_of_file());
    }

    #[test]
    fn positions() {
        let mut lexer = Lexer::with_file("ab\n  \\x", Path::new("doc.tex"));
        let tokens: Vec<Token> = std::iter::from_fn(|| {
            let t = lexer.next_token();
            (!t.is_end_of_file()).then_some(t)
        })
        .collect();
        let positions: Vec<String> = tokens.iter().map(|t| t.position().to_string()).collect();
        assert_eq!(
            positions,
            vec!["doc.tex:1:1", "doc.tex:1:2", "doc.tex:1:3", "doc.tex:2:1", "doc.tex:2:3"]
        );
    }

    #[test]
    fn current_position_follows_reads() {
        let mut lexer = Lexer::with_file("ab\n\\x y", Path::new("doc.tex"));
        assert_eq!(lexer.current_position().to_string(), "doc.tex:1:1");
        lexer.next_token();
        lexer.next_token();
        lexer.next_token();
        assert_eq!(lexer.current_position().to_string(), "doc.tex:2:1");
        lexer.set_hooks(["y"]);
        let hook = lexer.next_hook();
        assert_eq!(hook.category(), EndOfFile);
        let mut lexer = Lexer::with_file("text\n  \\input{a}", Path::new("doc.tex"));
        lexer.set_hooks(["input"]);
        let hook = lexer.next_hook();
        assert!(hook.is_control_sequence("input"));
        assert_eq!(hook.position().to_string(), "doc.tex:2:3");
    }

    #[test]
    fn math_mode_is_tracked() {
        let mut lexer = Lexer::new("$$a$$ $b");
        lexer.next_token();
        assert_eq!(lexer.math_mode(), MathMode::Display);
        lexer.next_token();
        lexer.next_token();
        assert_eq!(lexer.math_mode(), MathMode::Text);
        lexer.next_token();
        lexer.next_token();
        assert_eq!(lexer.math_mode(), MathMode::Inline);
    }

    #[test]
    fn put_list_returns_head_first() {
        let mut lexer = Lexer::new("xyz");
        let a = lexer.next_token();
        let b = lexer.next_token();
        lexer.put_list(vec![a.clone(), b.clone()]);
        assert_eq!(lexer.peek(), &a);
        assert_eq!(lexer.next_token(), a);
        assert_eq!(lexer.next_token(), b);
        assert_eq!(lexer.next_token().value(), Some("z"));
    }

    fn hook_names(input: &str, hooks: &[&str]) -> Vec<(String, String)> {
        let mut lexer = Lexer::new(input);
        lexer.set_hooks(hooks);
        let mut found = vec![];
        loop {
            let token = lexer.next_hook();
            if token.is_end_of_file() {
                return found;
            }
            found.push((
                token.value().unwrap_or_default().to_string(),
                token.position().to_string(),
            ));
        }
    }

    #[test]
    fn hook_scan_finds_calls() {
        let input = "text \\input{a}\n\\inputencoding{utf8} \\include b\n";
        assert_eq!(
            hook_names(input, &["input", "include"]),
            vec![
                ("input".to_string(), "1:6".to_string()),
                ("include".to_string(), "2:22".to_string()),
            ]
        );
    }

    #[test]
    fn hook_scan_skips_comments_and_escaped_backslashes() {
        let input = "% \\input{a}\n\\% \\input{b} % \\input{c}\n\\\\input{d}\n";
        assert_eq!(
            hook_names(input, &["input"]),
            vec![("input".to_string(), "2:4".to_string())]
        );
    }

    #[test]
    fn hook_scan_at_end_of_line() {
        let input = "\\tableofcontents\n\\tableofcontentsx";
        assert_eq!(
            hook_names(input, &["tableofcontents"]),
            vec![("tableofcontents".to_string(), "1:1".to_string())]
        );
    }

    #[test]
    fn hook_scan_then_arguments() {
        let mut lexer = Lexer::new("x \\usepackage  {graphicx}\\input{b}");
        lexer.set_hooks(["usepackage", "input"]);
        let token = lexer.next_hook();
        assert_eq!(token.raw(), "\\usepackage  ");
        assert_eq!(lexer.next_token().category(), BeginGroup);
        let token = lexer.next_hook();
        assert!(token.is_control_sequence("input"));
        assert_eq!(lexer.next_token().raw(), "{");
    }

    #[test]
    fn hook_scan_uses_put_back_tokens() {
        let mut lexer = Lexer::new("\\input{a}");
        lexer.set_hooks(["input"]);
        let token = lexer.next_token();
        lexer.put_back(token);
        assert!(lexer.next_hook().is_control_sequence("input"));
    }

    #[test]
    fn hook_scan_reports_directives() {
        let mut lexer = Lexer::new("a\n  %  texbuild: module pdftex \nb");
        let token = lexer.next_hook();
        assert_eq!(token.category(), Comment);
        assert_eq!(token.value(), Some("module pdftex"));
        assert_eq!(token.position().line, 2);
        assert!(lexer.next_hook().is_end_of_file());
    }

    #[test]
    fn skip_until_marker() {
        let mut lexer = Lexer::new("\\verb \\input \\end{verbatim}after");
        assert!(lexer.skip_until("\\end{verbatim}"));
        assert_eq!(lexer.next_token().value(), Some("a"));
        assert!(!lexer.skip_until("missing"));
        assert!(lexer.next_token().is_end_of_file());
    }
}
