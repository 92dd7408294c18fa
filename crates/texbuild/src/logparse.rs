//! Reading the typesetter's log file.
//!
//! TeX writes everything interesting about a run into its log:
//!     errors, warnings from LaTeX and packages, over- and underfull boxes,
//!     and requests to run the typesetter again.
//! The log is not designed to be machine readable.
//! Lines are hard-wrapped at 79 characters,
//!     and the file a message belongs to can only be recovered by tracking the
//!     parentheses TeX prints when it opens and closes files.
//!
//! [LogCheck] reads a log and extracts [Message]s from it.
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

static LOG_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^This is [0-9a-zA-Z-]*(TeX|Omega)").unwrap());
static RERUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:LaTeX|Package [A-Za-z-]+) Warning:.*Rerun|\([A-Za-z-]+\)\s+Rerun to get)")
        .unwrap()
});
static FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((?P<file>[^ \n\t(){}]*)|\)").unwrap());
static BAD_BOX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(Ov|Und)erfull \\[hv]box ").unwrap());
static LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:l\.(?P<line>[0-9]+)(?: (?P<code>.*))?$|<\*>)").unwrap());
static CSEQ: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*(?P<seq>(?:\\|\.\.\.)[^ ]*) ?$").unwrap());
static MACRO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?P<macro>\\.*) ->").unwrap());
static PAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(?P<num>[0-9]+)\]").unwrap());
static AT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?: detected| in paragraph)? at lines? (?P<line>[0-9]*)(?:--(?P<last>[0-9]*))?")
        .unwrap()
});
static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^LaTeX Warning: Reference `(?P<ref>.*)' on page (?P<page>[0-9]*) undefined on input line (?P<line>[0-9]*)\.$")
        .unwrap()
});
static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^LaTeX Warning: (?P<text>Label .*)$").unwrap());
static WARNING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:LaTeX|Package)(?: (?P<pkg>.*))? Warning: (?P<text>.*)$").unwrap()
});
static ON_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:; reported)? on input line (?P<line>[0-9]*)").unwrap());
static IGNORED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"; all text was ignored after line (?P<line>[0-9]*)\.$").unwrap());

/// Width at which TeX wraps log lines.
const LOG_LINE_WIDTH: usize = 79;

/// The kind of a [Message].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Error,
    Warning,
    /// An over- or underfull box.
    BadBox,
    /// A fatal error that stopped the run.
    Abort,
}

/// A diagnostic extracted from a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub text: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub last: Option<u32>,
    pub page: Option<u32>,
    /// The package or tool that reported the message.
    pub pkg: Option<String>,
    /// The macro being expanded when an error occurred.
    pub macro_name: Option<String>,
    /// The source code at which an error occurred.
    pub code: Option<String>,
    /// The cross reference a warning is about.
    pub reference: Option<String>,
    /// For an abort, the reason given by TeX.
    pub why: Option<String>,
}

impl Message {
    pub fn new<S: Into<String>>(kind: Kind, text: S) -> Message {
        Message {
            kind,
            text: text.into(),
            file: None,
            line: None,
            last: None,
            page: None,
            pkg: None,
            macro_name: None,
            code: None,
            reference: None,
            why: None,
        }
    }

    /// The position of the message, in the form `file:line-last:` with the known parts only.
    pub fn position(&self) -> String {
        let mut s = String::new();
        if let Some(file) = &self.file {
            s.push_str(file);
        }
        if let Some(line) = self.line {
            s.push_str(&format!(":{line}"));
            if let Some(last) = self.last {
                if last != line {
                    s.push_str(&format!("-{last}"));
                }
            }
        } else if let Some(page) = self.page {
            s.push_str(&format!(":(page {page})"));
        }
        s
    }
}

/// Which kinds of messages [LogCheck::parse] extracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Select {
    pub errors: bool,
    pub boxes: bool,
    /// Warnings about undefined or multiply defined references.
    pub refs: bool,
    /// All other warnings.
    pub warnings: bool,
}

impl Select {
    pub const ERRORS: Select = Select {
        errors: true,
        boxes: false,
        refs: false,
        warnings: false,
    };
    pub const BOXES: Select = Select {
        errors: false,
        boxes: true,
        refs: false,
        warnings: false,
    };
    pub const REFS: Select = Select {
        errors: false,
        boxes: false,
        refs: true,
        warnings: false,
    };
    pub const WARNINGS: Select = Select {
        errors: false,
        boxes: false,
        refs: false,
        warnings: true,
    };
    pub const ALL: Select = Select {
        errors: true,
        boxes: true,
        refs: true,
        warnings: true,
    };
}

/// The content of a typesetter log.
#[derive(Debug, Clone, Default)]
pub struct LogCheck {
    lines: Option<Vec<String>>,
}

impl LogCheck {
    pub fn new() -> LogCheck {
        Default::default()
    }

    /// Reads a log file.
    ///
    /// Fails if the file cannot be read or does not start with a TeX banner.
    /// After a failure the log is empty.
    pub fn read(&mut self, path: &Path) -> Result<()> {
        self.lines = None;
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        self.load(&text).then_some(()).ok_or_else(|| {
            Error::Typesetter(format!(
                "{} is not a log written by the typesetter",
                crate::files::display(path)
            ))
        })
    }

    /// Loads log text, returning false if it does not start with a TeX banner.
    pub fn load(&mut self, text: &str) -> bool {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if LOG_HEADER.is_match(first) => {
                self.lines = Some(lines.map(str::to_string).collect());
                true
            }
            _ => {
                self.lines = None;
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.lines.is_some()
    }

    /// The lines of the log after the banner.
    pub fn lines(&self) -> &[String] {
        self.lines.as_deref().unwrap_or_default()
    }

    /// Whether the log reports an error.
    ///
    /// pdfTeX reports some warnings in the form of errors; those do not count.
    pub fn errors(&self) -> bool {
        self.lines()
            .iter()
            .any(|line| line.starts_with('!') && !line.contains("pdfTeX warning"))
    }

    /// Whether LaTeX or a package asked for another run.
    pub fn run_needed(&self) -> bool {
        self.lines().iter().any(|line| RERUN.is_match(line))
    }

    pub fn get_errors(&self) -> Vec<Message> {
        self.parse(Select::ERRORS)
    }

    pub fn get_boxes(&self) -> Vec<Message> {
        self.parse(Select::BOXES)
    }

    pub fn get_references(&self) -> Vec<Message> {
        self.parse(Select::REFS)
    }

    pub fn get_warnings(&self) -> Vec<Message> {
        self.parse(Select::WARNINGS)
    }

    /// Extracts the selected kinds of messages, in log order.
    pub fn parse(&self, select: Select) -> Vec<Message> {
        let mut parser = Parser::new(select);
        for line in self.lines() {
            parser.line(line);
        }
        parser.messages
    }
}

/// A warning that may continue on the following lines.
struct PendingWarning {
    prefix: String,
    text: Vec<String>,
    message: Message,
}

struct Parser {
    select: Select,
    messages: Vec<Message>,
    stack: Vec<Option<String>>,
    last_file: Option<String>,
    page: u32,
    // Inside an error message, up to the line that locates it.
    parsing: bool,
    // Skipping the context of a message, up to the next empty line.
    skipping: bool,
    error: Option<String>,
    macro_name: Option<String>,
    undefined_cseqs: std::collections::HashSet<String>,
    accumulated: String,
    warning: Option<PendingWarning>,
}

impl Parser {
    fn new(select: Select) -> Parser {
        Parser {
            select,
            messages: Vec::new(),
            stack: vec![None],
            last_file: None,
            page: 1,
            parsing: false,
            skipping: false,
            error: None,
            macro_name: None,
            undefined_cseqs: Default::default(),
            accumulated: String::new(),
            warning: None,
        }
    }

    fn current_file(&self) -> Option<String> {
        self.stack.last().cloned().flatten()
    }

    fn line(&mut self, raw: &str) {
        if !self.parsing && raw.chars().count() == LOG_LINE_WIDTH {
            self.accumulated.push_str(raw);
            return;
        }
        let line = std::mem::take(&mut self.accumulated) + raw;

        if self.warning.is_none() && line.is_empty() {
            self.skipping = false;
            return;
        }
        if self.skipping {
            return;
        }
        if self.parsing {
            self.error_line(&line);
            return;
        }
        if let Some(text) = line.strip_prefix('!') {
            self.error = Some(text.trim_start().to_string());
            self.parsing = true;
            return;
        }
        if line == "Runaway argument?" {
            self.error = Some(line);
            self.parsing = true;
            return;
        }
        if let Some(mut pending) = self.warning.take() {
            if let Some(rest) = line.strip_prefix(&pending.prefix) {
                pending.text.push(rest.trim().to_string());
                self.warning = Some(pending);
                return;
            }
            self.finish_warning(pending);
            if line.is_empty() {
                self.skipping = false;
                return;
            }
        }
        if let Some(captures) = REFERENCE.captures(&line) {
            if self.select.refs {
                let mut message = Message::new(
                    Kind::Warning,
                    format!("Reference `{}' undefined.", &captures["ref"]),
                );
                message.file = self.current_file();
                message.reference = Some(captures["ref"].to_string());
                message.page = captures["page"].parse().ok();
                message.line = captures["line"].parse().ok();
                self.messages.push(message);
            }
            return;
        }
        if let Some(captures) = LABEL.captures(&line) {
            if self.select.refs {
                let mut message = Message::new(Kind::Warning, &captures["text"]);
                message.file = self.current_file();
                self.messages.push(message);
            }
            return;
        }
        if line.contains("Warning") {
            if let Some(captures) = WARNING.captures(&line) {
                let text_start = captures.name("text").map_or(0, |m| m.start());
                let mut message = Message::new(Kind::Warning, "");
                message.file = self.current_file();
                message.page = Some(self.page);
                let prefix = match captures.name("pkg") {
                    Some(pkg) => {
                        message.pkg = Some(pkg.as_str().to_string());
                        format!("({})", pkg.as_str())
                    }
                    None => String::new(),
                };
                self.warning = Some(PendingWarning {
                    prefix: format!("{prefix:<text_start$}"),
                    text: vec![captures["text"].to_string()],
                    message,
                });
            }
            return;
        }
        if BAD_BOX.is_match(&line) {
            if self.select.boxes {
                let mut message = Message::new(Kind::BadBox, line.as_str());
                message.file = self.current_file();
                message.page = Some(self.page);
                if let Some(captures) = AT_LINE.captures(&line) {
                    message.line = captures.name("line").and_then(|m| m.as_str().parse().ok());
                    message.last = captures.name("last").and_then(|m| m.as_str().parse().ok());
                    message.text = line[..captures.get(0).map_or(line.len(), |m| m.start())]
                        .to_string();
                }
                self.messages.push(message);
            }
            self.skipping = true;
            return;
        }
        self.update_file(&line);
        self.update_page(&line);
    }

    fn error_line(&mut self, line: &str) {
        if self.error.as_deref() == Some("Undefined control sequence.") {
            if let Some(captures) = CSEQ.captures(line) {
                let seq = captures["seq"].to_string();
                if self.undefined_cseqs.insert(seq.clone()) {
                    self.error = Some(format!("Undefined control sequence {seq}."));
                } else {
                    self.error = None;
                }
            }
        }
        if let Some(captures) = MACRO.captures(line) {
            self.macro_name = Some(captures["macro"].to_string());
        }
        if let Some(captures) = LINE.captures(line) {
            self.parsing = false;
            self.skipping = true;
            let pdftex = line.contains("pdfTeX warning");
            let error = match self.error.take() {
                Some(error) => error,
                None => return,
            };
            if pdftex && self.select.warnings {
                let text = match error.find(':') {
                    Some(i) => error[i + 1..].trim_start().to_string(),
                    None => error.clone(),
                };
                let mut message = Message::new(Kind::Warning, text);
                message.pkg = Some("pdfTeX".to_string());
                message.file = self.current_file().or_else(|| self.last_file.clone());
                self.messages.push(message);
            } else if !pdftex && self.select.errors {
                let mut message = Message::new(Kind::Error, error.as_str());
                message.line = captures.name("line").and_then(|m| m.as_str().parse().ok());
                message.code = captures.name("code").map(|m| m.as_str().to_string());
                if let Some(ignored) = IGNORED.captures(&error) {
                    message.file = self.last_file.clone();
                    message.code = None;
                    message.line = ignored["line"].parse().ok();
                } else {
                    message.file = self.current_file().or_else(|| self.last_file.clone());
                }
                message.macro_name = self.macro_name.take();
                self.messages.push(message);
            }
            self.macro_name = None;
        } else if let Some(text) = line.strip_prefix('!') {
            self.error = Some(text.trim_start().to_string());
        } else if let Some(why) = line.strip_prefix("***") {
            self.parsing = false;
            self.skipping = true;
            if self.select.errors {
                let mut message =
                    Message::new(Kind::Abort, self.error.take().unwrap_or_default());
                message.why = Some(why.trim().to_string());
                message.file = self.last_file.clone();
                self.messages.push(message);
            }
        } else if line.starts_with("Type X to quit ") {
            self.parsing = false;
            self.skipping = false;
            if self.select.errors {
                let mut message =
                    Message::new(Kind::Error, self.error.take().unwrap_or_default());
                message.file = self.current_file();
                self.messages.push(message);
            }
        }
    }

    fn finish_warning(&mut self, pending: PendingWarning) {
        let PendingWarning {
            text, mut message, ..
        } = pending;
        let mut text = text.join(" ");
        if let Some(captures) = ON_LINE.captures(&text) {
            message.line = captures["line"].parse().ok();
            let range = captures.get(0).map(|m| m.range()).unwrap_or(0..0);
            text.replace_range(range, "");
        }
        if self.select.warnings {
            message.text = text;
            self.messages.push(message);
        }
    }

    fn update_file(&mut self, line: &str) {
        for captures in FILE.captures_iter(line) {
            match captures.name("file") {
                Some(file) => {
                    let file = file.as_str().to_string();
                    self.last_file = Some(file.clone());
                    self.stack.push(Some(file));
                }
                None => {
                    if self.stack.len() > 1 {
                        self.last_file = self.stack.pop().flatten();
                    }
                }
            }
        }
    }

    fn update_page(&mut self, line: &str) {
        if let Some(num) = PAGE
            .captures_iter(line)
            .last()
            .and_then(|c| c["num"].parse::<u32>().ok())
        {
            self.page = num.saturating_add(1);
        }
    }
}
