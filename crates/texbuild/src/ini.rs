//! A reader for the INI format used by conversion rule files.
//!
//! ```text
//! # comment
//! [eps-to-pdf]
//! target = (.*)\.pdf$
//! source = \1.eps
//! cost = 1
//! rule = shell
//! command = epstopdf --outfile=$target $source
//! ```
//!
//! Sections are introduced by `[name]`.
//! Entries are written `key = value` or `key: value`; keys are case-insensitive.
//! A line starting with whitespace continues the previous value.
//! Lines starting with `#` or `;` are comments.
use indexmap::IndexMap;

/// A section of an INI file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Line on which the section header appears, starting at 1.
    pub line: usize,
    pub entries: IndexMap<String, String>,
}

/// Error in an INI file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Parses INI text into sections, in order of appearance.
///
/// The entries of a section that appears twice are merged, at the position of its last appearance.
pub fn parse(text: &str) -> Result<Vec<Section>, SyntaxError> {
    let mut sections: Vec<Section> = Vec::new();
    let mut last_key: Option<String> = None;
    for (i, raw) in text.lines().enumerate() {
        let line_number = i + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            last_key = None;
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if raw.starts_with(|c: char| c == ' ' || c == '\t') {
            if let (Some(section), Some(key)) = (sections.last_mut(), &last_key) {
                if let Some(value) = section.entries.get_mut(key) {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                    continue;
                }
            }
        }
        if let Some(rest) = trimmed.strip_prefix('[') {
            let name = match rest.strip_suffix(']') {
                Some(name) => name.trim().to_string(),
                None => {
                    return Err(SyntaxError {
                        line: line_number,
                        message: "unterminated section header".to_string(),
                    })
                }
            };
            last_key = None;
            match sections.iter().position(|s| s.name == name) {
                Some(index) => {
                    let section = sections.remove(index);
                    sections.push(section);
                }
                None => sections.push(Section {
                    name,
                    line: line_number,
                    entries: IndexMap::new(),
                }),
            }
            continue;
        }
        let section = match sections.last_mut() {
            Some(section) => section,
            None => {
                return Err(SyntaxError {
                    line: line_number,
                    message: "entry outside of a section".to_string(),
                })
            }
        };
        let split = trimmed.find(|c: char| c == '=' || c == ':').ok_or_else(|| SyntaxError {
            line: line_number,
            message: format!("expected `key = value`, found `{trimmed}`"),
        })?;
        let key = trimmed[..split].trim().to_lowercase();
        let value = trimmed[split + 1..].trim().to_string();
        if key.is_empty() {
            return Err(SyntaxError {
                line: line_number,
                message: "empty key".to_string(),
            });
        }
        section.entries.insert(key.clone(), value);
        last_key = Some(key);
    }
    Ok(sections)
}
