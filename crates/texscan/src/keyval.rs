//! Parsing of `key=value` lists, as found in package options and module options.
use indexmap::IndexMap;

/// Parses a comma separated list of `key` or `key=value` items.
///
/// Commas and equals signs inside braces do not separate items.
/// A value entirely wrapped in braces is unwrapped, which is how values containing commas
///     are written.
/// Keys without a value map to `None`. Keys and values are trimmed; empty items are ignored.
/// If a key appears twice the last value wins, but the key keeps its first position.
pub fn parse_keyval(input: &str) -> IndexMap<String, Option<String>> {
    let mut result = IndexMap::new();
    for item in split_top_level(input, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut parts = split_top_level(item, '=').into_iter();
        let key = parts.next().unwrap_or_default().trim().to_string();
        let rest: Vec<&str> = parts.collect();
        let value = if rest.is_empty() {
            None
        } else {
            Some(unbrace(rest.join("=").trim()).to_string())
        };
        result.insert(key, value);
    }
    result
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut pieces = vec![];
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                pieces.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&input[start..]);
    pieces
}

/// Removes one pair of braces if they enclose the whole string.
fn unbrace(value: &str) -> &str {
    if !(value.starts_with('{') && value.ends_with('}')) || value.len() < 2 {
        return value;
    }
    let mut depth = 0_usize;
    for (i, c) in value.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != value.len() - 1 {
                    // The first brace closes before the end, as in `{a},{b}`.
                    return value;
                }
            }
            _ => {}
        }
    }
    &value[1..value.len() - 1]
}
