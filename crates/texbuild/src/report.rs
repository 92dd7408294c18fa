//! Formatting diagnostics for the terminal.
use texbuild_stdext::color::Colorize;

use crate::logparse::{Kind, Message};

/// Formats a message without colors.
///
/// The short form omits the offending code and macro of errors.
pub fn format_message(message: &Message, short: bool) -> String {
    let text = body(message, short);
    let position = message.position();
    if position.is_empty() {
        text
    } else {
        format!("{position}: {text}")
    }
}

fn body(message: &Message, short: bool) -> String {
    let mut text = match message.kind {
        Kind::Error | Kind::Abort => capitalize(
            message
                .text
                .strip_prefix("LaTeX Error: ")
                .unwrap_or(&message.text),
        ),
        Kind::Warning | Kind::BadBox => message.text.clone(),
    };
    if let Some(pkg) = &message.pkg {
        text = format!("[{pkg}] {text}");
    }
    if let Some(why) = &message.why {
        text = format!("{text} {why}");
    }
    if !short {
        let mut details = Vec::new();
        if let Some(code) = message.code.as_deref().filter(|c| !c.trim().is_empty()) {
            details.push(format!("near `{}'", code.trim()));
        }
        if let Some(macro_name) = &message.macro_name {
            details.push(format!("from macro {macro_name}"));
        }
        if !details.is_empty() {
            text = format!("{text} ({})", details.join(", "));
        }
    }
    text
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Formats a message with terminal colors.
pub fn colorize_message(message: &Message, short: bool) -> String {
    let text = body(message, short);
    let text = match message.kind {
        Kind::Error | Kind::Abort => text.as_str().bright_red(),
        Kind::Warning => text.as_str().bright_yellow(),
        Kind::BadBox => text.as_str().dimmed(),
    };
    let position = message.position();
    if position.is_empty() {
        text.to_string()
    } else {
        format!("{}: {}", position.as_str().bold(), text)
    }
}

/// Prints messages to standard error.
pub fn print_messages(messages: &[Message], short: bool) {
    for message in messages {
        eprintln!("{}", colorize_message(message, short));
    }
}
