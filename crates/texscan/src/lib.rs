//! Scanning LaTeX sources without typesetting them.
//!
//! A build tool needs to know which files a document reads, which packages it loads
//!     and which commands it issues to the build system,
//!     but it must not try to expand macros.
//! This crate provides the pieces for that:
//!
//! - [token]: category codes, tokens, and a [Lexer](token::lexer::Lexer) that can either
//!     produce every token or jump directly to the next call of an interesting macro.
//! - [parse]: argument parsing primitives on top of the lexer.
//! - [keyval]: parsing of `key=value` option lists.
//! - [cmdline]: shell-like splitting of directive lines with variable expansion.
//! - [variable]: the scoped variables that directives and rules expand.

pub mod cmdline;
pub mod keyval;
pub mod parse;
pub mod token;
pub mod variable;
