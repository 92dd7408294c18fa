//! Tokens produced by the lexer.
//!
//! Unlike the typesetter, the lexer here never discards input:
//!     every token remembers the exact text it was produced from,
//!     so concatenating the raw text of all tokens gives back the original source.

use std::path::Path;
use std::rc::Rc;

pub mod catcode;
pub mod lexer;

use catcode::CatCode;

/// Category of a token.
///
/// This is the 16 category codes plus two categories that only exist at the token level:
///     control sequences and the end of the input.
/// An [Escape](Category::Escape) token is only produced for an escape character at the very
///     end of the input.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Category {
    EndOfFile,
    ControlSequence,
    Escape,
    BeginGroup,
    EndGroup,
    MathShift,
    AlignmentTab,
    EndOfLine,
    Parameter,
    Superscript,
    Subscript,
    Ignored,
    Space,
    Letter,
    Other,
    Active,
    Comment,
    Invalid,
}

impl From<CatCode> for Category {
    fn from(code: CatCode) -> Self {
        match code {
            CatCode::Escape => Category::Escape,
            CatCode::BeginGroup => Category::BeginGroup,
            CatCode::EndGroup => Category::EndGroup,
            CatCode::MathShift => Category::MathShift,
            CatCode::AlignmentTab => Category::AlignmentTab,
            CatCode::EndOfLine => Category::EndOfLine,
            CatCode::Parameter => Category::Parameter,
            CatCode::Superscript => Category::Superscript,
            CatCode::Subscript => Category::Subscript,
            CatCode::Ignored => Category::Ignored,
            CatCode::Space => Category::Space,
            CatCode::Letter => Category::Letter,
            CatCode::Other => Category::Other,
            CatCode::Active => Category::Active,
            CatCode::Comment => Category::Comment,
            CatCode::Invalid => Category::Invalid,
        }
    }
}

/// A location in a source file. Lines and columns are 1-based and columns count characters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    pub file: Option<Rc<Path>>,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: Option<Rc<Path>>, line: usize, column: usize) -> Position {
        Position { file, line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file.display())?;
        }
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A token.
///
/// The value is the name for control sequences, the character for single-character tokens,
///     the comment text for comments, and absent for spaces, new lines and the end of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    category: Category,
    value: Option<String>,
    raw: String,
    position: Position,
}

impl Token {
    pub fn new(category: Category, value: Option<String>, raw: String, position: Position) -> Token {
        Token {
            category,
            value,
            raw,
            position,
        }
    }

    pub fn end_of_file(position: Position) -> Token {
        Token::new(Category::EndOfFile, None, String::new(), position)
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    #[inline]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The exact source text of the token.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[inline]
    pub fn position(&self) -> &Position {
        &self.position
    }

    #[inline]
    pub fn is_end_of_file(&self) -> bool {
        self.category == Category::EndOfFile
    }

    /// Whether this is the control sequence with the given name.
    pub fn is_control_sequence(&self, name: &str) -> bool {
        self.category == Category::ControlSequence && self.value() == Some(name)
    }

    /// Whether this is a letter or other character token for the given character.
    pub fn is_char(&self, c: char) -> bool {
        matches!(self.category, Category::Letter | Category::Other)
            && self.value.as_deref().and_then(|v| v.chars().next()) == Some(c)
    }
}

/// Concatenates the raw text of the tokens.
pub fn raw_text<'a, I: IntoIterator<Item = &'a Token>>(tokens: I) -> String {
    tokens.into_iter().map(Token::raw).collect()
}
