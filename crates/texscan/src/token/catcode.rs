//! Category codes and the table that maps characters to them.
use std::collections::HashMap;

use CatCode::*;

/// Enum representing the 16 category codes of the typesetter.
///
/// Each variant's documentation contains an example character which is mapped to that category code
///     in the default table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum CatCode {
    /// Marks the beginning of a control sequence.
    /// Example: `\`.
    Escape = 0,
    /// Begins a new group.
    /// Example: `{`.
    BeginGroup = 1,
    /// Ends an existing group.
    /// Example: `}`.
    EndGroup = 2,
    /// Starts or ends math mode.
    /// Example: `$`.
    MathShift = 3,
    /// Separates cells in alignments.
    /// Example: `&`.
    AlignmentTab = 4,
    /// Marks a new line in the input and terminates comments.
    /// Example: `\n`.
    EndOfLine = 5,
    /// Marks the beginning of a macro parameter.
    /// Example: `#`.
    Parameter = 6,
    /// Example: `^`.
    Superscript = 7,
    /// Example: `_`.
    Subscript = 8,
    /// Character that the typesetter drops.
    /// Example: ASCII null (0).
    Ignored = 9,
    /// Whitespace. Example: ` `.
    Space = 10,
    /// A character that can be part of a control sequence name.
    /// Examples: `[a-zA-Z]`.
    Letter = 11,
    /// Any other printable character.
    /// Example: `@`.
    #[default]
    Other = 12,
    /// A single character that behaves like a control sequence.
    /// Example: `~`.
    Active = 13,
    /// Marks the beginning of a comment that runs to the end of the line.
    /// Example: `%`.
    Comment = 14,
    /// An invalid character.
    /// Example: ASCII delete (127).
    Invalid = 15,
}

impl TryFrom<u8> for CatCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Escape),
            1 => Ok(BeginGroup),
            2 => Ok(EndGroup),
            3 => Ok(MathShift),
            4 => Ok(AlignmentTab),
            5 => Ok(EndOfLine),
            6 => Ok(Parameter),
            7 => Ok(Superscript),
            8 => Ok(Subscript),
            9 => Ok(Ignored),
            10 => Ok(Space),
            11 => Ok(Letter),
            12 => Ok(Other),
            13 => Ok(Active),
            14 => Ok(Comment),
            15 => Ok(Invalid),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for CatCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, *self as u8)
    }
}

impl CatCode {
    /// Category codes in effect in a LaTeX document body, for all ASCII characters.
    ///
    /// To find the category code for an ASCII character,
    ///     convert it to an integer and use it as an index for the array.
    pub const LATEX_DEFAULTS: [CatCode; 128] = latex_defaults();
}

const fn latex_defaults() -> [CatCode; 128] {
    let mut table = [Other; 128];
    let mut c = 0;
    while c < 128 {
        let u = c as u8;
        if u.is_ascii_alphabetic() {
            table[c] = Letter;
        }
        c += 1;
    }
    table[0] = Ignored;
    table[b'\t' as usize] = Space;
    table[b'\n' as usize] = EndOfLine;
    table[b'\r' as usize] = EndOfLine;
    table[b' ' as usize] = Space;
    table[b'\\' as usize] = Escape;
    table[b'{' as usize] = BeginGroup;
    table[b'}' as usize] = EndGroup;
    table[b'$' as usize] = MathShift;
    table[b'&' as usize] = AlignmentTab;
    table[b'#' as usize] = Parameter;
    table[b'^' as usize] = Superscript;
    table[b'_' as usize] = Subscript;
    table[b'~' as usize] = Active;
    table[b'%' as usize] = Comment;
    table[127] = Invalid;
    table
}

/// Mapping from characters to category codes.
///
/// Each lexer owns its own table, so changing a category code in one file
///     never leaks into another.
#[derive(Debug, Clone)]
pub struct CatCodeTable {
    ascii: [CatCode; 128],
    other: HashMap<char, CatCode>,
}

impl Default for CatCodeTable {
    fn default() -> Self {
        CatCodeTable {
            ascii: CatCode::LATEX_DEFAULTS,
            other: HashMap::new(),
        }
    }
}

impl CatCodeTable {
    /// Returns the category code of a character; characters outside ASCII default to [CatCode::Other].
    #[inline]
    pub fn get(&self, c: char) -> CatCode {
        if c.is_ascii() {
            self.ascii[c as usize]
        } else {
            self.other.get(&c).copied().unwrap_or_default()
        }
    }

    pub fn set(&mut self, c: char, code: CatCode) {
        if c.is_ascii() {
            self.ascii[c as usize] = code;
        } else {
            self.other.insert(c, code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let table = CatCodeTable::default();
        assert_eq!(table.get('\\'), Escape);
        assert_eq!(table.get('a'), Letter);
        assert_eq!(table.get('Z'), Letter);
        assert_eq!(table.get('1'), Other);
        assert_eq!(table.get('@'), Other);
        assert_eq!(table.get('\t'), Space);
        assert_eq!(table.get('\r'), EndOfLine);
        assert_eq!(table.get('~'), Active);
        assert_eq!(table.get('\u{7f}'), Invalid);
        assert_eq!(table.get('é'), Other);
    }

    #[test]
    fn set_is_local_to_table() {
        let mut table = CatCodeTable::default();
        let copy = table.clone();
        table.set('@', Letter);
        table.set('λ', Letter);
        assert_eq!(table.get('@'), Letter);
        assert_eq!(table.get('λ'), Letter);
        assert_eq!(copy.get('@'), Other);
    }

    #[test]
    fn try_from_round_trip() {
        for u in 0_u8..16 {
            let code = CatCode::try_from(u).unwrap();
            assert_eq!(code as u8, u);
        }
        assert_eq!(CatCode::try_from(16), Err(()));
    }
}
