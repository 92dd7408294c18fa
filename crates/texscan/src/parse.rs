//! Argument parsing primitives.
//!
//! These operate on a [Lexer] in token mode.
//! None of them fail: at the end of the input they return whatever has been read so far,
//!     and the caller decides whether that is acceptable.

use crate::token::lexer::Lexer;
use crate::token::{raw_text, Category, Token};

impl Lexer {
    /// Skips spaces, new lines and comments.
    pub fn skip_space(&mut self) {
        loop {
            match self.peek().category() {
                Category::Space | Category::EndOfLine | Category::Comment => {
                    self.next_token();
                }
                _ => return,
            }
        }
    }

    /// Reads the tokens up to the close brace matching an already consumed open brace.
    ///
    /// The closing brace is consumed but not returned.
    pub fn get_group(&mut self) -> Vec<Token> {
        let mut depth = 0_usize;
        let mut tokens = vec![];
        loop {
            let token = self.next_token();
            match token.category() {
                Category::EndOfFile => {
                    self.put_back(token);
                    return tokens;
                }
                Category::BeginGroup => depth += 1,
                Category::EndGroup => {
                    if depth == 0 {
                        return tokens;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            tokens.push(token);
        }
    }

    /// Like [Lexer::get_group] but returns the raw text of the group.
    pub fn get_group_text(&mut self) -> String {
        raw_text(&self.get_group())
    }

    /// Reads a macro argument: a braced group, or else a single token.
    ///
    /// Leading spaces are skipped. At the end of the input the result is empty.
    pub fn get_argument(&mut self) -> Vec<Token> {
        self.skip_space();
        let token = self.next_token();
        match token.category() {
            Category::BeginGroup => self.get_group(),
            Category::EndOfFile => {
                self.put_back(token);
                vec![]
            }
            _ => vec![token],
        }
    }

    /// Like [Lexer::get_argument] but returns the raw text of the argument.
    pub fn get_argument_text(&mut self) -> String {
        raw_text(&self.get_argument())
    }

    /// Reads an optional argument in square brackets.
    ///
    /// Brackets inside braces do not close the argument.
    /// If the next non-space token is not `[`, nothing is consumed and `None` is returned.
    pub fn get_latex_optional(&mut self) -> Option<Vec<Token>> {
        let mut skipped = vec![];
        loop {
            let token = self.next_token();
            match token.category() {
                Category::Space | Category::EndOfLine | Category::Comment => skipped.push(token),
                _ if token.is_char('[') => break,
                _ => {
                    skipped.push(token);
                    self.put_list(skipped);
                    return None;
                }
            }
        }
        let mut depth = 0_usize;
        let mut tokens = vec![];
        loop {
            let token = self.next_token();
            match token.category() {
                Category::EndOfFile => {
                    self.put_back(token);
                    return Some(tokens);
                }
                Category::BeginGroup => depth += 1,
                Category::EndGroup => depth = depth.saturating_sub(1),
                _ if depth == 0 && token.is_char(']') => return Some(tokens),
                _ => {}
            }
            tokens.push(token);
        }
    }

    /// Like [Lexer::get_latex_optional] but returns the raw text of the argument.
    pub fn get_latex_optional_text(&mut self) -> Option<String> {
        self.get_latex_optional().map(|tokens| raw_text(&tokens))
    }

    /// Reads an unbraced file name, as in `\input chapter.tex`.
    ///
    /// The name ends at the first space, new line, control sequence or group delimiter.
    pub fn get_word_text(&mut self) -> String {
        self.skip_space();
        let mut word = String::new();
        loop {
            match self.peek().category() {
                Category::Letter | Category::Other | Category::Active | Category::Subscript => {
                    word.push_str(self.next_token().raw());
                }
                _ => return word,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_drops_closing_brace() {
        let mut lexer = Lexer::new("{a{b}c}d");
        lexer.next_token();
        assert_eq!(lexer.get_group_text(), "a{b}c");
        assert_eq!(lexer.next_token().value(), Some("d"));
    }

    #[test]
    fn group_at_end_of_input() {
        let mut lexer = Lexer::new("{ab");
        lexer.next_token();
        assert_eq!(lexer.get_group_text(), "ab");
        assert!(lexer.next_token().is_end_of_file());
    }

    #[test]
    fn group_put_back_round_trip() {
        let mut lexer = Lexer::new("{a \\b{c} d}e");
        lexer.next_token();
        let group = lexer.get_group();
        let text = raw_text(&group);
        let close = Token::new(
            Category::EndGroup,
            Some("}".into()),
            "}".into(),
            Default::default(),
        );
        let mut put_back = group.clone();
        put_back.push(close);
        lexer.put_list(put_back);
        assert_eq!(lexer.get_group_text(), text);
        assert_eq!(lexer.next_token().value(), Some("e"));
    }

    #[test]
    fn argument_braced_or_single_token() {
        let mut lexer = Lexer::new(" {chap one}  x\\foo");
        assert_eq!(lexer.get_argument_text(), "chap one");
        assert_eq!(lexer.get_argument_text(), "x");
        assert_eq!(lexer.get_argument_text(), "\\foo");
        assert_eq!(lexer.get_argument_text(), "");
    }

    #[test]
    fn optional_argument() {
        let mut lexer = Lexer::new("[width=3cm,{a]b}] {fig}");
        assert_eq!(
            lexer.get_latex_optional_text(),
            Some("width=3cm,{a]b}".to_string())
        );
        assert_eq!(lexer.get_argument_text(), "fig");
    }

    #[test]
    fn missing_optional_argument_consumes_nothing() {
        let mut lexer = Lexer::new("  {fig}");
        assert_eq!(lexer.get_latex_optional(), None);
        assert_eq!(lexer.next_token().category(), Category::Space);
        assert_eq!(lexer.get_argument_text(), "fig");
    }

    #[test]
    fn word() {
        let mut lexer = Lexer::new(" chapter_1.tex more");
        assert_eq!(lexer.get_word_text(), "chapter_1.tex");
        assert_eq!(lexer.next_token().category(), Category::Space);
    }
}
