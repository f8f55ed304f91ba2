//! Converts source text to sequences of tokens.
//!
//! Lexing is performed one line at a time: a line is pulled from the
//! underlying reader, tokenized into a FIFO queue, and [`Lexer::next_token`]
//! drains that queue, refilling it from the next non-empty line. The end of
//! the input is reported as a terminal [`Token::Eof`].
//!
//! This module provides:
//! - [`tokenize`]: A utility function that opaquely does the lexing from string to tokens.
//! - [`Lexer`]: The struct which does the entire lexing process.

use std::collections::VecDeque;
use std::io::{self, BufRead};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::err::{FullMinicErr, MinicErr};

use self::token::{FullToken, Keyword, Sep, Token};
pub mod token;

/// A [`Result`] type for operations in the lexing process.
///
/// The only failures the lexer itself can produce are I/O failures of the
/// underlying reader; unrecognizable lexemes become [`Token::Illegal`] and are
/// reported downstream.
pub type LexResult<T> = Result<T, FullLexErr>;
type FullLexErr = FullMinicErr<io::Error>;

/// Lex a full string into a sequence of tokens, excluding the terminal EOF.
///
/// For more control, see the [`Lexer`] struct.
///
/// # Example
/// ```
/// use minic::lexer::tokenize;
/// use minic::lexer::token::{token, Token};
///
/// let tokens = tokenize("a + b").unwrap();
/// assert_eq!(tokens, vec![
///     Token::Ident(String::from("a")),
///     token![+],
///     Token::Ident(String::from("b")),
/// ]);
/// ```
pub fn tokenize(input: &str) -> LexResult<Vec<FullToken>> {
    let mut lx = Lexer::new(io::Cursor::new(input));
    let mut tokens = vec![];

    loop {
        let tok = lx.next_token()?;
        if tok.kind == Token::Eof {
            return Ok(tokens);
        }
        tokens.push(tok);
    }
}

/// Lexeme shape of an integer literal (also matched by over-long digit runs
/// that no longer fit an `i32`; those fall through to the float class).
static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").unwrap());
/// Lexeme shape of a float literal.
static FLOAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?([0-9]+\.[0-9]*|[0-9]*\.[0-9]+|[0-9]+)$").unwrap());
/// Lexeme shape of an identifier.
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// The struct that performs the full lexing process.
///
/// # Example
/// ```
/// use std::io::Cursor;
/// use minic::lexer::Lexer;
/// use minic::lexer::token::{token, Token};
///
/// let mut lx = Lexer::new(Cursor::new("int x = 1;"));
/// assert_eq!(lx.next_token().unwrap().kind, token![int]);
/// assert_eq!(lx.next_token().unwrap().kind, Token::Ident(String::from("x")));
/// ```
pub struct Lexer<R> {
    reader: R,

    /// The 1-based line number of the most recently read line.
    line_no: usize,
    /// Tokens lexed from the current line, not yet consumed.
    queue: VecDeque<FullToken>,
    /// Whether the reader has hit end of input.
    eof: bool,
}

impl<R: BufRead> Lexer<R> {
    /// Create a new lexer over a line-buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            queue: VecDeque::new(),
            eof: false,
        }
    }

    /// Pop the next token, reading and tokenizing further lines as needed.
    ///
    /// Once the input is exhausted this returns [`Token::Eof`], idempotently.
    pub fn next_token(&mut self) -> LexResult<FullToken> {
        while self.queue.is_empty() {
            if self.eof {
                return Ok(FullToken::new(Token::Eof, self.line_no));
            }

            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| e.at(self.line_no + 1))?;

            if read == 0 {
                self.eof = true;
                continue;
            }

            self.line_no += 1;
            self.lex_line(line.trim_end_matches(['\n', '\r']));
        }

        Ok(self.queue.pop_front().unwrap())
    }

    /// Tokenize one line into the queue.
    fn lex_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            // (1) skip space, tab, and comments
            if c == ' ' || c == '\t' {
                i += 1;
                continue;
            }
            if c == '/' && chars.get(i + 1) == Some(&'/') {
                break;
            }

            // (2) is it a separator?
            if let Some(sep) = Sep::get_sep(c) {
                if !(sep == Sep::Minus && glues_negative(&chars, i)) {
                    self.push(Token::Sep(sep));
                    i += 1;
                    continue;
                }
            }

            // (3) accumulate a lexeme up to the next separator or whitespace
            let start = i;
            i += 1; // current char is part of the lexeme (a glued '-' included)
            while i < chars.len() {
                let c = chars[i];
                if c == ' ' || c == '\t' || Sep::get_sep(c).is_some() {
                    break;
                }
                i += 1;
            }

            let lexeme: String = chars[start..i].iter().collect();
            self.push(classify(lexeme));
        }
    }

    fn push(&mut self, kind: Token) {
        self.queue.push_back(FullToken::new(kind, self.line_no));
    }
}

/// Whether the `-` at `chars[at]` starts a negative numeric literal
/// rather than acting as a binary operator.
///
/// It does exactly when the next character is a digit (no intervening
/// whitespace) and the previous non-space character on the line is absent or
/// is a separator other than `)`, `]`, `}`; an operand on the left (an
/// identifier, a number, or the end of a parenthesized sub-expression) makes
/// the `-` an operator. The decision never looks past the current line.
fn glues_negative(chars: &[char], at: usize) -> bool {
    match chars.get(at + 1) {
        Some(c) if c.is_ascii_digit() => {}
        _ => return false,
    }

    let prev = chars[..at]
        .iter()
        .rev()
        .find(|&&c| c != ' ' && c != '\t');

    match prev {
        None => true,
        Some(&c) => Sep::get_sep(c).is_some() && !matches!(c, ')' | ']' | '}'),
    }
}

/// Classify an accumulated lexeme: integer, float, keyword, identifier, or
/// illegal, in that order.
fn classify(lexeme: String) -> Token {
    if INT_RE.is_match(&lexeme) && lexeme.parse::<i32>().is_ok() {
        return Token::Int(lexeme);
    }
    if FLOAT_RE.is_match(&lexeme) {
        return Token::Float(lexeme);
    }
    if let Some(kw) = Keyword::get_kw(&lexeme) {
        return kw;
    }
    if IDENT_RE.is_match(&lexeme) {
        return Token::Ident(lexeme);
    }

    Token::Illegal(lexeme)
}

#[cfg(test)]
mod tests {
    use super::token::token;
    use super::*;

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }
    fn int(s: &str) -> Token {
        Token::Int(s.to_string())
    }
    fn float(s: &str) -> Token {
        Token::Float(s.to_string())
    }

    /// Assert that the string provided lexes into the vector of tokens.
    fn assert_lex(input: &str, result: &[Token]) {
        match tokenize(input) {
            Ok(t) => assert_eq!(t, result, "lexing {input:?}"),
            Err(e) => panic!("{}", e.full_msg(input)),
        }
    }

    #[test]
    fn ident_lex() {
        assert_lex("123 + abc * def", &[
            int("123"),
            token![+],
            ident("abc"),
            token![*],
            ident("def"),
        ]);
    }

    /// Tests keywords, separators, and declarations.
    #[test]
    fn declaration_lex() {
        assert_lex("int x = 1;", &[
            token![int],
            ident("x"),
            token![=],
            int("1"),
            token![;],
        ]);

        assert_lex("float f(float x) { return x; }", &[
            token![float],
            ident("f"),
            token!["("],
            token![float],
            ident("x"),
            token![")"],
            token!["{"],
            token![return],
            ident("x"),
            token![;],
            token!["}"],
        ]);

        assert_lex("int x[4] = {};", &[
            token![int],
            ident("x"),
            token!["["],
            int("4"),
            token!["]"],
            token![=],
            token!["{"],
            token!["}"],
            token![;],
        ]);
    }

    /// Tests numeric classification edge cases.
    #[test]
    fn numeric_lex() {
        assert_lex("1.5", &[float("1.5")]);
        assert_lex("0.25 + 1", &[float("0.25"), token![+], int("1")]);
        // too large for i32: falls to the float class
        assert_lex("99999999999", &[float("99999999999")]);
    }

    /// A `-` glues to a following digit only when nothing operand-like
    /// precedes it.
    #[test]
    fn negative_literal_lex() {
        // after `=`: a negative literal
        assert_lex("x = -3;", &[ident("x"), token![=], int("-3"), token![;]]);
        assert_lex("x = -3.5;", &[ident("x"), token![=], float("-3.5"), token![;]]);

        // after an identifier: a binary operator
        assert_lex("a -3", &[ident("a"), token![-], int("3")]);
        assert_lex("a - 3", &[ident("a"), token![-], int("3")]);

        // after `)`: a binary operator
        assert_lex("(a) -3", &[
            token!["("],
            ident("a"),
            token![")"],
            token![-],
            int("3"),
        ]);

        // after another operator: a negative literal
        assert_lex("a - -2", &[ident("a"), token![-], int("-2")]);
        assert_lex("(-2)", &[token!["("], int("-2"), token![")"]]);

        // separated from the digits: a bare operator
        assert_lex("- 2", &[token![-], int("2")]);
    }

    /// `//` comments and blank lines produce no tokens.
    #[test]
    fn comment_lex() {
        assert_lex("// a comment", &[]);
        assert_lex("x = 1; // trailing\n\n// full line\ny = 2;", &[
            ident("x"),
            token![=],
            int("1"),
            token![;],
            ident("y"),
            token![=],
            int("2"),
            token![;],
        ]);
    }

    /// Malformed lexemes come out as `Illegal`.
    #[test]
    fn illegal_lex() {
        assert_lex("3a", &[Token::Illegal("3a".to_string())]);
        assert_lex("@", &[Token::Illegal("@".to_string())]);
        assert_lex("1.2.3", &[Token::Illegal("1.2.3".to_string())]);
    }

    /// Re-lexing the lexemes joined by single spaces preserves the token
    /// kind sequence.
    #[test]
    fn relex_round_trip() {
        let sources = [
            "int main() { int a = -3; int b = a - -2; return b; }",
            "float f(float x) { return x / 2.0 + 1.5; }",
            "int g() { int x[4] = {0, -1, 2, 3}; x[0] = -4; return x[0]; }",
        ];

        for src in sources {
            let tokens = tokenize(src).unwrap();
            let joined = tokens
                .iter()
                .map(|t| t.kind.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let relexed = tokenize(&joined).unwrap();

            let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
            let rekinds: Vec<_> = relexed.into_iter().map(|t| t.kind).collect();
            assert_eq!(kinds, rekinds, "round trip through {joined:?}");
        }
    }

    /// Every token is tagged with the 1-based line it was formed on.
    #[test]
    fn line_tracking() {
        let tokens = tokenize("int x;\n\nx = 1;").unwrap();
        let lines: Vec<_> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 1, 3, 3, 3, 3]);
    }

    /// EOF is idempotent.
    #[test]
    fn eof_lex() {
        let mut lx = Lexer::new(io::Cursor::new("x"));
        assert_eq!(lx.next_token().unwrap().kind, ident("x"));
        assert_eq!(lx.next_token().unwrap().kind, Token::Eof);
        assert_eq!(lx.next_token().unwrap().kind, Token::Eof);
    }
}
