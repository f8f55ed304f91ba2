//! The tokens that source text can be lexed into.
//!
//! See [`Token`] for more information.

use std::fmt::{self, Display};

/// A specific unit that carries some graphemic value in minic.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Token {
    /// An identifier, such as function names or variable names (e.g. `abcd`, `a_b`, `a1`)
    Ident(String),

    /// An integer literal, sign included when the lexer glued one on (e.g. `123`, `-4`)
    Int(String),

    /// A float literal (e.g. `1.5`, `-0.25`)
    Float(String),

    /// Reserved words (e.g. `return`, `int`, `while`).
    ///
    /// These cannot be identifiers in any circumstance.
    Keyword(Keyword),

    /// A single-character separator or operator (e.g. `+`, `;`, `{`)
    Sep(Sep),

    /// A lexeme that fits no token class (e.g. `3a`, `@`).
    ///
    /// The parser reports this as a fatal lex error at the carrying line.
    Illegal(String),

    /// End of input.
    Eof,
}

impl Token {
    /// The token class name printed by the token-dump executable.
    pub fn type_name(&self) -> &'static str {
        match self {
            Token::Ident(_) => "IDENTIFIER",
            Token::Int(_) => "INT",
            Token::Float(_) => "FLOAT",
            Token::Keyword(kw) => kw.type_name(),
            Token::Sep(sep) => sep.type_name(),
            Token::Illegal(_) => "ILLEGAL",
            Token::Eof => "EOF",
        }
    }
}

/// A token with the 1-based source line it was formed on.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct FullToken {
    pub kind: Token,
    pub line: usize,
}

impl FullToken {
    /// Create a FullToken using a token and its source line.
    pub fn new(kind: Token, line: usize) -> Self {
        Self { kind, line }
    }
}

impl std::ops::Deref for FullToken {
    type Target = Token;

    fn deref(&self) -> &Self::Target {
        &self.kind
    }
}

impl PartialEq<Token> for FullToken {
    fn eq(&self, other: &Token) -> bool {
        &self.kind == other
    }
}
impl PartialEq<FullToken> for Token {
    fn eq(&self, other: &FullToken) -> bool {
        self == &other.kind
    }
}

macro_rules! define_keywords {
    ($($id:ident: $ex:literal, $name:literal),* $(,)?) => {
        /// Enum that provides all the minic keywords
        #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
        pub enum Keyword {
            $(
                #[allow(missing_docs)] $id
            ),*
        }

        impl Keyword {
            /// If the string is a keyword, return the `Token` it represents
            /// or `None` if it does not represent a token.
            pub fn get_kw(s: &str) -> Option<Token> {
                match s {
                    $(
                        $ex => Some(Token::Keyword(Self::$id))
                    ),+ ,
                    _ => None
                }
            }

            /// The token class name printed by the token-dump executable.
            pub fn type_name(self) -> &'static str {
                match self {
                    $(Self::$id => $name),*
                }
            }
        }

        impl Display for Keyword {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$id => $ex),*
                })
            }
        }
    };
}

macro_rules! define_seps {
    ($($id:ident: $ex:literal, $c:literal, $name:literal),* $(,)?) => {
        /// The single-character separators and operators of minic.
        #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
        pub enum Sep {
            $(
                #[allow(missing_docs)] $id
            ),*
        }

        impl Sep {
            /// If the char is a separator, return the `Sep` it represents
            /// or `None` if it does not represent one.
            pub fn get_sep(c: char) -> Option<Sep> {
                match c {
                    $(
                        $c => Some(Self::$id)
                    ),+ ,
                    _ => None
                }
            }

            /// The token class name printed by the token-dump executable.
            pub fn type_name(self) -> &'static str {
                match self {
                    $(Self::$id => $name),*
                }
            }
        }

        impl Display for Sep {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$id => $ex),*
                })
            }
        }
    };
}

define_keywords! {
    Return: "return", "RETURN",
    Void:   "void",   "DES-VOID",
    Int:    "int",    "DES-INT",
    Float:  "float",  "DES-FLOAT",
    If:     "if",     "IF",
    Else:   "else",   "ELSE",
    For:    "for",    "FOR",
    While:  "while",  "WHILE",
}

define_seps! {
    Assign:  "=", '=', "ASSIGN",
    Plus:    "+", '+', "PLUS",
    Minus:   "-", '-', "MINUS",
    Bang:    "!", '!', "BANG",
    Star:    "*", '*', "ASTERISK",
    Slash:   "/", '/', "SLASH",
    Lt:      "<", '<', "LT",
    Gt:      ">", '>', "GT",
    Comma:   ",", ',', "COMMA",
    Semi:    ";", ';', "SEMICOLON",
    LParen:  "(", '(', "LPAREN",
    RParen:  ")", ')', "RPAREN",
    LCurly:  "{", '{', "LBRACE",
    RCurly:  "}", '}', "RBRACE",
    LSquare: "[", '[', "LBRACKET",
    RSquare: "]", ']', "RBRACKET",
    Amp:     "&", '&', "AMPERSAND",
}

/// Utility macro that can be used as a shorthand for [`Keyword`] or [`Sep`] tokens.
#[macro_export]
macro_rules! token {
    (return) => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::Return) };
    (void)   => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::Void)   };
    (int)    => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::Int)    };
    (float)  => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::Float)  };
    (if)     => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::If)     };
    (else)   => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::Else)   };
    (for)    => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::For)    };
    (while)  => { $crate::lexer::token::Token::Keyword($crate::lexer::token::Keyword::While)  };

    (=)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Assign)  };
    (+)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Plus)    };
    (-)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Minus)   };
    (!)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Bang)    };
    (*)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Star)    };
    (/)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Slash)   };
    (<)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Lt)      };
    (>)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Gt)      };
    (,)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Comma)   };
    (;)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Semi)    };
    ("(") => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::LParen)  };
    (")") => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::RParen)  };
    ("{") => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::LCurly)  };
    ("}") => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::RCurly)  };
    ("[") => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::LSquare) };
    ("]") => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::RSquare) };
    (&)   => { $crate::lexer::token::Token::Sep($crate::lexer::token::Sep::Amp)     };
}
#[doc(inline)]
pub use token;

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => f.write_str(s),
            Token::Int(s) => f.write_str(s),
            Token::Float(s) => f.write_str(s),
            Token::Keyword(kw) => Display::fmt(kw, f),
            Token::Sep(sep) => Display::fmt(sep, f),
            Token::Illegal(s) => f.write_str(s),
            Token::Eof => Ok(()),
        }
    }
}
