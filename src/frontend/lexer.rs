use std::str::Chars;

use itertools::{PeekNth, peek_nth};
use strum::EnumString;
use thiserror::Error;

use crate::frontend::SourceFile;

/// Converts Prose source text into a flat token list. The lexer runs a
/// single left-to-right scan with one character of lookahead; the produced
/// list is terminated by exactly one [`TokenKind::Eof`] token and is
/// consumed by index in the parser.
#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    chars: PeekNth<Chars<'source>>,
    position: usize,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// 1-based source line the token starts on
    pub line: u32,
    /// 1-based source column the token starts on
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // fn
    Identifier,       // total

    /* Literals */
    NumberLiteral, // 42 or 3.14
    StringLiteral, // "hello" (span covers the contents, not the quotes)

    /* Special */
    Newline, // statements end at end of line
    Eof,
}

/// Every reserved word in the language. Prose has no symbolic operators;
/// arithmetic, comparison, and logic are all spelled as words, so they all
/// live here next to the structural keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    /* Definitions and statements */
    Fn,
    Ret,
    Type,
    If,
    Else,
    Ok,
    Err,
    Let,
    Call,
    Out,
    Done,
    Repeat,
    As,
    While,
    Inc,
    Dec,

    /* Type words (parsed in type definitions, unused by codegen) */
    Num,
    Int,
    Str,
    Bool,
    Void,

    /* Operator words */
    Plus,
    Minus,
    Times,
    Over,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    Not,
    Neg,

    /* Positional argument references */
    First,
    Second,
    Third,
    Fourth,

    /* Number words */
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,

    /* Standard library modules */
    Math,
    List,
    Time,
    Http,
    Json,
}

impl Keyword {
    pub fn is_comparison_operator(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Lt | Self::Gt | Self::Lte | Self::Gte
        )
    }

    pub fn is_term_operator(self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(self) -> bool {
        matches!(self, Self::Times | Self::Over | Self::Mod)
    }

    pub fn is_type_name(self) -> bool {
        matches!(
            self,
            Self::Num | Self::Int | Self::Str | Self::Bool | Self::Void | Self::List
        )
    }

    /// The spelled-out numerals `zero` through `ten`.
    pub fn number_word_value(self) -> Option<f64> {
        let value = match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
            Self::Two => 2.0,
            Self::Three => 3.0,
            Self::Four => 4.0,
            Self::Five => 5.0,
            Self::Six => 6.0,
            Self::Seven => 7.0,
            Self::Eight => 8.0,
            Self::Nine => 9.0,
            Self::Ten => 10.0,
            _ => return None,
        };

        Some(value)
    }

    /// `first` through `fourth`, mapping to argument indices 0-3.
    pub fn positional_index(self) -> Option<usize> {
        let index = match self {
            Self::First => 0,
            Self::Second => 1,
            Self::Third => 2,
            Self::Fourth => 3,
            _ => return None,
        };

        Some(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal on line {line}")]
    UnterminatedString { line: u32 },

    #[error("unexpected character `{character}` on line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: u32,
        column: u32,
    },
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scans the whole source, producing the token list (terminated by a
    /// single `Eof` token) or the first error encountered.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.chars.peek().copied() {
            match c {
                // Insignificant whitespace
                ' ' | '\t' | '\r' => {
                    self.advance(c);
                }

                // Newlines terminate statements, so they produce a token
                '\n' => {
                    let token = self.start_token();
                    self.advance(c);
                    tokens.push(self.finish_token(TokenKind::Newline, token));
                    self.line += 1;
                    self.column = 1;
                }

                // Line comments: `--` or `#` to end of line
                '#' => self.ignore_line(),
                '-' if self.chars.peek_nth(1).is_some_and(|c| *c == '-') => self.ignore_line(),

                '"' => tokens.push(self.read_string()?),

                n if n.is_ascii_digit() => tokens.push(self.read_number()),

                a if a.is_ascii_alphabetic() || a == '_' => tokens.push(self.read_word()),

                c => {
                    return Err(LexError::UnexpectedCharacter {
                        character: c,
                        line: self.line,
                        column: self.column,
                    });
                }
            }
        }

        let eof = self.start_token();
        tokens.push(self.finish_token(TokenKind::Eof, eof));

        Ok(tokens)
    }

    fn advance(&mut self, c: char) {
        self.chars.next();
        self.position += c.len_utf8();
        self.column += 1;
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.advance(c);
        }
    }

    /// Remembers where the current token starts so the finished token can
    /// carry its span and position.
    fn start_token(&self) -> PendingToken {
        PendingToken {
            start: self.position,
            line: self.line,
            column: self.column,
        }
    }

    fn finish_token(&self, kind: TokenKind, pending: PendingToken) -> Token {
        Token {
            kind,
            span: Span::new(pending.start, self.position),
            line: pending.line,
            column: pending.column,
        }
    }

    /// A string literal runs to the closing quote. `\"` is kept verbatim
    /// (escape processing happens at IR-emission time); a newline or end of
    /// input before the closing quote is an error. The token span covers
    /// the contents without the surrounding quotes.
    fn read_string(&mut self) -> Result<Token, LexError> {
        let line = self.line;

        self.advance('"');
        let contents = self.start_token();

        while let Some(c) = self.chars.peek().copied() {
            match c {
                '\n' => return Err(LexError::UnterminatedString { line }),
                '\\' if self.chars.peek_nth(1).is_some_and(|c| *c == '"') => {
                    self.advance('\\');
                    self.advance('"');
                }
                '"' => {
                    let token = self.finish_token(TokenKind::StringLiteral, contents);
                    self.advance('"');
                    return Ok(token);
                }
                c => self.advance(c),
            }
        }

        Err(LexError::UnterminatedString { line })
    }

    /// One or more digits, optionally followed by `.` and at least one more
    /// digit. A trailing `.` without digits is left for the next token (and
    /// will fail there, since `.` is not a token).
    fn read_number(&mut self) -> Token {
        let token = self.start_token();

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_digit() {
                break;
            }

            self.advance(c);
        }

        if self.chars.peek().copied() == Some('.')
            && self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.advance('.');

            while let Some(c) = self.chars.peek().copied() {
                if !c.is_ascii_digit() {
                    break;
                }

                self.advance(c);
            }
        }

        self.finish_token(TokenKind::NumberLiteral, token)
    }

    // Keyword or identifier
    fn read_word(&mut self) -> Token {
        let token = self.start_token();

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.advance(c);
        }

        let span = Span::new(token.start, self.position);
        let value = self.source.value_of_span(span);

        let kind = match value.parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        self.finish_token(kind, token)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingToken {
    start: usize,
    line: u32,
    column: u32,
}
