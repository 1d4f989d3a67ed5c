// PSPP - a program for statistical analysis.
// Copyright (C) 2025 Free Software Foundation, Inc.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

use std::fmt::{Display, Formatter, Result as FmtResult, Write};

use crate::identifier::Identifier;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Identifier.
    Id(Identifier),

    /// Identifier that begins with `!`, which only has a special meaning
    /// inside macros.
    MacroId(Identifier),

    /// Number.  A negative value, including `-0`, is a negative number token.
    Number(f64),

    /// Quoted string.
    String(String),

    /// Command terminator or separator.
    ///
    /// Usually this is `.`, but a blank line also separates commands, and in
    /// batch mode any line that begins with a non-blank starts a new command.
    End,

    /// End of input.
    Stop,

    /// Operators, punctuators, and reserved words.
    Punct(Punct),
}

impl Token {
    pub fn id(&self) -> Option<&Identifier> {
        match self {
            Self::Id(identifier) => Some(identifier),
            _ => None,
        }
    }

    /// Returns the identifier in an `Id` or `MacroId` token.
    pub fn any_id(&self) -> Option<&Identifier> {
        match self {
            Self::Id(identifier) | Self::MacroId(identifier) => Some(identifier),
            _ => None,
        }
    }

    pub fn macro_id(&self) -> Option<&Identifier> {
        match self {
            Self::MacroId(identifier) => Some(identifier),
            _ => None,
        }
    }

    pub fn matches_keyword(&self, keyword: &str) -> bool {
        self.id().is_some_and(|id| id.matches_keyword(keyword))
    }

    /// Returns true if this is a macro identifier exactly equal to `keyword`
    /// (which includes the leading `!`), ignoring case.
    pub fn is_macro_keyword(&self, keyword: &str) -> bool {
        self.macro_id()
            .is_some_and(|id| id.as_str().eq_ignore_ascii_case(keyword))
    }

    pub fn as_number(&self) -> Option<f64> {
        if let Self::Number(number) = self {
            Some(*number)
        } else {
            None
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(number)
                if *number >= i64::MIN as f64
                    && *number <= i64::MAX as f64
                    && *number == number.floor() =>
            {
                Some(*number as i64)
            }
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(string) => Some(string.as_str()),
            _ => None,
        }
    }

    /// Returns true for `End` and `Stop`, which both end a command.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::End | Self::Stop)
    }

    pub fn is_punct(&self, punct: Punct) -> bool {
        *self == Self::Punct(punct)
    }
}

fn is_printable(c: char) -> bool {
    !c.is_control() || ['\t', '\r', '\n'].contains(&c)
}

fn string_representation(s: &str, quote: char, f: &mut Formatter<'_>) -> FmtResult {
    f.write_char(quote)?;
    for c in s.chars() {
        if c == quote {
            f.write_char(c)?;
        }
        f.write_char(c)?;
    }
    f.write_char(quote)
}

fn hex_representation(s: &str, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str("X\"")?;
    for byte in s.bytes() {
        write!(f, "{byte:02X}")?;
    }
    f.write_char('"')
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Token::Id(s) | Token::MacroId(s) => write!(f, "{s}"),
            Token::Number(number) => {
                if number.is_sign_negative() {
                    write!(f, "-{}", number.abs())
                } else {
                    write!(f, "{number}")
                }
            }
            Token::String(s) if !s.chars().all(is_printable) => hex_representation(s, f),
            Token::String(s) if s.contains('"') => string_representation(s, '\'', f),
            Token::String(s) => string_representation(s, '"', f),
            Token::End => write!(f, "."),
            Token::Stop => Ok(()),
            Token::Punct(punct) => punct.fmt(f),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Punct {
    /// `+`.
    Plus,

    /// `-`.
    Dash,

    /// `*`.
    Asterisk,

    /// `/`.
    Slash,

    /// `=`.
    Equals,

    /// `(`.
    LParen,

    /// `)`.
    RParen,

    /// `[`.
    LSquare,

    /// `]`.
    RSquare,

    /// `{`.
    LCurly,

    /// `}`.
    RCurly,

    /// `,`.
    Comma,

    /// `;`.
    Semicolon,

    /// `:`.
    Colon,

    /// `AND` or `&`.
    And,

    /// `OR` or `|`.
    Or,

    /// `NOT` or `~`.
    Not,

    /// `EQ`.
    Eq,

    /// `GE` or `>=`.
    Ge,

    /// `GT` or `>`.
    Gt,

    /// `LE` or `<=`.
    Le,

    /// `LT` or `<`.
    Lt,

    /// `NE` or `~=` or `<>`.
    Ne,

    /// `ALL`.
    All,

    /// `BY`.
    By,

    /// `TO`.
    To,

    /// `WITH`.
    With,

    /// `**`.
    Exp,

    /// `!` (only appears in macros).
    Bang,

    /// `%` (only appears in macros).
    Percent,

    /// `?` (only appears in macros).
    Question,

    /// `` ` `` (only appears in macros).
    Backtick,

    /// `.`.
    ///
    /// A dot in the middle of a line, where it does not end a command.
    Dot,

    /// `_` (only appears in macros).
    ///
    /// Underscores may appear within identifiers but not first, so this is an
    /// underscore found on its own.
    Underscore,

    /// `!*` (only appears in macros).
    BangAsterisk,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Dash => "-",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::Equals => "=",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LSquare => "[",
            Self::RSquare => "]",
            Self::LCurly => "{",
            Self::RCurly => "}",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Colon => ":",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Eq => "EQ",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Ne => "~=",
            Self::All => "ALL",
            Self::By => "BY",
            Self::To => "TO",
            Self::With => "WITH",
            Self::Exp => "**",
            Self::Bang => "!",
            Self::Percent => "%",
            Self::Question => "?",
            Self::Backtick => "`",
            Self::Dot => ".",
            Self::Underscore => "_",
            Self::BangAsterisk => "!*",
        }
    }

    /// Parses the text of a punctuator segment.
    pub fn from_syntax(s: &str) -> Option<Self> {
        Some(match s {
            "+" => Self::Plus,
            "-" => Self::Dash,
            "*" => Self::Asterisk,
            "/" => Self::Slash,
            "=" => Self::Equals,
            "(" => Self::LParen,
            ")" => Self::RParen,
            "[" => Self::LSquare,
            "]" => Self::RSquare,
            "{" => Self::LCurly,
            "}" => Self::RCurly,
            "," => Self::Comma,
            ";" => Self::Semicolon,
            ":" => Self::Colon,
            "&" => Self::And,
            "|" => Self::Or,
            "~" => Self::Not,
            ">=" => Self::Ge,
            ">" => Self::Gt,
            "<=" => Self::Le,
            "<" => Self::Lt,
            "~=" | "<>" => Self::Ne,
            "**" => Self::Exp,
            "!" => Self::Bang,
            "%" => Self::Percent,
            "?" => Self::Question,
            "`" => Self::Backtick,
            "." => Self::Dot,
            "_" => Self::Underscore,
            "!*" => Self::BangAsterisk,
            _ => return None,
        })
    }
}

impl Display for Punct {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        identifier::Identifier,
        lex::token::{Punct, Token},
    };

    #[test]
    fn string() {
        assert_eq!(Token::String(String::from("abc")).to_string(), "\"abc\"");
        assert_eq!(
            Token::String(String::from("it's \"x\"")).to_string(),
            "'it''s \"x\"'"
        );
        assert_eq!(
            Token::String(String::from("\u{0080}")).to_string(),
            "X\"C280\""
        );
        assert_eq!(Token::String(String::from("\u{1}")).to_string(), "X\"01\"");
    }

    /// All negative numbers, even -0, get formatted with a leading `-`.
    #[test]
    fn negative_zero() {
        assert_eq!(Token::Number(-0.0).to_string(), "-0");
        assert_eq!(Token::Number(-1.5).to_string(), "-1.5");
        assert_eq!(Token::Number(12.0).to_string(), "12");
    }

    #[test]
    fn punct_round_trip() {
        for s in ["+", "**", "<>", "~=", "!*", ">="] {
            let punct = Punct::from_syntax(s).unwrap();
            assert_eq!(Punct::from_syntax(punct.as_str()), Some(punct));
        }
        assert_eq!(Punct::from_syntax("<>"), Some(Punct::Ne));
        assert_eq!(Punct::from_syntax("@"), None);
    }

    #[test]
    fn macro_keyword() {
        let token = Token::MacroId(Identifier::new("!IfEnd").unwrap());
        assert!(token.is_macro_keyword("!IFEND"));
        assert!(!token.is_macro_keyword("!IF"));
        assert!(Token::Stop.is_terminator());
        assert_eq!(token.to_string(), "!IfEnd");
    }
}
