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

//! Identifiers and keywords in PSPP syntax.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use thiserror::Error as ThisError;
use unicase::UniCase;
use unicode_properties::{GeneralCategoryGroup, UnicodeGeneralCategory};

use crate::lex::token::Punct;

/// The kind of an identifier, as determined by its first character.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Class {
    /// No distinguishing prefix.
    Ordinary,

    /// Starting with `$`.
    System,

    /// Starting with `#`.
    Scratch,

    /// Starting with `!`.
    Macro,
}

impl From<&str> for Class {
    fn from(s: &str) -> Self {
        match s.chars().next() {
            Some('$') => Self::System,
            Some('#') => Self::Scratch,
            Some('!') => Self::Macro,
            _ => Self::Ordinary,
        }
    }
}

/// Character classification for identifiers.
pub trait IdentifierChar {
    /// Returns true if `self` is an ASCII character that may be the first
    /// character in an identifier.
    fn ascii_may_start_id(self) -> bool;

    /// Returns true if `self` may be the first character in an identifier.
    fn may_start_id(self) -> bool;

    /// Returns true if `self` is an ASCII character that may be a second or
    /// subsequent character in an identifier.
    fn ascii_may_continue_id(self) -> bool;

    /// Returns true if `self` may be a second or subsequent character in an
    /// identifier.
    fn may_continue_id(self) -> bool;
}

fn non_ascii_id_char(c: char, allow_numbers: bool) -> bool {
    use GeneralCategoryGroup::*;

    c != char::REPLACEMENT_CHARACTER
        && match c.general_category_group() {
            Letter | Mark | Symbol => true,
            Number => allow_numbers,
            _ => false,
        }
}

impl IdentifierChar for char {
    fn ascii_may_start_id(self) -> bool {
        self.is_ascii_alphabetic() || matches!(self, '@' | '#' | '$' | '!')
    }

    fn may_start_id(self) -> bool {
        if self.is_ascii() {
            self.ascii_may_start_id()
        } else {
            non_ascii_id_char(self, false)
        }
    }

    fn ascii_may_continue_id(self) -> bool {
        self.is_ascii_alphanumeric() || matches!(self, '@' | '#' | '$' | '.' | '_')
    }

    fn may_continue_id(self) -> bool {
        if self.is_ascii() {
            self.ascii_may_continue_id()
        } else {
            non_ascii_id_char(self, true)
        }
    }
}

#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    #[error("Identifier cannot be empty string.")]
    Empty,

    #[error("\"{0}\" may not be used as an identifier because it is a reserved word.")]
    Reserved(String),

    #[error("\"!\" is not a valid identifier.")]
    Bang,

    #[error(
        "{string:?} may not be used as an identifier because it begins with disallowed character {c:?}."
    )]
    BadFirstCharacter { string: String, c: char },

    #[error(
        "{string:?} may not be used as an identifier because it contains disallowed character {c:?}."
    )]
    BadLaterCharacter { string: String, c: char },
}

/// A reserved word.  Reserved words may not be used as identifiers; the
/// scanner turns them into [Punct] tokens.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReservedWord {
    And,
    Or,
    Not,
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    All,
    By,
    To,
    With,
}

impl ReservedWord {
    const ALL: [(&'static str, Self); 13] = [
        ("AND", Self::And),
        ("OR", Self::Or),
        ("NOT", Self::Not),
        ("EQ", Self::Eq),
        ("GE", Self::Ge),
        ("GT", Self::Gt),
        ("LE", Self::Le),
        ("LT", Self::Lt),
        ("NE", Self::Ne),
        ("ALL", Self::All),
        ("BY", Self::By),
        ("TO", Self::To),
        ("WITH", Self::With),
    ];

    /// Returns the punctuator that this reserved word scans as.
    pub fn punct(self) -> Punct {
        match self {
            Self::And => Punct::And,
            Self::Or => Punct::Or,
            Self::Not => Punct::Not,
            Self::Eq => Punct::Eq,
            Self::Ge => Punct::Ge,
            Self::Gt => Punct::Gt,
            Self::Le => Punct::Le,
            Self::Lt => Punct::Lt,
            Self::Ne => Punct::Ne,
            Self::All => Punct::All,
            Self::By => Punct::By,
            Self::To => Punct::To,
            Self::With => Punct::With,
        }
    }
}

impl TryFrom<&str> for ReservedWord {
    type Error = ();

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        // Reserved words are never abbreviated, so only exact (case-insensitive)
        // matches count.
        if !(2..=4).contains(&source.len()) {
            return Err(());
        }
        Self::ALL
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(source))
            .map(|(_, word)| *word)
            .ok_or(())
    }
}

pub fn is_reserved_word(s: &str) -> bool {
    ReservedWord::try_from(s).is_ok()
}

/// An identifier, compared case-insensitively.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(pub UniCase<String>);

impl Identifier {
    /// Maximum length of an identifier, in bytes.
    pub const MAX_LEN: usize = 64;

    /// Checks that `s` is plausible as an identifier and returns it as one.
    pub fn new(s: impl Into<UniCase<String>>) -> Result<Self, Error> {
        let s: UniCase<String> = s.into();
        Self::is_plausible(&s)?;
        Ok(Identifier(s))
    }

    /// Wraps `s` as an identifier without checking that it is plausible.
    pub(crate) fn new_unchecked(s: impl Into<String>) -> Self {
        Identifier(UniCase::new(s.into()))
    }

    /// Checks whether `s` is plausible as an identifier: nonempty, not a
    /// reserved word, and made only of characters allowed in identifiers.
    pub fn is_plausible(s: &str) -> Result<(), Error> {
        if s == "!" {
            return Err(Error::Bang);
        }
        if is_reserved_word(s) {
            return Err(Error::Reserved(s.into()));
        }

        let mut chars = s.chars();
        let Some(first) = chars.next() else {
            return Err(Error::Empty);
        };
        if !first.may_start_id() {
            return Err(Error::BadFirstCharacter {
                string: s.into(),
                c: first,
            });
        }
        match chars.find(|c| !c.may_continue_id()) {
            Some(c) => Err(Error::BadLaterCharacter {
                string: s.into(),
                c,
            }),
            None => Ok(()),
        }
    }

    /// Returns true if this identifier is a case-insensitive match for
    /// `keyword`, allowing abbreviation to 3 or more characters.
    ///
    /// `keyword` must be ASCII.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        id_match_n_nonstatic(keyword, self.as_str(), 3)
    }

    /// Like [Self::matches_keyword] but with abbreviation allowed only down
    /// to `n` characters.
    pub fn matches_keyword_n(&self, keyword: &str, n: usize) -> bool {
        id_match_n_nonstatic(keyword, self.as_str(), n)
    }

    pub fn class(&self) -> Class {
        self.as_str().into()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    /// Returns this identifier without a leading `!`, if it has one.
    pub fn without_bang(&self) -> &str {
        self.as_str().strip_prefix('!').unwrap_or(self.as_str())
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0.eq(&UniCase::new(other))
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// Returns true if `token` is a case-insensitive match for `keyword`.
///
/// A token matches when it is identical to `keyword`, or when it is at least 3
/// characters long and those characters are a prefix of `keyword`, ignoring
/// case.
///
/// `keyword` must be ASCII.  It's normally a constant string, so it's declared
/// as `&'static str` to make it harder to reverse the argument order.  Use
/// [id_match_n_nonstatic] for a keyword computed at runtime.
pub fn id_match(keyword: &'static str, token: &str) -> bool {
    id_match_n(keyword, token, 3)
}

/// Returns true if `token` is a case-insensitive match for at least the first
/// `n` characters of `keyword`.
pub fn id_match_n(keyword: &'static str, token: &str, n: usize) -> bool {
    id_match_n_nonstatic(keyword, token, n)
}

/// Returns true if `token` is a case-insensitive match for at least the first
/// `n` characters of `keyword`.
///
/// `keyword` must be ASCII.
pub fn id_match_n_nonstatic(keyword: &str, token: &str, n: usize) -> bool {
    debug_assert!(keyword.is_ascii());
    let prefix_len = if token.len() >= n && token.len() < keyword.len() {
        token.len()
    } else {
        keyword.len()
    };
    keyword[..prefix_len].eq_ignore_ascii_case(token)
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{id_match, id_match_n, Class, Error, Identifier, ReservedWord};

    #[test]
    fn keyword_abbreviation() {
        assert!(id_match("FREQUENCIES", "FREQ"));
        assert!(id_match("FREQUENCIES", "frequencies"));
        assert!(!id_match("FREQUENCIES", "FR"));
        assert!(!id_match("FREQUENCIES", "FREQUENCIESX"));
        assert!(id_match_n("COMMENT", "COMM", 4));
        assert!(!id_match_n("COMMENT", "COM", 4));
    }

    #[test]
    fn reserved_words() {
        assert_eq!(ReservedWord::try_from("with"), Ok(ReservedWord::With));
        assert_eq!(ReservedWord::try_from("By"), Ok(ReservedWord::By));
        assert!(ReservedWord::try_from("WIT").is_err());
        assert!(ReservedWord::try_from("ANDY").is_err());
        assert_eq!(
            Identifier::new("and"),
            Err(Error::Reserved(String::from("and")))
        );
    }

    #[test]
    fn plausibility() {
        assert_eq!(Identifier::new(""), Err(Error::Empty));
        assert_eq!(Identifier::new("!"), Err(Error::Bang));
        assert!(matches!(
            Identifier::new("5x"),
            Err(Error::BadFirstCharacter { c: '5', .. })
        ));
        assert!(matches!(
            Identifier::new("x-y"),
            Err(Error::BadLaterCharacter { c: '-', .. })
        ));
        assert!(Identifier::new("ÿ1").is_ok());
        assert_eq!(Identifier::new("!macro").unwrap().class(), Class::Macro);
        assert_eq!(Identifier::new("#tmp").unwrap().class(), Class::Scratch);
        assert_eq!(Identifier::new("!macro").unwrap().without_bang(), "macro");
    }

    #[test]
    fn case_insensitive() {
        let id = Identifier::new("Var1").unwrap();
        assert_eq!(id, Identifier::new("VAR1").unwrap());
        assert!(id == "var1");
    }
}
