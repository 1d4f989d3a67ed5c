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

//! Mid-level lexical analysis.
//!
//! This module turns the segments output by the lower-level [segmentation
//! phase](super::segment) into [Token]s, with [token_from_segment], and then
//! fuses some sequences of tokens into single tokens, with [merge_tokens].
//!
//! Segments that carry no meaning to the parser, such as white space and
//! comments, produce no token.  Malformed segments, such as an unterminated
//! string, produce a [ScanError].

use std::collections::VecDeque;

use thiserror::Error as ThisError;

use crate::identifier::{Identifier, ReservedWord};

use super::{
    segment::{Incomplete, Segment, Segmenter, Syntax},
    token::{Punct, Token},
};

/// Formats `c` the way error messages name a character: printable ASCII in
/// quotes, anything else as a code point.
fn char_name(c: &char) -> String {
    if (' '..='~').contains(c) {
        format!("`{c}'")
    } else {
        format!("U+{:04X}", u32::from(*c))
    }
}

#[derive(ThisError, Clone, Debug, PartialEq, Eq)]
pub enum ScanError {
    /// Unterminated string constant.
    #[error("Unterminated string constant.")]
    ExpectedQuote,

    /// Missing exponent.
    #[error("Missing exponent following `{0}'.")]
    ExpectedExponent(String),

    /// A number that does not parse.
    #[error("Invalid number `{0}'.")]
    BadNumber(String),

    /// Odd length hex string.
    #[error("String of hex digits has {0} characters, which is not a multiple of 2.")]
    OddLengthHexString(usize),

    /// Invalid hex digit.
    #[error("`{0}' is not a valid hex digit.")]
    BadHexDigit(char),

    /// Incomplete UTF-8 sequence.
    #[error("Incomplete UTF-8 sequence `{substring}' starting {offset} digits into hex string.")]
    IncompleteUtf8 { substring: String, offset: usize },

    /// Bad UTF-8 sequence.
    #[error("Invalid UTF-8 sequence `{substring}' starting {offset} digits into hex string.")]
    BadUtf8 { substring: String, offset: usize },

    /// Invalid length Unicode string.
    #[error("Unicode string contains {0} bytes, which is not in the valid range of 1 to 8 bytes.")]
    BadLengthUnicodeString(usize),

    /// Invalid code point.
    #[error("U+{0:04X} is not a valid Unicode code point.")]
    BadCodePoint(u32),

    /// `DO REPEAT` nested too deeply.
    #[error("DO REPEAT nested too deeply.")]
    DoRepeatOverflow,

    /// Unexpected character.
    #[error("Bad character {} in input.", char_name(.0))]
    UnexpectedChar(char),
}

/// The result of scanning one segment.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanToken {
    Token(Token),
    Error(ScanError),
}

impl ScanToken {
    pub fn token(self) -> Option<Token> {
        match self {
            ScanToken::Token(token) => Some(token),
            ScanToken::Error(_) => None,
        }
    }
}

impl From<Token> for ScanToken {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl From<ScanError> for ScanToken {
    fn from(error: ScanError) -> Self {
        Self::Error(error)
    }
}

fn scan_number(s: &str) -> ScanToken {
    // A negative number segment may have white space between `-` and the
    // digits.
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };
    match digits.parse::<f64>() {
        Ok(number) if negative => Token::Number(-number).into(),
        Ok(number) => Token::Number(number).into(),
        Err(_) => ScanError::BadNumber(String::from(s)).into(),
    }
}

fn scan_quoted_string(s: &str) -> ScanToken {
    let (single, double) = if s.starts_with('\'') {
        ("'", "''")
    } else {
        ("\"", "\"\"")
    };
    match s.get(1..).and_then(|rest| rest.strip_suffix(single)) {
        Some(inner) => Token::String(inner.replace(double, single)).into(),
        None => ScanError::ExpectedQuote.into(),
    }
}

/// Returns the hex digits between `X'` or `U'` and the closing quote.
fn strip_string_prefix(s: &str) -> &str {
    s.get(2..s.len().saturating_sub(1)).unwrap_or_default()
}

fn hex_value(c: char) -> Result<u8, ScanError> {
    c.to_digit(16)
        .map(|digit| digit as u8)
        .ok_or(ScanError::BadHexDigit(c))
}

fn scan_hex_string(s: &str) -> Result<Token, ScanError> {
    let s = strip_string_prefix(s);
    if s.len() % 2 != 0 {
        return Err(ScanError::OddLengthHexString(s.len()));
    }
    let digits = s.chars().map(hex_value).collect::<Result<Vec<_>, _>>()?;
    let bytes = digits
        .chunks_exact(2)
        .map(|pair| pair[0] * 16 + pair[1])
        .collect::<Vec<_>>();
    String::from_utf8(bytes)
        .map(Token::String)
        .map_err(|error| {
            let details = error.utf8_error();
            let offset = details.valid_up_to() * 2;
            let end = details
                .error_len()
                .map_or(s.len(), |len| offset + len * 2);
            let substring = String::from(&s[offset..end]);
            if details.error_len().is_some() {
                ScanError::BadUtf8 { substring, offset }
            } else {
                ScanError::IncompleteUtf8 { substring, offset }
            }
        })
}

fn scan_unicode_string(s: &str) -> Result<Token, ScanError> {
    let s = strip_string_prefix(s);
    if !(1..=8).contains(&s.len()) {
        return Err(ScanError::BadLengthUnicodeString(s.len()));
    }
    let mut code_point = 0u32;
    for c in s.chars() {
        code_point = code_point * 16 + u32::from(hex_value(c)?);
    }
    char::from_u32(code_point)
        .map(|c| Token::String(String::from(c)))
        .ok_or(ScanError::BadCodePoint(code_point))
}

/// Converts segment `s` of type `segment` into a token or an error.
///
/// Returns `None` for segments that do not produce tokens, such as white
/// space and comments.
pub fn token_from_segment(s: &str, segment: Segment) -> Option<ScanToken> {
    let scan_token = match segment {
        Segment::Number => scan_number(s),
        Segment::QuotedString => scan_quoted_string(s),
        Segment::HexString => scan_hex_string(s).into(),
        Segment::UnicodeString => scan_unicode_string(s).into(),

        Segment::UnquotedString
        | Segment::DoRepeatCommand
        | Segment::InlineData
        | Segment::Document
        | Segment::MacroBody
        | Segment::MacroName => Token::String(String::from(s)).into(),

        Segment::ReservedWord => match ReservedWord::try_from(s) {
            Ok(word) => Token::Punct(word.punct()).into(),
            Err(()) => Token::Id(Identifier::new_unchecked(s)).into(),
        },
        Segment::Identifier => Token::Id(Identifier::new_unchecked(s)).into(),
        Segment::MacroId => Token::MacroId(Identifier::new_unchecked(s)).into(),
        Segment::Punct => match Punct::from_syntax(s) {
            Some(punct) => Token::Punct(punct).into(),
            None => unexpected_char(s),
        },

        Segment::Shbang
        | Segment::Spaces
        | Segment::Comment
        | Segment::Newline
        | Segment::CommentCommand => return None,

        Segment::DoRepeatOverflow => ScanError::DoRepeatOverflow.into(),
        Segment::StartDocument => Token::Id(Identifier::new_unchecked("DOCUMENT")).into(),
        Segment::StartCommand | Segment::SeparateCommands | Segment::EndCommand => {
            Token::End.into()
        }
        Segment::ExpectedQuote => ScanError::ExpectedQuote.into(),
        Segment::ExpectedExponent => ScanError::ExpectedExponent(String::from(s)).into(),
        Segment::UnexpectedChar => unexpected_char(s),
    };
    Some(scan_token)
}

fn unexpected_char(s: &str) -> ScanToken {
    ScanError::UnexpectedChar(s.chars().next().unwrap_or(char::REPLACEMENT_CHARACTER)).into()
}

impl From<Result<Token, ScanError>> for ScanToken {
    fn from(result: Result<Token, ScanError>) -> Self {
        match result {
            Ok(token) => Self::Token(token),
            Err(error) => Self::Error(error),
        }
    }
}

/// The result of merging tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum MergeAction {
    /// Copy one token literally from input to output.
    Copy,

    /// Expand `n` tokens from the input into `token` in the output.
    Expand {
        /// Number of tokens to expand.
        n: usize,

        /// Replacement token.
        token: Token,
    },
}

/// Attempts to merge a sequence of tokens together into a single token.
///
/// `get_token(i)` returns the token at index `i` in the input, `None` if the
/// input ends before index `i`, or [Incomplete] if the token at index `i` is
/// not available yet.  In the last case, [Incomplete] propagates out and the
/// caller should try again once more tokens are available ([Token::End] or
/// [Token::Stop] is always enough to finish).
///
/// Returns `Ok(None)` if there is no token at index 0.
///
/// This performs two different kinds of token merging:
///
/// - String concatenation, where syntax like `"a" + "b"` is converted into a
///   single string token.  The parser relies on this.
///
/// - Negative number merging, where syntax like `-5` is converted from a pair
///   of tokens (a dash and a positive number) into a single token (a negative
///   number).  The segmenter already treats a dash followed by a number, with
///   optional intervening white space, as a negative number, so this only
///   matters when a comment intervenes or when macro expansion produces part of
///   the number.
pub fn merge_tokens<'a, F>(get_token: F) -> Result<Option<MergeAction>, Incomplete>
where
    F: Fn(usize) -> Result<Option<&'a Token>, Incomplete>,
{
    let Some(token) = get_token(0)? else {
        return Ok(None);
    };
    match token {
        Token::Punct(Punct::Dash) => match get_token(1)? {
            Some(Token::Number(number)) if number.is_sign_positive() => {
                Ok(Some(MergeAction::Expand {
                    n: 2,
                    token: Token::Number(-number),
                }))
            }
            _ => Ok(Some(MergeAction::Copy)),
        },
        Token::String(first) => {
            let mut output = None::<String>;
            let mut n = 1;
            while get_token(n)?.is_some_and(|token| token.is_punct(Punct::Plus)) {
                let Some(Token::String(next)) = get_token(n + 1)? else {
                    break;
                };
                output.get_or_insert_with(|| first.clone()).push_str(next);
                n += 2;
            }
            Ok(Some(match output {
                Some(output) => MergeAction::Expand {
                    n,
                    token: Token::String(output),
                },
                None => MergeAction::Copy,
            }))
        }
        _ => Ok(Some(MergeAction::Copy)),
    }
}

/// Iterates over the tokens in a string, without merging.
///
/// Each item pairs a token (or error) with the segment text it came from.
pub struct StringSegmenter<'a> {
    input: &'a str,
    segmenter: Segmenter,
}

impl<'a> StringSegmenter<'a> {
    pub fn new(input: &'a str, syntax: Syntax, is_snippet: bool) -> Self {
        Self {
            input,
            segmenter: Segmenter::new(syntax, is_snippet),
        }
    }
}

impl<'a> Iterator for StringSegmenter<'a> {
    type Item = (&'a str, ScanToken);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (seg_len, seg_type) = self.segmenter.push(self.input, true).ok()??;
            let (s, rest) = self.input.split_at(seg_len);
            self.input = rest;

            if let Some(token) = token_from_segment(s, seg_type) {
                return Some((s, token));
            }
        }
    }
}

/// Iterates over the tokens in a string, with merging.
pub struct StringScanner<'a> {
    input: &'a str,
    eof: bool,
    segmenter: Segmenter,
    tokens: VecDeque<Token>,
    error: Option<ScanError>,
}

impl<'a> StringScanner<'a> {
    pub fn new(input: &'a str, syntax: Syntax, is_snippet: bool) -> Self {
        Self {
            input,
            eof: false,
            segmenter: Segmenter::new(syntax, is_snippet),
            tokens: VecDeque::with_capacity(1),
            error: None,
        }
    }

    fn merge(&mut self, eof: bool) -> Result<Option<ScanToken>, Incomplete> {
        let tokens = &self.tokens;
        let action = merge_tokens(|index| match tokens.get(index) {
            Some(token) => Ok(Some(token)),
            None if eof => Ok(None),
            None => Err(Incomplete),
        })?;
        Ok(match action {
            Some(MergeAction::Copy) => self.tokens.pop_front().map(ScanToken::Token),
            Some(MergeAction::Expand { n, token }) => {
                self.tokens.drain(..n);
                Some(ScanToken::Token(token))
            }
            None => None,
        })
    }

    /// Discards errors and returns just the tokens.
    pub fn unwrapped(self) -> impl Iterator<Item = Token> + use<'a> {
        self.filter_map(ScanToken::token)
    }
}

impl Iterator for StringScanner<'_> {
    type Item = ScanToken;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Tokens queued before an error come out before it.
            if let Ok(Some(token)) = self.merge(self.eof || self.error.is_some()) {
                return Some(token);
            }
            if let Some(error) = self.error.take() {
                return Some(ScanToken::Error(error));
            }
            if self.eof {
                return None;
            }

            let Some((seg_len, seg_type)) = self.segmenter.push(self.input, true).ok().flatten()
            else {
                self.eof = true;
                continue;
            };
            let (s, rest) = self.input.split_at(seg_len);
            self.input = rest;

            match token_from_segment(s, seg_type) {
                Some(ScanToken::Error(error)) => self.error = Some(error),
                Some(ScanToken::Token(token)) => self.tokens.push_back(token),
                None => (),
            }
        }
    }
}

#[cfg(test)]
mod test;
