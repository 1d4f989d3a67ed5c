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

use crate::{
    identifier::Identifier,
    lex::{
        segment::{Incomplete, Segment, Syntax},
        token::{Punct, Token},
    },
};

use super::{MergeAction, ScanError, ScanToken, StringScanner, merge_tokens, token_from_segment};

fn id(s: &str) -> ScanToken {
    ScanToken::Token(Token::Id(Identifier::new(s).unwrap()))
}

fn macro_id(s: &str) -> ScanToken {
    ScanToken::Token(Token::MacroId(Identifier::new(s).unwrap()))
}

fn punct(punct: Punct) -> ScanToken {
    ScanToken::Token(Token::Punct(punct))
}

fn number(number: f64) -> ScanToken {
    ScanToken::Token(Token::Number(number))
}

fn string(s: &str) -> ScanToken {
    ScanToken::Token(Token::String(String::from(s)))
}

const END: ScanToken = ScanToken::Token(Token::End);

#[track_caller]
fn check_scan(input: &str, mode: Syntax, expected: &[ScanToken]) {
    let tokens = StringScanner::new(input, mode, false).collect::<Vec<_>>();
    if tokens != expected {
        eprintln!("tokens differ from expected:");
        for result in diff::slice(expected, &tokens) {
            match result {
                diff::Result::Left(left) => eprintln!("-{left:?}"),
                diff::Result::Both(left, _right) => eprintln!(" {left:?}"),
                diff::Result::Right(right) => eprintln!("+{right:?}"),
            }
        }
        panic!();
    }
}

fn merge(tokens: &[Token], eof: bool) -> Result<Option<MergeAction>, Incomplete> {
    merge_tokens(|index| match tokens.get(index) {
        Some(token) => Ok(Some(token)),
        None if eof => Ok(None),
        None => Err(Incomplete),
    })
}

#[test]
fn identifiers_and_reserved_words() {
    check_scan(
        "a and !x ! !* WITH.\nx.y z. \n",
        Syntax::Interactive,
        &[
            id("a"),
            punct(Punct::And),
            macro_id("!x"),
            punct(Punct::Bang),
            punct(Punct::BangAsterisk),
            punct(Punct::With),
            END,
            id("x.y"),
            id("z"),
            END,
        ],
    );
}

#[test]
fn numbers() {
    check_scan(
        "1 -1 - 5 -.5 1e5 1e 1.\n",
        Syntax::Interactive,
        &[
            number(1.0),
            number(-1.0),
            number(-5.0),
            number(-0.5),
            number(100000.0),
            ScanToken::Error(ScanError::ExpectedExponent(String::from("1e"))),
            number(1.0),
            END,
        ],
    );
}

#[test]
fn dash_merges_across_comment() {
    check_scan(
        "x = - /* c */ 5.\n",
        Syntax::Interactive,
        &[id("x"), punct(Punct::Equals), number(-5.0), END],
    );
}

#[test]
fn strings() {
    check_scan(
        "'x' + \"y\" x'41' u'1f600' 'it''s' 'open\n",
        Syntax::Interactive,
        &[
            string("xy"),
            string("A"),
            string("\u{1f600}"),
            string("it's"),
            ScanToken::Error(ScanError::ExpectedQuote),
        ],
    );
}

#[test]
fn bad_strings() {
    for (input, segment, expected) in [
        ("X'4'", Segment::HexString, ScanError::OddLengthHexString(1)),
        ("X'4G'", Segment::HexString, ScanError::BadHexDigit('G')),
        ("X'41é'", Segment::HexString, ScanError::BadHexDigit('é')),
        (
            "X'C0'",
            Segment::HexString,
            ScanError::BadUtf8 {
                substring: String::from("C0"),
                offset: 0,
            },
        ),
        (
            "X'41E282'",
            Segment::HexString,
            ScanError::IncompleteUtf8 {
                substring: String::from("E282"),
                offset: 2,
            },
        ),
        ("U''", Segment::UnicodeString, ScanError::BadLengthUnicodeString(0)),
        ("U'D800'", Segment::UnicodeString, ScanError::BadCodePoint(0xd800)),
        ("U'110000'", Segment::UnicodeString, ScanError::BadCodePoint(0x110000)),
        ("U'12x'", Segment::UnicodeString, ScanError::BadHexDigit('x')),
    ] {
        assert_eq!(
            token_from_segment(input, segment),
            Some(ScanToken::Error(expected)),
            "{input}"
        );
    }
}

#[test]
fn segments_without_tokens() {
    assert_eq!(token_from_segment(" ", Segment::Spaces), None);
    assert_eq!(token_from_segment("/* x */", Segment::Comment), None);
    assert_eq!(token_from_segment("* x.", Segment::CommentCommand), None);
    assert_eq!(
        token_from_segment("", Segment::StartDocument),
        Some(id("DOCUMENT"))
    );
    assert_eq!(token_from_segment("", Segment::StartCommand), Some(END));
    assert_eq!(
        token_from_segment("!MACRO", Segment::MacroName),
        Some(string("!MACRO"))
    );
}

#[test]
fn error_messages() {
    assert_eq!(
        ScanError::UnexpectedChar('\\').to_string(),
        "Bad character `\\' in input."
    );
    assert_eq!(
        ScanError::UnexpectedChar('\u{1}').to_string(),
        "Bad character U+0001 in input."
    );
    assert_eq!(
        ScanError::ExpectedExponent(String::from("1e")).to_string(),
        "Missing exponent following `1e'."
    );
    assert_eq!(
        ScanError::BadCodePoint(0xd800).to_string(),
        "U+D800 is not a valid Unicode code point."
    );
}

#[test]
fn merge_strings() {
    let a = Token::String(String::from("a"));
    let b = Token::String(String::from("b"));
    let plus = Token::Punct(Punct::Plus);

    assert_eq!(merge(&[a.clone()], false), Err(Incomplete));
    assert_eq!(merge(&[a.clone()], true), Ok(Some(MergeAction::Copy)));
    assert_eq!(merge(&[a.clone(), Token::End], false), Ok(Some(MergeAction::Copy)));
    assert_eq!(
        merge(&[a.clone(), plus.clone(), b.clone(), plus.clone(), Token::Number(5.0)], false),
        Ok(Some(MergeAction::Expand {
            n: 3,
            token: Token::String(String::from("ab"))
        }))
    );
    assert_eq!(
        merge(&[a.clone(), plus.clone(), b.clone(), plus.clone(), a.clone()], true),
        Ok(Some(MergeAction::Expand {
            n: 5,
            token: Token::String(String::from("aba"))
        }))
    );
    assert_eq!(merge(&[a.clone(), plus.clone(), b], false), Err(Incomplete));
    assert_eq!(merge(&[], true), Ok(None));
}

#[test]
fn merge_negative_numbers() {
    let dash = Token::Punct(Punct::Dash);
    assert_eq!(
        merge(&[dash.clone(), Token::Number(5.0)], false),
        Ok(Some(MergeAction::Expand {
            n: 2,
            token: Token::Number(-5.0)
        }))
    );
    assert_eq!(
        merge(&[dash.clone(), Token::Number(-5.0)], false),
        Ok(Some(MergeAction::Copy))
    );
    assert_eq!(
        merge(&[dash.clone(), Token::End], false),
        Ok(Some(MergeAction::Copy))
    );
    assert_eq!(merge(&[dash], false), Err(Incomplete));
}
