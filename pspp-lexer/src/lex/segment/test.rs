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

use std::fmt::Debug;

use crate::prompt::PromptStyle;

use super::{Segment, Segmenter, Syntax};

/// Pushes `input` into `segmenter`.  If `one_byte` is true, first offers it
/// every proper prefix of `input`, to exercise [Incomplete](super::Incomplete)
/// handling.
fn push_segment(
    segmenter: &mut Segmenter,
    input: &str,
    one_byte: bool,
) -> Option<(usize, Segment)> {
    if one_byte {
        for (len, _) in input.char_indices() {
            if let Ok(result) = segmenter.push(&input[..len], false) {
                return result;
            }
        }
    }
    segmenter.push(input, true).unwrap()
}

fn assert_same<T: Debug + PartialEq>(what: &str, expected: &[T], actual: &[T]) {
    if expected != actual {
        eprintln!("{what} differ from expected:");
        for result in diff::slice(expected, actual) {
            match result {
                diff::Result::Left(left) => eprintln!("-{left:?}"),
                diff::Result::Both(left, _right) => eprintln!(" {left:?}"),
                diff::Result::Right(right) => eprintln!("+{right:?}"),
            }
        }
        panic!();
    }
}

fn segment_once(
    mut input: &str,
    mode: Syntax,
    expect_segments: &[(Segment, &str)],
    expect_prompts: &[PromptStyle],
    one_byte: bool,
) {
    let mut segments = Vec::with_capacity(expect_segments.len());
    let mut prompts = Vec::new();
    let mut segmenter = Segmenter::new(mode, false);
    while let Some((seg_len, segment)) = push_segment(&mut segmenter, input, one_byte) {
        let (text, rest) = input.split_at(seg_len);
        segments.push((segment, text));
        if segment == Segment::Newline {
            prompts.push(segmenter.prompt());
        }
        input = rest;
    }
    assert_same("segments", expect_segments, &segments);
    assert_same("prompts", expect_prompts, &prompts);
}

/// Checks segmentation of `input` all at once and byte by byte, with LF and
/// with CRLF line ends, and (if `input` ends in a new-line) without the final
/// new-line.
fn check_segmentation(
    input: &str,
    mode: Syntax,
    expect_segments: &[(Segment, &str)],
    expect_prompts: &[PromptStyle],
) {
    for one_byte in [false, true] {
        println!("LF line ends, one_byte={one_byte}");
        segment_once(input, mode, expect_segments, expect_prompts, one_byte);

        println!("CRLF line ends, one_byte={one_byte}");
        let crlf_segments = expect_segments
            .iter()
            .map(|&(segment, text)| match segment {
                Segment::Newline => (Segment::Newline, "\r\n"),
                _ => (segment, text),
            })
            .collect::<Vec<_>>();
        segment_once(
            &input.replace('\n', "\r\n"),
            mode,
            &crlf_segments,
            expect_prompts,
            one_byte,
        );

        if let Some(input) = input.strip_suffix('\n') {
            println!("no final new-line, one_byte={one_byte}");
            let mut expect_segments = expect_segments.to_vec();
            assert_eq!(expect_segments.pop(), Some((Segment::Newline, "\n")));
            while let Some((Segment::SeparateCommands | Segment::EndCommand, "")) =
                expect_segments.last()
            {
                expect_segments.pop();
            }
            segment_once(
                input,
                mode,
                &expect_segments,
                &expect_prompts[..expect_prompts.len() - 1],
                one_byte,
            );
        }
    }
}

#[test]
fn identifiers_and_reserved_words() {
    check_segmentation(
        "a and !x ! !* WITH.\nx.y z. \n",
        Syntax::Interactive,
        &[
            (Segment::Identifier, "a"),
            (Segment::Spaces, " "),
            (Segment::ReservedWord, "and"),
            (Segment::Spaces, " "),
            (Segment::MacroId, "!x"),
            (Segment::Spaces, " "),
            (Segment::Punct, "!"),
            (Segment::Spaces, " "),
            (Segment::Punct, "!*"),
            (Segment::Spaces, " "),
            (Segment::ReservedWord, "WITH"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
            (Segment::Identifier, "x.y"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "z"),
            (Segment::EndCommand, "."),
            (Segment::Spaces, " "),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::First, PromptStyle::First],
    );
}

#[test]
fn numbers() {
    check_segmentation(
        "1 -1 - 5 -.5 1e5 1e 1.\n",
        Syntax::Interactive,
        &[
            (Segment::Number, "1"),
            (Segment::Spaces, " "),
            (Segment::Number, "-1"),
            (Segment::Spaces, " "),
            (Segment::Number, "- 5"),
            (Segment::Spaces, " "),
            (Segment::Number, "-.5"),
            (Segment::Spaces, " "),
            (Segment::Number, "1e5"),
            (Segment::Spaces, " "),
            (Segment::ExpectedExponent, "1e"),
            (Segment::Spaces, " "),
            (Segment::Number, "1"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::First],
    );
}

#[test]
fn punctuation() {
    check_segmentation(
        "a<=b ~= c<>d**e\n1. /\na \\ b\n",
        Syntax::Interactive,
        &[
            (Segment::Identifier, "a"),
            (Segment::Punct, "<="),
            (Segment::Identifier, "b"),
            (Segment::Spaces, " "),
            (Segment::Punct, "~="),
            (Segment::Spaces, " "),
            (Segment::Identifier, "c"),
            (Segment::Punct, "<>"),
            (Segment::Identifier, "d"),
            (Segment::Punct, "**"),
            (Segment::Identifier, "e"),
            (Segment::Newline, "\n"),
            (Segment::Number, "1."),
            (Segment::Spaces, " "),
            (Segment::Punct, "/"),
            (Segment::Newline, "\n"),
            (Segment::Identifier, "a"),
            (Segment::Spaces, " "),
            (Segment::UnexpectedChar, "\\"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "b"),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::Later, PromptStyle::Later, PromptStyle::Later],
    );
}

#[test]
fn strings() {
    check_segmentation(
        "'x' + \"y\" x'41' u'1f600' 'it''s' 'open\n",
        Syntax::Interactive,
        &[
            (Segment::QuotedString, "'x'"),
            (Segment::Spaces, " "),
            (Segment::Punct, "+"),
            (Segment::Spaces, " "),
            (Segment::QuotedString, "\"y\""),
            (Segment::Spaces, " "),
            (Segment::HexString, "x'41'"),
            (Segment::Spaces, " "),
            (Segment::UnicodeString, "u'1f600'"),
            (Segment::Spaces, " "),
            (Segment::QuotedString, "'it''s'"),
            (Segment::Spaces, " "),
            (Segment::ExpectedQuote, "'open"),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::Later],
    );
}

#[test]
fn plus_joins_strings_at_start_of_line() {
    check_segmentation(
        "'a'\n+ 'b'.\n",
        Syntax::Interactive,
        &[
            (Segment::QuotedString, "'a'"),
            (Segment::Newline, "\n"),
            (Segment::Punct, "+"),
            (Segment::Spaces, " "),
            (Segment::QuotedString, "'b'"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::Later, PromptStyle::First],
    );
}

#[test]
fn shbang() {
    check_segmentation(
        "#! /usr/bin/pspp\ntitle x.\n",
        Syntax::Interactive,
        &[
            (Segment::Shbang, "#! /usr/bin/pspp"),
            (Segment::Newline, "\n"),
            (Segment::Identifier, "title"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "x"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::First, PromptStyle::First],
    );
}

#[test]
fn comment_command() {
    check_segmentation(
        "* a comment.\nnext.\ncomment one\n  two.\n",
        Syntax::Interactive,
        &[
            (Segment::CommentCommand, "* a comment"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
            (Segment::Identifier, "next"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
            (Segment::CommentCommand, "comment one"),
            (Segment::Newline, "\n"),
            (Segment::CommentCommand, "  two"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[
            PromptStyle::First,
            PromptStyle::First,
            PromptStyle::Comment,
            PromptStyle::First,
        ],
    );
}

#[test]
fn document_command() {
    check_segmentation(
        "DOCUMENT first line.\ndoc two\n  lines.\n",
        Syntax::Interactive,
        &[
            (Segment::StartDocument, ""),
            (Segment::Document, "DOCUMENT first line."),
            (Segment::EndCommand, ""),
            (Segment::SeparateCommands, ""),
            (Segment::Newline, "\n"),
            (Segment::StartDocument, ""),
            (Segment::Document, "doc two"),
            (Segment::Newline, "\n"),
            (Segment::Document, "  lines."),
            (Segment::EndCommand, ""),
            (Segment::SeparateCommands, ""),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::First, PromptStyle::Document, PromptStyle::First],
    );
}

#[test]
fn file_label_command() {
    check_segmentation(
        "file label my label.\n",
        Syntax::Interactive,
        &[
            (Segment::Identifier, "file"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "label"),
            (Segment::Spaces, " "),
            (Segment::UnquotedString, "my label"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::First],
    );
}

#[test]
fn begin_data() {
    check_segmentation(
        "begin data.\n1 2\nend data.\n",
        Syntax::Interactive,
        &[
            (Segment::Identifier, "begin"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "data"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
            (Segment::InlineData, "1 2"),
            (Segment::Newline, "\n"),
            (Segment::Identifier, "end"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "data"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::Data, PromptStyle::Data, PromptStyle::First],
    );
}

#[test]
fn do_repeat() {
    check_segmentation(
        "do repeat x=a b.\n  print x.\nend repeat.\n",
        Syntax::Interactive,
        &[
            (Segment::Identifier, "do"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "repeat"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "x"),
            (Segment::Punct, "="),
            (Segment::Identifier, "a"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "b"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
            (Segment::DoRepeatCommand, "  print x."),
            (Segment::Newline, "\n"),
            (Segment::Identifier, "end"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "repeat"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[
            PromptStyle::DoRepeat,
            PromptStyle::DoRepeat,
            PromptStyle::First,
        ],
    );
}

#[test]
fn define_multiple_lines() {
    check_segmentation(
        "define !m(x=!tokens(1))\n!x\n!enddefine.\n",
        Syntax::Interactive,
        &[
            (Segment::Identifier, "define"),
            (Segment::Spaces, " "),
            (Segment::MacroName, "!m"),
            (Segment::Punct, "("),
            (Segment::Identifier, "x"),
            (Segment::Punct, "="),
            (Segment::MacroId, "!tokens"),
            (Segment::Punct, "("),
            (Segment::Number, "1"),
            (Segment::Punct, ")"),
            (Segment::Punct, ")"),
            (Segment::Newline, "\n"),
            (Segment::MacroBody, "!x"),
            (Segment::Newline, "\n"),
            (Segment::MacroId, "!enddefine"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::Define, PromptStyle::Define, PromptStyle::First],
    );
}

#[test]
fn define_one_line() {
    check_segmentation(
        "define !m()x!enddefine.\n",
        Syntax::Interactive,
        &[
            (Segment::Identifier, "define"),
            (Segment::Spaces, " "),
            (Segment::MacroName, "!m"),
            (Segment::Punct, "("),
            (Segment::Punct, ")"),
            (Segment::MacroBody, "x"),
            (Segment::MacroId, "!enddefine"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::First],
    );
}

#[test]
fn batch_mode() {
    check_segmentation(
        "first\n  second\nthird\n",
        Syntax::Batch,
        &[
            (Segment::Identifier, "first"),
            (Segment::Newline, "\n"),
            (Segment::Spaces, "  "),
            (Segment::Identifier, "second"),
            (Segment::Newline, "\n"),
            (Segment::StartCommand, ""),
            (Segment::Identifier, "third"),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::Later, PromptStyle::Later, PromptStyle::Later],
    );
}

#[test]
fn auto_mode() {
    check_segmentation(
        "frequencies x\n  /format=notable\ndescriptives y.\n",
        Syntax::Auto,
        &[
            (Segment::Identifier, "frequencies"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "x"),
            (Segment::Newline, "\n"),
            (Segment::Spaces, "  "),
            (Segment::Punct, "/"),
            (Segment::Identifier, "format"),
            (Segment::Punct, "="),
            (Segment::Identifier, "notable"),
            (Segment::Newline, "\n"),
            (Segment::StartCommand, ""),
            (Segment::Identifier, "descriptives"),
            (Segment::Spaces, " "),
            (Segment::Identifier, "y"),
            (Segment::EndCommand, "."),
            (Segment::Newline, "\n"),
        ],
        &[PromptStyle::Later, PromptStyle::Later, PromptStyle::First],
    );
}

#[test]
fn segments_tile_input() {
    let input = "data list /x 1-2.\nbegin data\n12\nend data.\n* done";
    let mut segmenter = Segmenter::new(Syntax::Auto, false);
    let mut rest = input;
    let mut total = 0;
    while let Some((len, _)) = segmenter.push(rest, true).unwrap() {
        total += len;
        rest = &rest[len..];
    }
    assert_eq!(total, input.len());
}
