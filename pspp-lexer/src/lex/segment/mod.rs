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

//! Syntax segmentation.
//!
//! Lexical analysis of PSPP syntax happens in two phases.  This module is the
//! lower-level phase, "segmentation", and [`super::scan`] is the higher-level
//! phase, "scanning".
//!
//! The segmenter labels each byte, or run of bytes, of UTF-8 input with a
//! [Segment] type.  In a few corner cases it also emits zero-length segments
//! that mark the boundary between two bytes, such as the start of a command.
//!
//! Many segments correspond to a single token, e.g. [Segment::Identifier]
//! becomes [Token::Id].  Others only contribute to tokens: quoted strings
//! joined by `+` become a single [Token::String].  Still others are dropped
//! ([Segment::Spaces]) or turn into error messages ([Segment::ExpectedQuote]).
//!
//! Segmentation is incremental.  [Segmenter::push] accepts whatever prefix of
//! the input is available and returns [Incomplete] when it cannot decide yet,
//! so that an interactive reader is never asked for more than necessary.

use std::cmp::Ordering;

#[cfg(doc)]
use crate::lex::token::Token;

use crate::{
    identifier::{IdentifierChar, id_match, id_match_n, is_reserved_word},
    prompt::PromptStyle,
};
use bitflags::bitflags;

use super::command_name::{COMMAND_NAMES, command_match};

/// Syntax variant.
///
/// PSPP syntax comes in two variants:
///
/// - In interactive syntax, commands end with a period at the end of the line
///   or with a blank line.
///
/// - In batch syntax, the second and subsequent lines of a command are indented
///   from the left margin.
///
/// [Syntax::Auto] uses a heuristic that is usually right: a line that starts
/// with a recognized command name starts a new command.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Syntax {
    /// Try to interpret input correctly regardless of whether it is written
    /// for interactive or batch syntax.
    #[default]
    Auto,

    /// Interactive syntax.
    Interactive,

    /// Batch syntax.
    Batch,
}

/// The type of a segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Number,
    QuotedString,
    HexString,
    UnicodeString,
    UnquotedString,
    Identifier,

    /// `AND`, `OR`, `NOT`, `EQ`, `GE`, `GT`, `LE`, `LT`, `NE`, `ALL`, `BY`,
    /// `TO`, or `WITH`.
    ReservedWord,

    /// An identifier that starts with `!`.
    MacroId,
    Punct,
    Shbang,
    Spaces,
    Comment,
    Newline,
    CommentCommand,
    DoRepeatCommand,
    DoRepeatOverflow,
    InlineData,
    MacroName,
    MacroBody,
    StartDocument,
    Document,
    StartCommand,
    SeparateCommands,
    EndCommand,
    ExpectedQuote,
    ExpectedExponent,
    UnexpectedChar,
}

impl Segment {
    /// Returns true for segments that end one command and start another.
    pub fn is_command_boundary(self) -> bool {
        matches!(
            self,
            Segment::StartCommand | Segment::SeparateCommands | Segment::EndCommand
        )
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Substate: u8 {
        const START_OF_LINE = 1;
        const START_OF_COMMAND = 2;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Shbang,
    General,
    Comment(CommentPhase),
    Document(DocumentPhase),
    FileLabel(FileLabelPhase),
    DoRepeat(DoRepeatPhase),
    Define(DefinePhase),
    BeginData(BeginDataPhase),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CommentPhase {
    /// Text of a `COMMENT` or `*` command.
    Text,

    /// At the new-line that ends a line of comment.
    Newline,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DocumentPhase {
    /// A line of document text.
    Text,

    /// At the new-line that ends a line of document text.
    Newline,

    /// About to emit the end of the `DOCUMENT` command.
    End,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FileLabelPhase {
    /// Expecting `LABEL` after `FILE`.
    Label,

    /// Spaces before an unquoted label.
    Spaces,

    /// The unquoted label itself.
    Text,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DoRepeatPhase {
    /// The stand-in variable definitions.
    Head,

    /// A blank line between the head and the body.
    Blank,

    /// Lines of the body, inside `nest` levels of `DO REPEAT`.
    Body { nest: u8 },

    /// Nesting went too deep; about to report it.
    Overflow { nest: u8 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DefinePhase {
    /// Expecting the macro name.
    Name,

    /// After the name, expecting `(`.
    Header,

    /// Inside the parameter list, `nest` parentheses deep.
    Params { nest: usize },

    /// The rest of the line that closes the parameter list.
    FirstBodyLine,

    /// A later line of the body.
    BodyLine,

    /// At the new-line after a line of the body.
    Newline,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BeginDataPhase {
    /// In a `BEGIN DATA` command that is split across lines, before the first
    /// new-line.
    SplitCommand,

    /// In the `BEGIN DATA` command, before its final new-line.
    Command,

    /// A line of inline data.
    Line,

    /// At the new-line after a line of inline data.
    Newline,
}

/// Labels PSPP syntax with [Segment] types.
#[derive(Copy, Clone, Debug)]
pub struct Segmenter {
    state: State,
    substate: Substate,
    syntax: Syntax,
}

/// The segmenter needs more input to decide.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Incomplete;

type SegmentResult<'a> = Result<Option<(&'a str, Segment)>, Incomplete>;

impl Segmenter {
    /// Returns a segmenter with the given `syntax`.
    ///
    /// If `is_snippet` is false, the input is treated as a whole file, so that
    /// `-` or `+` at the very beginning separates commands and a leading `#!`
    /// line is a [Segment::Shbang].
    ///
    /// If `is_snippet` is true, the input is treated as an isolated piece of
    /// syntax, so that a leading `-` or `+` is an operator or part of a
    /// number.
    pub fn new(syntax: Syntax, is_snippet: bool) -> Self {
        Self {
            state: if is_snippet {
                State::General
            } else {
                State::Shbang
            },
            substate: Substate::empty(),
            syntax,
        }
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    fn start_of_line(&self) -> bool {
        self.substate.contains(Substate::START_OF_LINE)
    }

    fn start_of_command(&self) -> bool {
        self.substate.contains(Substate::START_OF_COMMAND)
    }

    fn set(&mut self, state: State, substate: Substate) {
        self.state = state;
        self.substate = substate;
    }

    fn first_or_later(&self) -> PromptStyle {
        if self.start_of_command() {
            PromptStyle::First
        } else {
            PromptStyle::Later
        }
    }

    /// Returns the style of prompt to show an interactive user who is asked
    /// for input in the current state.
    ///
    /// This is most accurate with [Syntax::Interactive] and at the beginning
    /// of a line, that is, after [Segmenter::push] consumed as much of the
    /// input as possible up to a new-line.
    pub fn prompt(&self) -> PromptStyle {
        match self.state {
            State::Shbang => PromptStyle::First,
            State::General => self.first_or_later(),
            State::Comment(_) => PromptStyle::Comment,
            State::Document(DocumentPhase::End) => PromptStyle::First,
            State::Document(_) => PromptStyle::Document,
            State::FileLabel(FileLabelPhase::Label) => PromptStyle::Later,
            State::FileLabel(_) => PromptStyle::First,
            State::DoRepeat(DoRepeatPhase::Head | DoRepeatPhase::Blank) => {
                self.first_or_later()
            }
            State::DoRepeat(_) => PromptStyle::DoRepeat,
            State::Define(DefinePhase::Name | DefinePhase::Header | DefinePhase::Params { .. }) => {
                self.first_or_later()
            }
            State::Define(_) => PromptStyle::Define,
            State::BeginData(BeginDataPhase::SplitCommand) => PromptStyle::First,
            State::BeginData(BeginDataPhase::Command) => PromptStyle::Later,
            State::BeginData(_) => PromptStyle::Data,
        }
    }

    fn push_rest<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        if input.is_empty() {
            return if eof { Ok(None) } else { Err(Incomplete) };
        }

        match self.state {
            State::Shbang => self.parse_shbang(input, eof),
            State::General if self.start_of_line() => self.parse_start_of_line(input, eof),
            State::General => self.parse_mid_line(input, eof),
            State::Comment(CommentPhase::Text) => self.parse_comment_text(input, eof),
            State::Comment(CommentPhase::Newline) => self.parse_comment_newline(input, eof),
            State::Document(DocumentPhase::Text) => self.parse_document_text(input, eof),
            State::Document(DocumentPhase::Newline) => self.parse_document_newline(input, eof),
            State::Document(DocumentPhase::End) => self.parse_document_end(input),
            State::FileLabel(FileLabelPhase::Label) => self.parse_file_label(input, eof),
            State::FileLabel(FileLabelPhase::Spaces) => self.parse_file_label_spaces(input, eof),
            State::FileLabel(FileLabelPhase::Text) => self.parse_file_label_text(input, eof),
            State::DoRepeat(DoRepeatPhase::Head) => self.parse_do_repeat_head(input, eof),
            State::DoRepeat(DoRepeatPhase::Blank) => self.parse_do_repeat_blank(input, eof),
            State::DoRepeat(DoRepeatPhase::Body { nest }) => {
                self.parse_do_repeat_body(nest, input, eof)
            }
            State::DoRepeat(DoRepeatPhase::Overflow { nest }) => {
                self.state = State::DoRepeat(DoRepeatPhase::Body { nest });
                Ok(Some((input, Segment::DoRepeatOverflow)))
            }
            State::Define(DefinePhase::Name | DefinePhase::Header) => {
                self.parse_define_header(input, eof)
            }
            State::Define(DefinePhase::Params { nest }) => {
                self.parse_define_params(nest, input, eof)
            }
            State::Define(DefinePhase::FirstBodyLine | DefinePhase::BodyLine) => {
                self.parse_define_body(input, eof)
            }
            State::Define(DefinePhase::Newline) => self.parse_define_newline(input, eof),
            State::BeginData(BeginDataPhase::SplitCommand) => {
                self.parse_begin_data_command(BeginDataPhase::Command, input, eof)
            }
            State::BeginData(BeginDataPhase::Command) => {
                self.parse_begin_data_command(BeginDataPhase::Line, input, eof)
            }
            State::BeginData(BeginDataPhase::Line) => self.parse_begin_data_line(input, eof),
            State::BeginData(BeginDataPhase::Newline) => {
                let rest = expect_newline(input, eof)?;
                self.state = State::BeginData(BeginDataPhase::Line);
                Ok(Some((rest, Segment::Newline)))
            }
        }
    }

    /// Attempts to label a prefix of the remaining input with a segment type.
    /// `input` is a prefix of the remaining input.  If `eof` is true, then
    /// `input` is all of the remaining input.
    ///
    /// The input may contain `\n` or `\r\n` line ends in any combination.
    ///
    /// On success, returns `Ok(Some((n, segment)))`, where `n` is the length of
    /// the segment at the beginning of `input`, in `0..=input.len()`.  The next
    /// call should omit those `n` bytes.  Segments may be empty, in
    /// particular [Segment::StartCommand], [Segment::SeparateCommands],
    /// [Segment::StartDocument], [Segment::InlineData], [Segment::EndCommand],
    /// and [Segment::Spaces].  Returns `Ok(None)` at the end of the input.
    ///
    /// Returns `Err(Incomplete)` if the segment cannot be determined yet.
    /// Then the caller should call again with more input, or with `eof` set to
    /// true if there is no more.  This never happens when `eof` is true.
    ///
    /// Bytes supplied in one call but not consumed must be supplied unchanged
    /// in later calls, because the segmenter looks ahead past the bytes that
    /// it consumes.
    pub fn push(&mut self, input: &str, eof: bool) -> Result<Option<(usize, Segment)>, Incomplete> {
        Ok(self
            .push_rest(input, eof)?
            .map(|(rest, segment)| (input.len() - rest.len(), segment)))
    }
}

fn take(input: &str, eof: bool) -> Result<(Option<char>, &str), Incomplete> {
    let mut iter = input.chars();
    match iter.next() {
        None if !eof => Err(Incomplete),
        c => Ok((c, iter.as_str())),
    }
}

fn skip_comment(mut input: &str, eof: bool) -> Result<&str, Incomplete> {
    loop {
        let (Some(c), rest) = take(input, eof)? else {
            return Ok(input);
        };
        match c {
            '\n' | '\r' if is_end_of_line(input, eof)? => return Ok(input),
            '*' => {
                if let (Some('/'), rest) = take(rest, eof)? {
                    return Ok(rest);
                }
            }
            _ => (),
        };
        input = rest;
    }
}

fn skip_matching<F>(f: F, input: &str, eof: bool) -> Result<&str, Incomplete>
where
    F: Fn(char) -> bool,
{
    let input = input.trim_start_matches(f);
    if input.is_empty() && !eof {
        Err(Incomplete)
    } else {
        Ok(input)
    }
}

fn match_char<F>(f: F, input: &str, eof: bool) -> Result<Option<&str>, Incomplete>
where
    F: Fn(char) -> bool,
{
    match take(input, eof)? {
        (Some(c), rest) if f(c) => Ok(Some(rest)),
        _ => Ok(None),
    }
}

fn skip_spaces(mut input: &str, eof: bool) -> Result<&str, Incomplete> {
    loop {
        let (Some(c), rest) = take(input, eof)? else {
            return Ok(input);
        };
        match c {
            '\r' | '\n' if is_end_of_line(input, eof)? => return Ok(input),
            c if c.is_whitespace() => (),
            _ => return Ok(input),
        }
        input = rest;
    }
}

fn skip_digits(input: &str, eof: bool) -> Result<&str, Incomplete> {
    skip_matching(|c| c.is_ascii_digit(), input, eof)
}

fn skip_spaces_and_comments(mut input: &str, eof: bool) -> Result<&str, Incomplete> {
    loop {
        let (Some(c), rest) = take(input, eof)? else {
            return Ok(input);
        };
        match c {
            '/' => match take(rest, eof)? {
                (Some('*'), rest) => input = skip_comment(rest, eof)?,
                _ => return Ok(input),
            },
            '\r' | '\n' if is_end_of_line(input, eof)? => return Ok(input),
            c if c.is_whitespace() => input = rest,
            _ => return Ok(input),
        };
    }
}

fn is_start_of_string(input: &str, eof: bool) -> Result<bool, Incomplete> {
    let (Some(c), rest) = take(input, eof)? else {
        return Ok(false);
    };
    match c {
        'x' | 'X' | 'u' | 'U' => {
            let (c, _rest) = take(rest, eof)?;
            Ok(c == Some('\'') || c == Some('"'))
        }
        '\'' | '"' => Ok(true),
        '\n' | '\r' if is_end_of_line(input, eof)? => Ok(true),
        _ => Ok(false),
    }
}

fn is_end_of_line(input: &str, eof: bool) -> Result<bool, Incomplete> {
    let (Some(c), rest) = take(input, eof)? else {
        return Ok(true);
    };
    Ok(match c {
        '\n' => true,
        '\r' => take(rest, eof)?.0 == Some('\n'),
        _ => false,
    })
}

fn at_end_of_line(input: &str, eof: bool) -> Result<bool, Incomplete> {
    is_end_of_line(skip_spaces_and_comments(input, eof)?, eof)
}

/// Returns the input following the new-line at the start of `input`, or
/// `None` if `input` doesn't start with a new-line.
fn parse_newline(input: &str, eof: bool) -> Result<Option<&str>, Incomplete> {
    match take(input, eof)? {
        (Some('\n'), rest) => Ok(Some(rest)),
        (Some('\r'), rest) => match take(rest, eof)? {
            (Some('\n'), rest) => Ok(Some(rest)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Like [parse_newline], for states that are only entered at a new-line.
fn expect_newline(input: &str, eof: bool) -> Result<&str, Incomplete> {
    let rest = parse_newline(input, eof)?;
    debug_assert!(rest.is_some(), "expected new-line at {input:?}");
    Ok(rest.unwrap_or(input))
}

/// Returns the input starting at the end of the current line.
fn parse_full_line(mut input: &str, eof: bool) -> Result<&str, Incomplete> {
    loop {
        if is_end_of_line(input, eof)? {
            return Ok(input);
        }
        input = take(input, eof)?.1;
    }
}

fn command_name_candidates(target: &str) -> &'static [&'static str] {
    let Some(first) = target.chars().next().map(|c| c.to_ascii_uppercase()) else {
        return &[];
    };
    let low = COMMAND_NAMES.partition_point(|s| s.chars().next() < Some(first));
    let high = COMMAND_NAMES.partition_point(|s| s.chars().next() <= Some(first));
    &COMMAND_NAMES[low..high]
}

fn detect_command_name(input: &str, eof: bool) -> Result<bool, Incomplete> {
    let command_name = input
        .split(|c: char| {
            !((c.is_whitespace() && c != '\n') || (c.may_continue_id() && c != '.') || c == '-')
        })
        .next()
        .unwrap_or_default();
    if !eof && command_name.len() == input.len() {
        return Err(Incomplete);
    }
    let command_name = command_name.trim_end_matches(|c: char| c.is_whitespace() || c == '.');
    Ok(command_name_candidates(command_name)
        .iter()
        .filter_map(|command| command_match(command, command_name))
        .any(|m| m.missing_words <= 0))
}

fn strip_prefix_ignore_ascii_case<'a>(line: &'a str, pattern: &str) -> Option<&'a str> {
    line.get(..pattern.len()).and_then(|prefix| {
        prefix
            .eq_ignore_ascii_case(pattern)
            .then(|| &line[pattern.len()..])
    })
}

/// Returns the part of `line` starting at `!ENDDEFINE`, skipping over quoted
/// strings and comments, if there is one.
fn find_enddefine(mut input: &str) -> Option<&str> {
    loop {
        input = skip_spaces_and_comments(input, true).ok()?;
        let (Some(c), rest) = take(input, true).ok()? else {
            return None;
        };
        match c {
            '!' if strip_prefix_ignore_ascii_case(input, "!ENDDEFINE").is_some() => {
                return Some(input);
            }
            '\'' | '"' => {
                let index = rest.find(c)?;
                input = &rest[index + 1..];
            }
            _ => input = rest,
        }
    }
}

/// Returns true if `line` is `END DATA`, optionally followed by a period.
fn is_end_data(line: &str) -> bool {
    let Some(rest) = strip_prefix_ignore_ascii_case(line, "END") else {
        return false;
    };
    let mut chars = rest.chars();
    if !chars.next().is_some_and(|c| c.is_whitespace()) {
        return false;
    }
    let Some(rest) = strip_prefix_ignore_ascii_case(chars.as_str(), "DATA") else {
        return false;
    };

    let mut endcmd = false;
    for c in rest.chars() {
        match c {
            '.' if endcmd => return false,
            '.' => endcmd = true,
            c if c.is_whitespace() => (),
            _ => return false,
        }
    }
    true
}

impl Segmenter {
    fn parse_shbang<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        if let (Some('#'), rest) = take(input, eof)? {
            if let (Some('!'), rest) = take(rest, eof)? {
                let rest = parse_full_line(rest, eof)?;
                self.set(State::General, Substate::START_OF_COMMAND);
                return Ok(Some((rest, Segment::Shbang)));
            }
        }

        self.set(
            State::General,
            Substate::START_OF_COMMAND | Substate::START_OF_LINE,
        );
        self.push_rest(input, eof)
    }

    fn at_command_start(&self, input: &str, eof: bool) -> Result<bool, Incomplete> {
        match self.syntax {
            Syntax::Auto => detect_command_name(input, eof),
            Syntax::Interactive => Ok(false),
            Syntax::Batch => Ok(true),
        }
    }

    fn parse_start_of_line<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        debug_assert_eq!(self.state, State::General);
        debug_assert!(self.start_of_line());

        let (Some(c), rest) = take(input, eof)? else {
            return Ok(None);
        };
        match c {
            '+' if is_start_of_string(skip_spaces_and_comments(rest, eof)?, eof)? => {
                // This `+` joins pieces of a string.
                self.substate = Substate::empty();
                return Ok(Some((rest, Segment::Punct)));
            }
            '+' | '-' | '.' => {
                self.substate = Substate::START_OF_COMMAND;
                return Ok(Some((rest, Segment::StartCommand)));
            }
            _ if c.is_whitespace() => {
                if at_end_of_line(input, eof)? {
                    self.substate = Substate::START_OF_COMMAND;
                    return Ok(Some((input, Segment::SeparateCommands)));
                }
            }
            _ => {
                if self.at_command_start(input, eof)? && !self.start_of_command() {
                    self.substate = Substate::START_OF_COMMAND;
                    return Ok(Some((input, Segment::StartCommand)));
                }
            }
        }
        self.substate = Substate::START_OF_COMMAND;
        self.parse_mid_line(input, eof)
    }

    fn punct<'a>(&mut self, rest: &'a str) -> SegmentResult<'a> {
        self.substate = Substate::empty();
        Ok(Some((rest, Segment::Punct)))
    }

    fn parse_mid_line<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        debug_assert!(!self.start_of_line());
        let (Some(c), rest) = take(input, eof)? else {
            return Ok(None);
        };
        match c {
            '\r' | '\n' if is_end_of_line(input, eof)? => {
                self.substate |= Substate::START_OF_LINE;
                let rest = parse_newline(input, eof)?.unwrap_or(rest);
                Ok(Some((rest, Segment::Newline)))
            }
            '/' => {
                if let (Some('*'), rest) = take(rest, eof)? {
                    let rest = skip_comment(rest, eof)?;
                    Ok(Some((rest, Segment::Comment)))
                } else {
                    self.punct(rest)
                }
            }
            '-' => {
                let number = skip_spaces(rest, eof)?;
                match take(number, eof)? {
                    (Some(c), _) if c.is_ascii_digit() => return self.parse_number(number, eof),
                    (Some('.'), after_dot) => {
                        if let (Some(c), _) = take(after_dot, eof)? {
                            if c.is_ascii_digit() {
                                return self.parse_number(number, eof);
                            }
                        }
                    }
                    _ => (),
                }
                self.punct(rest)
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '=' | ';' | ':' | '&' | '|' | '+' => {
                self.punct(rest)
            }
            '*' => {
                if self.start_of_command() {
                    self.set(State::Comment(CommentPhase::Text), Substate::empty());
                    self.parse_comment_text(input, eof)
                } else {
                    self.parse_digraph(&['*'], rest, eof)
                }
            }
            '<' => self.parse_digraph(&['=', '>'], rest, eof),
            '>' | '~' => self.parse_digraph(&['='], rest, eof),
            '.' if at_end_of_line(rest, eof)? => {
                self.substate = Substate::START_OF_COMMAND;
                Ok(Some((rest, Segment::EndCommand)))
            }
            '.' => match take(rest, eof)? {
                (Some(c), _) if c.is_ascii_digit() => self.parse_number(input, eof),
                _ => self.punct(rest),
            },
            '0'..='9' => self.parse_number(input, eof),
            'u' | 'U' => self.maybe_parse_string(Segment::UnicodeString, input, rest, eof),
            'x' | 'X' => self.maybe_parse_string(Segment::HexString, input, rest, eof),
            '\'' | '"' => self.parse_string(Segment::QuotedString, c, rest, eof),
            '!' => match take(rest, eof)? {
                (Some('*'), rest) => self.punct(rest),
                (Some(_), _) => self.parse_id(input, eof),
                (None, _) => self.punct(rest),
            },
            c if c.is_whitespace() => Ok(Some((skip_spaces(rest, eof)?, Segment::Spaces))),
            c if c.may_start_id() => self.parse_id(input, eof),
            '#'..='~' if c != '\\' && c != '^' => self.punct(rest),
            _ => {
                self.substate = Substate::empty();
                Ok(Some((rest, Segment::UnexpectedChar)))
            }
        }
    }

    fn parse_string<'a>(
        &mut self,
        segment: Segment,
        quote: char,
        mut input: &'a str,
        eof: bool,
    ) -> SegmentResult<'a> {
        while let (Some(c), rest) = take(input, eof)? {
            match c {
                _ if c == quote => {
                    let (c, rest2) = take(rest, eof)?;
                    if c != Some(quote) {
                        self.substate = Substate::empty();
                        return Ok(Some((rest, segment)));
                    }
                    input = rest2;
                }
                '\r' | '\n' if is_end_of_line(input, eof)? => break,
                _ => input = rest,
            }
        }
        self.substate = Substate::empty();
        Ok(Some((input, Segment::ExpectedQuote)))
    }

    /// `input` starts with `X`, `x`, `U`, or `u`, and `rest` is what follows.
    fn maybe_parse_string<'a>(
        &mut self,
        segment: Segment,
        input: &'a str,
        rest: &'a str,
        eof: bool,
    ) -> SegmentResult<'a> {
        match take(rest, eof)? {
            (Some(c), rest) if c == '\'' || c == '"' => self.parse_string(segment, c, rest, eof),
            _ => self.parse_id(input, eof),
        }
    }

    /// Returns the next identifier in the current command, plus the input
    /// following it.  Returns an empty identifier if something else comes
    /// first.  Doesn't change the state of `self`.
    fn next_id_in_command<'a>(
        &self,
        mut input: &'a str,
        eof: bool,
    ) -> Result<(&'a str, &'a str), Incomplete> {
        let mut sub = Segmenter::new(self.syntax, true);
        loop {
            let Some((seg_len, segment)) = sub.push(input, eof)? else {
                return Ok((input, input));
            };
            let (text, rest) = input.split_at(seg_len);
            match segment {
                Segment::Shbang | Segment::Spaces | Segment::Comment | Segment::Newline => (),
                Segment::Identifier => return Ok((text, rest)),
                _ => return Ok(("", rest)),
            }
            input = rest;
        }
    }

    fn parse_id<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let (_, mut end) = take(input, eof)?;
        while let (Some(c), rest) = take(end, eof)? {
            if !c.may_continue_id() {
                break;
            };
            end = rest;
        }
        let identifier = &input[..input.len() - end.len()];
        let identifier = match identifier.strip_suffix('.') {
            Some(without_dot) if at_end_of_line(end, eof)? => without_dot,
            _ => identifier,
        };
        let rest = &input[identifier.len()..];

        let segment = if identifier == "!" {
            Segment::Punct
        } else if identifier.starts_with('!') {
            Segment::MacroId
        } else if is_reserved_word(identifier) {
            Segment::ReservedWord
        } else {
            Segment::Identifier
        };

        if self.start_of_command() && segment == Segment::Identifier {
            if id_match_n("COMMENT", identifier, 4) {
                self.set(State::Comment(CommentPhase::Text), Substate::empty());
                return self.parse_comment_text(input, eof);
            } else if id_match("DOCUMENT", identifier) {
                self.set(State::Document(DocumentPhase::Text), Substate::empty());
                return Ok(Some((input, Segment::StartDocument)));
            } else if id_match_n("DEFINE", identifier, 6) {
                self.set(State::Define(DefinePhase::Name), Substate::empty());
                return Ok(Some((rest, Segment::Identifier)));
            } else if id_match("FILE", identifier) {
                if id_match("LABEL", self.next_id_in_command(rest, eof)?.0) {
                    self.set(State::FileLabel(FileLabelPhase::Label), Substate::empty());
                    return Ok(Some((rest, Segment::Identifier)));
                }
            } else if id_match("DO", identifier) {
                if id_match("REPEAT", self.next_id_in_command(rest, eof)?.0) {
                    self.set(State::DoRepeat(DoRepeatPhase::Head), Substate::empty());
                    return Ok(Some((rest, Segment::Identifier)));
                }
            } else if id_match("BEGIN", identifier) {
                let (next_id, rest2) = self.next_id_in_command(rest, eof)?;
                if id_match("DATA", next_id) {
                    let rest2 = skip_spaces_and_comments(rest2, eof)?;
                    let rest2 = match rest2.strip_prefix('.') {
                        Some(s) => skip_spaces_and_comments(s, eof)?,
                        None => rest2,
                    };
                    if is_end_of_line(rest2, eof)? {
                        let command = &input[..input.len() - rest2.len()];
                        let phase = if command.contains('\n') {
                            BeginDataPhase::SplitCommand
                        } else {
                            BeginDataPhase::Command
                        };
                        self.set(State::BeginData(phase), Substate::empty());
                        return Ok(Some((rest, Segment::Identifier)));
                    }
                }
            }
        }

        self.substate = Substate::empty();
        Ok(Some((rest, segment)))
    }

    /// Parses a punctuator that might be followed by one of `seconds` to form
    /// a two-character punctuator.
    fn parse_digraph<'a>(
        &mut self,
        seconds: &[char],
        input: &'a str,
        eof: bool,
    ) -> SegmentResult<'a> {
        let rest = match take(input, eof)? {
            (Some(c), rest) if seconds.contains(&c) => rest,
            _ => input,
        };
        self.punct(rest)
    }

    /// `input` starts with the digits (or `.` and digits) of a number.
    fn parse_number<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let mut input = skip_digits(input, eof)?;
        if let Some(rest) = match_char(|c| c == '.', input, eof)? {
            let rest2 = skip_digits(rest, eof)?;
            if rest2.len() < rest.len() || !at_end_of_line(rest2, eof)? {
                input = rest2;
            }
        };
        if let Some(rest) = match_char(|c| c == 'e' || c == 'E', input, eof)? {
            let rest = match_char(|c| c == '+' || c == '-', rest, eof)?.unwrap_or(rest);
            let rest2 = skip_digits(rest, eof)?;
            if rest2.len() == rest.len() {
                self.substate = Substate::empty();
                return Ok(Some((rest, Segment::ExpectedExponent)));
            }
            input = rest2;
        }
        self.substate = Substate::empty();
        Ok(Some((input, Segment::Number)))
    }

    fn parse_comment_text<'a>(&mut self, mut input: &'a str, eof: bool) -> SegmentResult<'a> {
        enum Line<'a> {
            Blank,
            NotBlank,
            Period(&'a str),
        }
        let mut line = Line::Blank;
        loop {
            let (c, rest) = take(input, eof)?;
            let end_of_line = match c {
                None => true,
                Some('\n' | '\r') => is_end_of_line(input, eof)?,
                Some(_) => false,
            };
            if end_of_line {
                return Ok(Some(match line {
                    Line::Blank => {
                        // A blank line ends the comment.
                        self.set(State::General, Substate::START_OF_COMMAND);
                        (input, Segment::SeparateCommands)
                    }
                    Line::Period(period) => {
                        // So does a period at the end of a line.
                        self.set(State::General, Substate::empty());
                        (period, Segment::CommentCommand)
                    }
                    Line::NotBlank => {
                        self.set(State::Comment(CommentPhase::Newline), Substate::empty());
                        (input, Segment::CommentCommand)
                    }
                }));
            }
            match c {
                Some('.') => line = Line::Period(input),
                Some(c) if c.is_whitespace() => (),
                _ => line = Line::NotBlank,
            }
            input = rest;
        }
    }

    fn parse_comment_newline<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let rest = expect_newline(input, eof)?;
        let new_command = match take(rest, eof)?.0 {
            Some('+') | Some('-') | Some('.') => true,
            Some(c) if !c.is_whitespace() => self.at_command_start(rest, eof)?,
            None | Some(_) => false,
        };
        if new_command {
            self.set(
                State::General,
                Substate::START_OF_LINE | Substate::START_OF_COMMAND,
            );
        } else {
            self.set(State::Comment(CommentPhase::Text), Substate::empty());
        }
        Ok(Some((rest, Segment::Newline)))
    }

    fn parse_document_text<'a>(&mut self, mut input: &'a str, eof: bool) -> SegmentResult<'a> {
        let mut end_cmd = false;
        loop {
            let (Some(c), rest) = take(input, eof)? else {
                self.state = State::Document(DocumentPhase::End);
                return Ok(Some((input, Segment::Document)));
            };
            match c {
                '.' => end_cmd = true,
                '\n' | '\r' if is_end_of_line(input, eof)? => {
                    self.state = State::Document(if end_cmd {
                        DocumentPhase::End
                    } else {
                        DocumentPhase::Newline
                    });
                    return Ok(Some((input, Segment::Document)));
                }
                c if !c.is_whitespace() => end_cmd = false,
                _ => (),
            }
            input = rest;
        }
    }

    fn parse_document_newline<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let rest = expect_newline(input, eof)?;
        self.set(State::Document(DocumentPhase::Text), Substate::empty());
        Ok(Some((rest, Segment::Newline)))
    }

    fn parse_document_end<'a>(&mut self, input: &'a str) -> SegmentResult<'a> {
        self.set(
            State::General,
            Substate::START_OF_COMMAND | Substate::START_OF_LINE,
        );
        Ok(Some((input, Segment::EndCommand)))
    }

    fn quoted_file_label(input: &str, eof: bool) -> Result<bool, Incomplete> {
        let input = skip_spaces_and_comments(input, eof)?;
        Ok(matches!(take(input, eof)?.0, Some('\'' | '"' | '\n')))
    }

    fn parse_file_label<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let mut sub = Segmenter {
            state: State::General,
            ..*self
        };
        let Some((rest, segment)) = sub.push_rest(input, eof)? else {
            return Ok(None);
        };
        if segment == Segment::Identifier {
            debug_assert!(id_match("LABEL", &input[..input.len() - rest.len()]));
            if Self::quoted_file_label(rest, eof)? {
                *self = sub;
            } else {
                self.state = State::FileLabel(FileLabelPhase::Spaces);
            }
        } else {
            self.substate = sub.substate;
        }
        Ok(Some((rest, segment)))
    }

    fn parse_file_label_spaces<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let input = skip_spaces(input, eof)?;
        self.set(State::FileLabel(FileLabelPhase::Text), Substate::empty());
        Ok(Some((input, Segment::Spaces)))
    }

    fn parse_file_label_text<'a>(&mut self, mut input: &'a str, eof: bool) -> SegmentResult<'a> {
        let mut end_cmd = None;
        loop {
            if is_end_of_line(input, eof)? {
                self.set(State::General, Substate::empty());
                return Ok(Some((end_cmd.unwrap_or(input), Segment::UnquotedString)));
            }
            let (c, rest) = take(input, eof)?;
            match c {
                Some('.') => end_cmd = Some(input),
                Some(c) if !c.is_whitespace() => end_cmd = None,
                _ => (),
            }
            input = rest;
        }
    }

    /// Segments `input` as ordinary syntax, updating only `self.substate`.
    fn subparse<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let mut sub = Segmenter {
            syntax: self.syntax,
            state: State::General,
            substate: self.substate,
        };
        let result = sub.push_rest(input, eof)?;
        self.substate = sub.substate;
        Ok(result)
    }

    /// Segments the head of `DO REPEAT`, which defines the stand-in variables,
    /// up to the body to be repeated.
    fn parse_do_repeat_head<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let Some((rest, segment)) = self.subparse(input, eof)? else {
            return Ok(None);
        };
        match segment {
            Segment::SeparateCommands => self.state = State::DoRepeat(DoRepeatPhase::Blank),
            Segment::EndCommand | Segment::StartCommand => {
                self.state = State::DoRepeat(DoRepeatPhase::Body { nest: 1 })
            }
            _ => (),
        }
        Ok(Some((rest, segment)))
    }

    /// Segments a blank line between the head and the body of `DO REPEAT`.
    fn parse_do_repeat_blank<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let Some((rest, segment)) = self.subparse(input, eof)? else {
            return Ok(None);
        };
        if segment == Segment::Newline {
            self.state = State::DoRepeat(DoRepeatPhase::Body { nest: 1 });
        }
        Ok(Some((rest, segment)))
    }

    /// Classifies a line of a `DO REPEAT` body: [Ordering::Greater] for a
    /// nested `DO REPEAT`, [Ordering::Less] for `END REPEAT`.
    fn check_repeat_command(&self, input: &str, eof: bool) -> Result<Ordering, Incomplete> {
        let input = input.strip_prefix(['-', '+']).unwrap_or(input);
        let (id1, input) = self.next_id_in_command(input, eof)?;
        let repeat = |input| -> Result<bool, Incomplete> {
            Ok(id_match("REPEAT", self.next_id_in_command(input, eof)?.0))
        };
        if id_match("DO", id1) && repeat(input)? {
            Ok(Ordering::Greater)
        } else if id_match("END", id1) && repeat(input)? {
            Ok(Ordering::Less)
        } else {
            Ok(Ordering::Equal)
        }
    }

    /// Segments the body of `DO REPEAT`, reporting each line as a single
    /// [Segment::DoRepeatCommand].  Nested `DO REPEAT...END REPEAT` blocks
    /// are tracked with `nest`, which starts at 1.
    fn parse_do_repeat_body<'a>(
        &mut self,
        nest: u8,
        input: &'a str,
        eof: bool,
    ) -> SegmentResult<'a> {
        if let Some(rest) = parse_newline(input, eof)? {
            return Ok(Some((rest, Segment::Newline)));
        }
        let rest = parse_full_line(input, eof)?;
        match self.check_repeat_command(input, eof)? {
            Ordering::Greater => {
                self.state = State::DoRepeat(match nest.checked_add(1) {
                    Some(nest) => DoRepeatPhase::Body { nest },
                    None => DoRepeatPhase::Overflow { nest },
                });
            }
            Ordering::Less if nest <= 1 => {
                // That's the end of the outermost body.
                self.set(
                    State::General,
                    Substate::START_OF_COMMAND | Substate::START_OF_LINE,
                );
                return self.push_rest(input, eof);
            }
            Ordering::Less => {
                self.state = State::DoRepeat(DoRepeatPhase::Body { nest: nest - 1 })
            }
            Ordering::Equal => (),
        }
        Ok(Some((rest, Segment::DoRepeatCommand)))
    }

    /// Segments the start of a `DEFINE` command, which consists of:
    ///
    ///   - The `DEFINE` keyword.
    ///
    ///   - An identifier, which becomes [Segment::MacroName] instead of
    ///     [Segment::Identifier] because it must never be macro-expanded.
    ///
    ///   - Anything but `(`.
    ///
    ///   - `(` followed by a sequence of tokens possibly including balanced
    ///     parentheses up to a final `)`.
    ///
    ///   - Any number of lines of body, ending with `!ENDDEFINE`.  The first
    ///     line is usually blank, and the last line usually just has
    ///     `!ENDDEFINE.`, but the whole command can be on a single line.
    fn parse_define_header<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let Some((rest, segment)) = self.subparse(input, eof)? else {
            return Ok(None);
        };
        match segment {
            Segment::Identifier | Segment::MacroId
                if self.state == State::Define(DefinePhase::Name) =>
            {
                self.state = State::Define(DefinePhase::Header);
                return Ok(Some((rest, Segment::MacroName)));
            }
            _ if segment.is_command_boundary() => {
                // Malformed: the command ended without a `(`.
                self.state = State::General;
            }
            Segment::Punct if input.starts_with('(') => {
                self.state = State::Define(DefinePhase::Params { nest: 1 });
            }
            _ => (),
        }
        Ok(Some((rest, segment)))
    }

    fn parse_define_params<'a>(
        &mut self,
        nest: usize,
        input: &'a str,
        eof: bool,
    ) -> SegmentResult<'a> {
        let Some((rest, segment)) = self.subparse(input, eof)? else {
            return Ok(None);
        };
        match segment {
            _ if segment.is_command_boundary() => {
                // Malformed: the command ended inside the parameter list.
                self.state = State::General;
            }
            Segment::Punct if input.starts_with('(') => {
                self.state = State::Define(DefinePhase::Params { nest: nest + 1 });
            }
            Segment::Punct if input.starts_with(')') => {
                if nest <= 1 {
                    self.set(State::Define(DefinePhase::FirstBodyLine), Substate::empty());
                } else {
                    self.state = State::Define(DefinePhase::Params { nest: nest - 1 });
                }
            }
            _ => (),
        }
        Ok(Some((rest, segment)))
    }

    /// Segments a line of macro body, or the `!ENDDEFINE` that ends it.
    fn parse_define_body<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let rest = parse_full_line(input, eof)?;
        let line = &input[..input.len() - rest.len()];
        if let Some(end) = find_enddefine(line) {
            self.set(State::General, Substate::empty());
            let (prefix, rest) = input.split_at(line.len() - end.len());
            if prefix.is_empty() {
                // Line starts with `!ENDDEFINE`.
                self.push_rest(input, eof)
            } else if prefix.trim_start().is_empty() {
                Ok(Some((rest, Segment::Spaces)))
            } else {
                Ok(Some((rest, Segment::MacroBody)))
            }
        } else {
            // A blank first line isn't significant, so report it as spaces or
            // not at all.  Blank later lines are part of the body.
            let first = self.state == State::Define(DefinePhase::FirstBodyLine);
            let segment = if first && line.trim_start().is_empty() {
                if line.is_empty() {
                    return self.parse_define_newline(input, eof);
                }
                Segment::Spaces
            } else {
                Segment::MacroBody
            };
            self.state = State::Define(DefinePhase::Newline);
            Ok(Some((rest, segment)))
        }
    }

    fn parse_define_newline<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let rest = expect_newline(input, eof)?;
        self.state = State::Define(DefinePhase::BodyLine);
        Ok(Some((rest, Segment::Newline)))
    }

    /// Segments the `BEGIN DATA` command itself, moving to `next` at the
    /// following new-line.
    fn parse_begin_data_command<'a>(
        &mut self,
        next: BeginDataPhase,
        input: &'a str,
        eof: bool,
    ) -> SegmentResult<'a> {
        let Some((rest, segment)) = self.subparse(input, eof)? else {
            return Ok(None);
        };
        if segment == Segment::Newline {
            self.state = State::BeginData(next);
        }
        Ok(Some((rest, segment)))
    }

    fn parse_begin_data_line<'a>(&mut self, input: &'a str, eof: bool) -> SegmentResult<'a> {
        let rest = parse_full_line(input, eof)?;
        let line = &input[..input.len() - rest.len()];
        if is_end_data(line) {
            self.set(
                State::General,
                Substate::START_OF_COMMAND | Substate::START_OF_LINE,
            );
            self.push_rest(input, eof)
        } else {
            self.state = State::BeginData(BeginDataPhase::Newline);
            Ok(Some((rest, Segment::InlineData)))
        }
    }
}

#[cfg(test)]
mod test;
