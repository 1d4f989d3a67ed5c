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

//! High-level lexical analysis.
//!
//! A [Lexer] reads syntax from a stack of [Reader]s and presents it to a
//! command parser as a current token plus lookahead within the current
//! command.  Each [Source] runs its tokens through a three-stage pipeline:
//!
//! - `pp`: tokens fresh from the segmenter and scanner, which still need to
//!   pass through the macro expander.
//!
//! - `merge`: tokens after macro expansion, which still need to pass through
//!   [merge_tokens] to fuse `-` `5` into `-5` and `'a' + 'b'` into `'ab'`.
//!
//! - `parse`: tokens available to the client.  These live until the whole
//!   command has been consumed.
//!
//! Tokens are only pulled through the pipeline when the client asks for them,
//! so that an interactive reader is not asked for a line before it is needed.

use std::{
    borrow::Borrow,
    cell::RefCell,
    collections::VecDeque,
    fmt::{Debug, Formatter, Result as FmtResult},
    mem::take,
    ops::Range,
    sync::Arc,
};

use encoding_rs::Encoding;
use tracing::{debug, error, info, trace, warn};
use unicode_width::UnicodeWidthStr;

use crate::{
    identifier::Identifier,
    macros::{
        Macro, MacroSet, MacroToken, ParseStatus, Parser, macro_tokens_to_syntax_with_ranges,
    },
    message::{Category, Diagnostic, Location, Point, Severity, ellipsize_to},
    settings::MacroSettings,
};

use super::{
    reader::{ErrorHandling, Reader, ReaderOptions},
    scan::{MergeAction, ScanToken, StringScanner, merge_tokens, token_from_segment},
    segment::{Incomplete, Segment, Segmenter, Syntax},
    token::Token,
};

#[cfg(test)]
mod test;

/// Something the lexer produces besides tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// A line of syntax read from a source, without its line end.  Each line
    /// is output once, as soon as the lexer has read all of it.
    Syntax(String),

    /// The syntax that a macro call expanded into, if
    /// [MacroSettings::print_expansions] is on.
    MacroExpansion(String),

    Diagnostic(Diagnostic),
}

/// Output sink used by a [Lexer] until [Lexer::set_output] replaces it.
fn log_output(output: Output) {
    match output {
        Output::Syntax(line) => info!(target: "pspp_lexer::syntax", "{line}"),
        Output::MacroExpansion(expansion) => info!(target: "pspp_lexer::mprint", "{expansion}"),
        Output::Diagnostic(diagnostic) if diagnostic.severity == Severity::Error => {
            error!("{diagnostic}")
        }
        Output::Diagnostic(diagnostic) => warn!("{diagnostic}"),
    }
}

/// Output produced while pulling tokens through the pipeline.
///
/// Diagnostics are held back until the client's request completes, so that
/// errors found while looking ahead are reported after the syntax lines that
/// contain them.
#[derive(Default)]
struct Pending {
    output: Vec<Output>,
    messages: Vec<Diagnostic>,
}

/// What a [Source] needs from its [Lexer] to pull tokens.
struct Context<'a> {
    macros: &'a MacroSet,
    settings: &'a MacroSettings,
    pending: &'a mut Pending,
}

trait StripNewline {
    fn strip_newline(&self) -> &str;
}

impl StripNewline for str {
    fn strip_newline(&self) -> &str {
        self.strip_suffix("\r\n")
            .unwrap_or(self.strip_suffix('\n').unwrap_or(self))
    }
}

/// Returns the first line in `s`, including its new-line, or all of `s` if it
/// has no new-line.
fn first_line(s: &str) -> &str {
    match s.find('\n') {
        Some(index) => &s[..=index],
        None => s,
    }
}

/// A token in a [Source].
///
/// This relates a token back to where it was read, which allows for better
/// error reporting.
#[derive(Clone)]
pub struct LexToken {
    /// The token.
    pub token: Token,

    /// For a token obtained through the lexer in an ordinary way, this is the
    /// location of the token in the [Source]'s buffer.
    ///
    /// For a token produced through macro expansion, this is the entire macro
    /// call.
    pos: Range<usize>,

    /// For a token obtained through macro expansion, the part of the macro
    /// expansion that represents this token.
    ///
    /// For a token obtained through the lexer in an ordinary way, this is
    /// `None`.
    macro_rep: Option<MacroRepresentation>,
}

#[derive(Clone)]
struct MacroRepresentation {
    /// An entire macro expansion, shared by all of the tokens in it.
    expansion: Arc<String>,

    /// The substring of `expansion` that represents a single token.
    pos: Range<usize>,
}

static END_TOKEN: LexToken = LexToken::new(Token::End, 0..0);
static STOP_TOKEN: LexToken = LexToken::new(Token::Stop, 0..0);

impl LexToken {
    const fn new(token: Token, pos: Range<usize>) -> Self {
        Self {
            token,
            pos,
            macro_rep: None,
        }
    }

    /// Returns true if this token was produced by macro expansion.
    pub fn is_from_macro(&self) -> bool {
        self.macro_rep.is_some()
    }

    /// Returns true if `self` and `other` both came from the same macro
    /// expansion, or both came directly from the source.
    fn same_origin(&self, other: &LexToken) -> bool {
        match (&self.macro_rep, &other.macro_rep) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(&a.expansion, &b.expansion),
            _ => false,
        }
    }
}

impl Debug for LexToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.token.fmt(f)
    }
}

impl Borrow<Token> for LexToken {
    fn borrow(&self) -> &Token {
        &self.token
    }
}

/// A [Reader] plus everything needed to turn its text into tokens.
pub struct Source {
    reader: Box<dyn Reader>,
    segmenter: Segmenter,

    /// The reader has reported end of input.
    reader_eof: bool,

    /// The final token has been added to `pp`.
    eof: bool,

    /// Text read from `reader` that is still needed, starting at byte offset
    /// `base` in the source as a whole.  All the other offsets in a `Source`
    /// are relative to the source as a whole.
    buffer: String,
    base: usize,

    /// First byte not yet output as [Output::Syntax].
    journal_pos: usize,

    /// First byte not yet segmented.
    seg_pos: usize,

    /// Offsets of the starts of the lines in `buffer`.  Never empty.
    lines: Vec<usize>,

    /// Line number of `lines[0]`, or 0 if the source doesn't have line
    /// numbers.
    first_line: i32,

    suppress_next_newline: bool,

    pp: VecDeque<LexToken>,
    merge: VecDeque<LexToken>,
    parse: Vec<LexToken>,
    parse_ofs: usize,
}

impl Source {
    fn new(reader: Box<dyn Reader>) -> Self {
        let options = reader.options();
        Self {
            segmenter: Segmenter::new(options.syntax, false),
            first_line: options.line_number.max(0),
            reader,
            reader_eof: false,
            eof: false,
            buffer: String::new(),
            base: 0,
            journal_pos: 0,
            seg_pos: 0,
            lines: vec![0],
            suppress_next_newline: false,
            pp: VecDeque::new(),
            merge: VecDeque::new(),
            parse: vec![LexToken::new(Token::End, 0..0)],
            parse_ofs: 0,
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        self.reader.options()
    }

    pub fn file_name(&self) -> Option<&Arc<String>> {
        self.options().file_name.as_ref()
    }

    pub fn syntax(&self) -> Syntax {
        self.options().syntax
    }

    pub fn error_handling(&self) -> ErrorHandling {
        self.options().error_handling
    }

    fn end(&self) -> usize {
        self.base + self.buffer.len()
    }

    fn text(&self, range: Range<usize>) -> &str {
        self.buffer
            .get(range.start.saturating_sub(self.base)..range.end.saturating_sub(self.base))
            .unwrap_or_default()
    }

    /// Reads at least one more line from the reader, unless it reaches end of
    /// input first.
    fn read(&mut self, pending: &mut Pending) {
        loop {
            let prompt = self.segmenter.prompt();
            match self.reader.read(&mut self.buffer, prompt) {
                Ok(0) => break,
                Ok(_) if self.text(self.seg_pos..self.end()).contains('\n') => return,
                Ok(_) => (),
                Err(error) => {
                    let name = self
                        .file_name()
                        .map_or_else(|| String::from("syntax"), |name| name.to_string());
                    warn!("error reading {name}: {error}");
                    pending.messages.push(
                        Diagnostic::new(
                            Severity::Error,
                            Category::General,
                            format!("Error reading `{name}': {error}."),
                        )
                        .with_location(Location {
                            file_name: self.file_name().cloned(),
                            ..Location::default()
                        }),
                    );
                    break;
                }
            }
        }
        self.reader_eof = true;
    }

    /// Outputs complete lines of syntax after `segment`.
    ///
    /// A line is output when the segmenter reaches its end, except that the
    /// end of a command outputs the line that contains it right away.  The
    /// following new-line then doesn't output anything, since its line is
    /// already out.
    fn journal(&mut self, segment: Segment, output: &mut Vec<Output>) {
        let mut n_lines = usize::from(segment == Segment::Newline);
        if segment == Segment::EndCommand && !self.suppress_next_newline {
            n_lines += 1;
            self.suppress_next_newline = true;
        } else if n_lines > 0 && self.suppress_next_newline {
            n_lines -= 1;
            self.suppress_next_newline = false;
        }
        for _ in 0..n_lines {
            let line = first_line(self.text(self.journal_pos..self.end()));
            let len = line.len();
            output.push(Output::Syntax(line.strip_newline().into()));
            self.journal_pos += len;
        }
    }

    /// Outputs the last line of the source, if it lacked a new-line.
    fn journal_rest(&mut self, output: &mut Vec<Output>) {
        let rest = self.text(self.journal_pos..self.end());
        output.extend(rest.lines().map(|line| Output::Syntax(line.into())));
        self.journal_pos = self.end();
    }

    /// Attempts to add a token to `pp`, reading more from the reader if
    /// necessary.  Returns true if a token was added.  The caller should retry
    /// on failure, unless `self.eof` is now true.
    fn try_get_pp(&mut self, cx: &mut Context) -> bool {
        let segment = loop {
            let input = &self.buffer[self.seg_pos - self.base..];
            match self.segmenter.push(input, self.reader_eof) {
                Ok(segment) => break segment,
                Err(Incomplete) if !self.reader_eof => self.read(cx.pending),
                Err(Incomplete) => break None,
            }
        };

        let Some((seg_len, segment)) = segment else {
            // End of input becomes the end of the final command.
            trace!("end of input");
            self.journal_rest(&mut cx.pending.output);
            self.eof = true;
            self.pp
                .push_back(LexToken::new(Token::End, self.seg_pos..self.seg_pos));
            return true;
        };

        let pos = self.seg_pos..self.seg_pos + seg_len;
        self.seg_pos = pos.end;
        if segment == Segment::Newline {
            self.lines.push(self.seg_pos);
        }
        self.journal(segment, &mut cx.pending.output);

        let text = self.text(pos.clone());
        trace!(?segment, text, "segment");
        match token_from_segment(text, segment) {
            None => false,
            Some(ScanToken::Token(token)) => {
                self.pp.push_back(LexToken::new(token, pos));
                true
            }
            Some(ScanToken::Error(error)) => {
                let location = self.location(&pos, &pos);
                let diagnostic = self.diagnostic(Severity::Error, location, error.to_string());
                cx.pending.messages.push(diagnostic);
                false
            }
        }
    }

    fn get_pp(&mut self, cx: &mut Context) -> bool {
        while !self.eof {
            if self.try_get_pp(cx) {
                return true;
            }
        }
        false
    }

    /// Attempts to add at least one token to `merge`, expanding a macro call
    /// at the start of `pp` if there is one.  Returns true if any token was
    /// added.
    fn try_get_merge(&mut self, cx: &mut Context) -> bool {
        if self.pp.is_empty() && !self.get_pp(cx) {
            return false;
        }

        if !cx.settings.expand || cx.macros.is_empty() {
            self.merge.extend(self.pp.drain(..));
            return true;
        }

        // Now pass tokens one-by-one to the macro expander.
        //
        // In the common case where there is no macro to expand, the loop is
        // not entered.
        let Some(mut parser) = Parser::new(cx.macros, &self.pp[0].token) else {
            self.merge.extend(self.pp.pop_front());
            return true;
        };
        let messages = RefCell::new(Vec::new());
        let error = |diagnostic: Diagnostic| messages.borrow_mut().push(diagnostic);
        let mut ofs = 1;
        while parser.status() == ParseStatus::Incomplete {
            if self.pp.len() <= ofs && !self.get_pp(cx) {
                break;
            }
            let token = &self.pp[ofs];
            let mt = MacroToken::new(token.token.clone(), self.text(token.pos.clone()));
            let location = self.token_location(token, token);
            parser.push(&mt, Some(&location), &error);
            ofs += 1;
        }
        let call = parser.finish();
        let n_call = call.len().min(self.pp.len());

        // The first `n_call` tokens in `pp`, from `c0` to `c1` inclusive, are
        // a macro call.  Expand them.
        let c0 = &self.pp[0];
        let c1 = &self.pp[n_call - 1];
        let call_pos = c0.pos.start..c1.pos.end;
        let mut expansion = Vec::new();
        call.expand(
            self.segmenter.syntax(),
            self.token_location(c0, c1),
            cx.settings,
            &mut expansion,
            &error,
        );
        debug!(
            name = %call.macro_().name,
            n_call,
            n_expansion = expansion.len(),
            "expanded macro call"
        );

        // Convert the expansion into syntax for error messages.
        let (syntax, ranges) = macro_tokens_to_syntax_with_ranges(&expansion);
        if cx.settings.print_expansions {
            cx.pending.output.push(Output::MacroExpansion(syntax.clone()));
        }

        let expanded = !expansion.is_empty();
        let syntax = Arc::new(syntax);
        for (mt, pos) in expansion.into_iter().zip(ranges) {
            self.merge.push_back(LexToken {
                token: mt.token,
                pos: call_pos.clone(),
                macro_rep: Some(MacroRepresentation {
                    expansion: Arc::clone(&syntax),
                    pos,
                }),
            });
        }
        self.pp.drain(..n_call);
        self.defer_macro_messages(messages.take(), cx.pending);
        expanded
    }

    /// Adds `messages` from the macro expander to `pending`, with the lines
    /// of source that they refer to.
    fn defer_macro_messages(&self, messages: Vec<Diagnostic>, pending: &mut Pending) {
        for diagnostic in messages {
            let diagnostic = if diagnostic.source.is_empty()
                && diagnostic.location.file_name.as_ref() == self.file_name()
            {
                let source = self.source_lines(&diagnostic.location);
                diagnostic.with_source(source)
            } else {
                diagnostic
            };
            pending.messages.push(diagnostic);
        }
    }

    fn get_merge(&mut self, cx: &mut Context) -> bool {
        while !self.eof || !self.pp.is_empty() {
            if self.try_get_merge(cx) {
                return true;
            }
        }
        false
    }

    /// Attempts to add a token to `parse`.  Returns false if the source is
    /// exhausted.
    fn get_parse(&mut self, cx: &mut Context) -> bool {
        let mut exhausted = false;
        loop {
            let merge = &self.merge;
            let action = merge_tokens(|index| match merge.get(index) {
                Some(token) => Ok(Some(&token.token)),
                None if exhausted => Ok(None),
                None => Err(Incomplete),
            });
            match action {
                Ok(None) => return false,
                Ok(Some(MergeAction::Copy)) => {
                    if let Some(token) = self.merge.pop_front() {
                        trace!(token = ?token.token, "parse");
                        self.parse.push(token);
                    }
                    return true;
                }
                Ok(Some(MergeAction::Expand { n, token })) => {
                    let first = &self.merge[0];
                    let last = &self.merge[n - 1];

                    // This works if the tokens all came from the source, or
                    // if they all came from the same macro expansion.
                    // Otherwise, it gives up on the macro representation.
                    let macro_rep = match (&first.macro_rep, &last.macro_rep) {
                        (Some(a), Some(b)) if Arc::ptr_eq(&a.expansion, &b.expansion) => {
                            Some(MacroRepresentation {
                                expansion: Arc::clone(&a.expansion),
                                pos: a.pos.start..b.pos.end,
                            })
                        }
                        _ => None,
                    };
                    let merged = LexToken {
                        token,
                        pos: first.pos.start..last.pos.end,
                        macro_rep,
                    };
                    trace!(token = ?merged.token, n, "parse (merged)");
                    self.merge.drain(..n);
                    self.parse.push(merged);
                    return true;
                }
                Err(Incomplete) => {
                    if !self.get_merge(cx) {
                        exhausted = true;
                    }
                }
            }
        }
    }

    /// Pulls tokens into `parse` until it contains offset `ofs` or the end of
    /// the command.
    fn fill(&mut self, ofs: usize, cx: &mut Context) {
        while ofs >= self.parse.len() {
            if self
                .parse
                .last()
                .is_some_and(|token| token.token.is_terminator())
                || !self.get_parse(cx)
            {
                break;
            }
        }
    }

    /// Makes sure that there is a current token.  Returns false if the
    /// source is exhausted.
    fn fill_current(&mut self, cx: &mut Context) -> bool {
        while self.parse_ofs >= self.parse.len() {
            if !self.get_parse(cx) {
                return false;
            }
        }
        true
    }

    /// Consumes the current token.
    fn advance(&mut self) {
        if let Some(token) = self.parse.get(self.parse_ofs) {
            if token.token == Token::End {
                self.clear_parse();
            } else {
                self.parse_ofs += 1;
            }
        }
    }

    fn ofs_token(&self, ofs: usize) -> &LexToken {
        self.parse
            .get(ofs)
            .or(self.parse.last())
            .unwrap_or(&END_TOKEN)
    }

    fn clear_parse(&mut self) {
        self.parse.clear();
        self.parse_ofs = 0;
        self.trim();
    }

    /// Drops the text of lines that nothing refers to anymore.
    fn trim(&mut self) {
        let keep = self
            .pp
            .iter()
            .chain(&self.merge)
            .chain(&self.parse)
            .map(|token| token.pos.start)
            .chain([self.journal_pos, self.seg_pos])
            .min()
            .unwrap_or(self.seg_pos);
        let index = self
            .lines
            .partition_point(|&start| start <= keep)
            .max(1)
            - 1;
        if index > 0 {
            let cut = self.lines[index];
            self.buffer.drain(..cut - self.base);
            self.base = cut;
            self.lines.drain(..index);
            if self.first_line > 0 {
                self.first_line += index as i32;
            }
        }
    }

    /// Discards all buffered input and tokens, leaving an `End` token as the
    /// current token.
    fn reset(&mut self) {
        if self.first_line > 0 {
            let last_start = self.lines.last().copied().unwrap_or(self.base);
            let unnumbered = self.text(last_start..self.end()).matches('\n').count();
            self.first_line += (self.lines.len() - 1 + unnumbered) as i32;
        }
        self.buffer.clear();
        self.base = 0;
        self.journal_pos = 0;
        self.seg_pos = 0;
        self.lines = vec![0];
        self.suppress_next_newline = false;
        self.segmenter = Segmenter::new(self.segmenter.syntax(), false);
        self.pp.clear();
        self.merge.clear();
        self.parse.clear();
        self.parse_ofs = 0;
        self.parse.push(LexToken::new(Token::End, 0..0));
    }

    fn offset_to_point(&self, offset: usize) -> Point {
        let index = self
            .lines
            .partition_point(|&line_start| line_start <= offset)
            .max(1);
        Point {
            line: self.first_line + index as i32 - 1,
            column: Some(self.text(self.lines[index - 1]..offset).width() as i32 + 1),
        }
    }

    /// Returns the location from the start of `start` to the end of `end`.
    fn location(&self, start: &Range<usize>, end: &Range<usize>) -> Location {
        let file_name = self.file_name().cloned();
        if self.first_line == 0 {
            return Location {
                file_name,
                ..Location::default()
            };
        }
        let end = if end.is_empty() {
            let point = self.offset_to_point(end.start);
            Point::new(point.line, point.column.map(|column| column + 1))
        } else {
            self.offset_to_point(end.end)
        };
        Location::new(file_name, self.offset_to_point(start.start)..end)
    }

    fn token_location(&self, t0: &LexToken, t1: &LexToken) -> Location {
        self.location(&t0.pos, &t1.pos)
    }

    /// Returns the syntax for 1-based line number `line_number`, if it is
    /// still available.
    fn get_line(&self, line_number: i32) -> Option<&str> {
        let index = usize::try_from(line_number - self.first_line).ok()?;
        let start = *self.lines.get(index)?;
        let end = match self.lines.get(index + 1) {
            Some(&end) => end,
            None => start + first_line(self.text(start..self.end())).len(),
        };
        Some(self.text(start..end).strip_newline())
    }

    fn source_lines(&self, location: &Location) -> Vec<(i32, String)> {
        let Some(span) = &location.span else {
            return Vec::new();
        };
        let l0 = span.start.line;
        let l1 = span.end.line;
        let lines = if l1 - l0 > 3 {
            vec![l0, l0 + 1, l1]
        } else {
            (l0..=l1).collect()
        };
        lines
            .into_iter()
            .filter_map(|line_number| {
                self.get_line(line_number)
                    .map(|line| (line_number, line.to_string()))
            })
            .collect()
    }

    fn diagnostic(&self, severity: Severity, location: Location, text: String) -> Diagnostic {
        let source = self.source_lines(&location);
        Diagnostic::new(severity, Category::Syntax, text)
            .with_location(location)
            .with_source(source)
    }

    /// Returns the syntax for tokens `ofs0` through `ofs1`, inclusive, in the
    /// current command.
    ///
    /// Runs of tokens read directly from the source are represented by their
    /// original text, including comments and white space between them, and
    /// runs of tokens from a single macro expansion by the text of that
    /// expansion.  Runs are separated by a single space.
    fn representation(&self, ofs0: usize, ofs1: usize) -> String {
        let mut s = String::new();
        let mut i = ofs0;
        while i <= ofs1 {
            let first = self.ofs_token(i);
            let mut j = i + 1;
            while j <= ofs1 && first.same_origin(self.ofs_token(j)) {
                j += 1;
            }
            let last = self.ofs_token(j - 1);

            if !s.is_empty() {
                s.push(' ');
            }
            match (&first.macro_rep, &last.macro_rep) {
                (Some(a), Some(b)) => s.push_str(
                    a.expansion
                        .get(a.pos.start..b.pos.end)
                        .unwrap_or_default(),
                ),
                _ => s.push_str(self.text(first.pos.start..last.pos.end)),
            }
            i = j;
        }
        s
    }

    /// If tokens `ofs0` through `ofs1` include any that came from a macro
    /// expansion, returns the original syntax that they came from (the macro
    /// call and not its expansion).
    fn macro_call(&self, ofs0: usize, ofs1: usize) -> Option<&str> {
        let ofs1 = ofs1.max(ofs0);
        if !(ofs0..=ofs1).any(|ofs| self.ofs_token(ofs).is_from_macro()) {
            return None;
        }
        let start = self.ofs_token(ofs0).pos.start;
        let end = self.ofs_token(ofs1).pos.end;
        Some(self.text(start..end))
    }

    fn message(&self, severity: Severity, ofs0: usize, ofs1: usize, text: &str) -> Diagnostic {
        let mut s = match self.macro_call(ofs0, ofs1) {
            Some(call) => format!("In syntax expanded from `{}': ", ellipsize_to(call, 64)),
            None => String::new(),
        };
        s.push_str(if text.is_empty() { "Syntax error." } else { text });
        if !s.ends_with('.') {
            s.push('.');
        }
        let location = self.token_location(self.ofs_token(ofs0), self.ofs_token(ofs1));
        self.diagnostic(severity, location, s)
    }
}

/// Returns true if `actual` matches `expected`, allowing an identifier in
/// `actual` to abbreviate an identifier in `expected`.
fn tokens_match(actual: &Token, expected: &Token) -> bool {
    match (actual, expected) {
        (Token::Id(actual), Token::Id(expected)) => actual.matches_keyword(expected.as_str()),
        _ => actual == expected,
    }
}

/// The lexer.
///
/// The current token is [Token::End] until the client first calls
/// [Lexer::get], and [Token::Stop] once all of the sources are exhausted.
///
/// Offsets (`ofs`) count tokens from the start of the current command.
/// Relative positions (`n`) count tokens from the current token, so that `0`
/// is the current token and `1` the next.
pub struct Lexer {
    sources: VecDeque<Source>,
    macros: MacroSet,
    settings: MacroSettings,
    pending: Pending,
    output: Box<dyn FnMut(Output)>,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Self::with_settings(MacroSettings::default())
    }

    pub fn with_settings(settings: MacroSettings) -> Self {
        Self {
            sources: VecDeque::new(),
            macros: MacroSet::new(),
            settings,
            pending: Pending::default(),
            output: Box::new(log_output),
        }
    }

    /// Sends the lexer's journaled syntax, macro expansions, and diagnostics
    /// to `output` instead of logging them.
    pub fn set_output(&mut self, output: impl FnMut(Output) + 'static) {
        self.output = Box::new(output);
    }

    pub fn settings(&self) -> &MacroSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut MacroSettings {
        &mut self.settings
    }

    pub fn macros(&self) -> &MacroSet {
        &self.macros
    }

    /// Adds `macro_` to the macros that the lexer expands, replacing any
    /// existing macro with the same name.
    pub fn define_macro(&mut self, macro_: Macro) {
        debug!(name = %macro_.name, "defining macro");
        self.macros.define(macro_);
    }

    /// Inserts `reader` so that the next token comes from it.  The current
    /// token should be [Token::End].
    pub fn include(&mut self, reader: Box<dyn Reader>) {
        debug_assert!(self.sources.is_empty() || *self.token() == Token::End);
        self.sources.push_front(Source::new(reader));
    }

    /// Appends `reader`, so that it is read after all the current sources.
    pub fn append(&mut self, reader: Box<dyn Reader>) {
        self.sources.push_back(Source::new(reader));
    }

    /// The source that the current token came from.
    pub fn source(&self) -> Option<&Source> {
        self.sources.front()
    }

    /// Advances to the next token, consuming the current one.
    pub fn get(&mut self) {
        let Self {
            sources,
            macros,
            settings,
            pending,
            ..
        } = self;
        if let Some(source) = sources.front_mut() {
            source.advance();
        }
        while let Some(source) = sources.front_mut() {
            let mut cx = Context {
                macros: &*macros,
                settings: &*settings,
                pending: &mut *pending,
            };
            if source.fill_current(&mut cx) {
                break;
            }
            debug!(file_name = ?source.file_name(), "end of source");
            sources.pop_front();
        }
        self.flush();
        trace!(token = ?self.token(), "get");
    }

    /// Advances by `n` tokens.
    pub fn get_n(&mut self, n: usize) {
        for _ in 0..n {
            self.get();
        }
    }

    /// The current token.
    pub fn token(&self) -> &Token {
        &self
            .sources
            .front()
            .and_then(|source| source.parse.get(source.parse_ofs))
            .unwrap_or(&STOP_TOKEN)
            .token
    }

    /// Returns the token `n` after the current one.  Lookahead stops at the
    /// end of the command: past that, this returns the command's final token.
    pub fn next(&mut self, n: isize) -> &Token {
        &self.next_lex(n).token
    }

    /// Offset of the current token within the current command.
    pub fn ofs(&self) -> usize {
        self.sources.front().map_or(0, |source| source.parse_ofs)
    }

    pub fn ofs_token(&mut self, ofs: usize) -> &Token {
        &self.ofs_lex(ofs).token
    }

    /// Returns the offset of the last token in the current command.
    pub fn max_ofs(&mut self) -> usize {
        let Some(source) = self.sources.front() else {
            return 0;
        };
        let mut ofs = source.parse.len().max(1) - 1;
        while !self.ofs_token(ofs).is_terminator() {
            ofs += 1;
        }
        ofs
    }

    /// Returns the syntax for tokens `n0` through `n1` (inclusive) after the
    /// current one, as described for [Lexer::ofs_representation].
    pub fn next_representation(&mut self, n0: isize, n1: isize) -> String {
        let (ofs0, ofs1) = (self.next_ofs(n0), self.next_ofs(n1));
        self.ofs_representation(ofs0, ofs1)
    }

    /// Returns the syntax for the tokens with offsets `ofs0` through `ofs1`,
    /// inclusive.  This is the original text, including comments and white
    /// space, except that tokens that came from macro expansion are
    /// represented by the expansion.
    pub fn ofs_representation(&mut self, ofs0: usize, ofs1: usize) -> String {
        self.fill(ofs0.max(ofs1));
        self.sources
            .front()
            .map(|source| source.representation(ofs0, ofs1))
            .unwrap_or_default()
    }

    /// Returns true if the token `n` after the current one came from macro
    /// expansion.
    pub fn next_is_from_macro(&mut self, n: isize) -> bool {
        self.next_lex(n).is_from_macro()
    }

    /// Returns the location of tokens `n0` through `n1` (inclusive) after the
    /// current one.  A token that came from macro expansion has the location
    /// of the whole macro call.
    pub fn get_location(&mut self, n0: isize, n1: isize) -> Location {
        let (ofs0, ofs1) = (self.next_ofs(n0), self.next_ofs(n1));
        self.ofs_location(ofs0, ofs1)
    }

    pub fn ofs_location(&mut self, ofs0: usize, ofs1: usize) -> Location {
        self.fill(ofs0.max(ofs1));
        self.sources
            .front()
            .map(|source| source.token_location(source.ofs_token(ofs0), source.ofs_token(ofs1)))
            .unwrap_or_default()
    }

    /// Name of the file that the current command came from.
    pub fn file_name(&self) -> Option<Arc<String>> {
        self.sources.front().and_then(|source| source.file_name().cloned())
    }

    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.sources.front().and_then(|source| source.options().encoding)
    }

    /// Syntax mode of the current source, or [Syntax::Auto] if there is none.
    pub fn syntax(&self) -> Syntax {
        self.sources.front().map_or(Syntax::Auto, Source::syntax)
    }

    /// Error handling for the current source, or [ErrorHandling::Terminal] if
    /// there is none.
    pub fn error_handling(&self) -> ErrorHandling {
        self.sources
            .front()
            .map_or(ErrorHandling::Terminal, Source::error_handling)
    }

    /// Returns a diagnostic about tokens `n0` through `n1` (inclusive) after
    /// the current one.
    ///
    /// If any of the tokens came from macro expansion, the text is prefixed by
    /// the macro call.  An empty `text` becomes "Syntax error.", and the text
    /// always ends with a period.
    pub fn next_msg(&mut self, severity: Severity, n0: isize, n1: isize, text: &str) -> Diagnostic {
        let (ofs0, ofs1) = (self.next_ofs(n0), self.next_ofs(n1));
        self.ofs_msg(severity, ofs0, ofs1, text)
    }

    /// Like [Lexer::next_msg], with token offsets.
    pub fn ofs_msg(
        &mut self,
        severity: Severity,
        ofs0: usize,
        ofs1: usize,
        text: &str,
    ) -> Diagnostic {
        self.fill(ofs0.max(ofs1));
        match self.sources.front() {
            Some(source) => source.message(severity, ofs0, ofs1, text),
            None => {
                let text = if text.is_empty() { "Syntax error." } else { text };
                let mut text = format!("At end of input: {text}");
                if !text.ends_with('.') {
                    text.push('.');
                }
                Diagnostic::new(severity, Category::Syntax, text)
            }
        }
    }

    /// Returns an error about the current token.
    pub fn error(&mut self, text: &str) -> Diagnostic {
        self.next_msg(Severity::Error, 0, 0, text)
    }

    /// Returns an error about the current token saying that one of `options`
    /// was expected.
    pub fn error_expecting(&mut self, options: &[&str]) -> Diagnostic {
        let text = match options {
            [] => String::new(),
            [a] => format!("Syntax error expecting {a}."),
            [a, b] => format!("Syntax error expecting {a} or {b}."),
            [rest @ .., last] if options.len() <= 8 => {
                format!("Syntax error expecting {}, or {last}.", rest.join(", "))
            }
            _ => format!(
                "Syntax error expecting one of the following: {}.",
                options.join(", ")
            ),
        };
        self.error(&text)
    }

    /// Sends `diagnostic` to the output, after anything still pending.
    pub fn emit(&mut self, diagnostic: Diagnostic) {
        self.flush();
        (self.output)(Output::Diagnostic(diagnostic));
    }

    /// If the current token is `token`, consumes it and returns true.
    pub fn match_token(&mut self, token: &Token) -> bool {
        if self.token() == token {
            self.get();
            true
        } else {
            false
        }
    }

    /// If the current token is an identifier that matches `keyword`, possibly
    /// abbreviated to 3 letters, consumes it and returns true.
    pub fn match_id(&mut self, keyword: &str) -> bool {
        if self.token().matches_keyword(keyword) {
            self.get();
            true
        } else {
            false
        }
    }

    /// Checks the tokens at the current position against the tokens in
    /// `phrase`.  Returns the number of tokens in `phrase` if they all match,
    /// otherwise the number that matched before the first mismatch.
    fn match_phrase(&mut self, phrase: &str) -> Result<usize, usize> {
        let ofs = self.ofs();
        let mut n = 0;
        for expected in StringScanner::new(phrase, Syntax::Interactive, true).unwrapped() {
            if !tokens_match(self.ofs_token(ofs + n), &expected) {
                return Err(n);
            }
            n += 1;
        }
        Ok(n)
    }

    /// Returns true if the lexer is positioned at the tokens in `phrase`, such
    /// as `"END INPUT PROGRAM"` or `"KRUSKAL-WALLIS"`.  Identifiers may be
    /// abbreviated to their first three letters.
    pub fn at_keywords(&mut self, phrase: &str) -> bool {
        self.match_phrase(phrase).is_ok()
    }

    /// Like [Lexer::at_keywords], but consumes the tokens if they match.
    pub fn match_keywords(&mut self, phrase: &str) -> bool {
        match self.match_phrase(phrase) {
            Ok(n) => {
                self.get_n(n);
                true
            }
            Err(_) => false,
        }
    }

    pub fn force_match_keywords(&mut self, phrase: &str) -> Result<(), Diagnostic> {
        match self.match_phrase(phrase) {
            Ok(n) => {
                self.get_n(n);
                Ok(())
            }
            Err(n) => Err(self.next_msg(
                Severity::Error,
                0,
                n as isize,
                &format!("Syntax error expecting `{phrase}'."),
            )),
        }
    }

    /// Consumes the current token if it is `token`, otherwise returns an
    /// error.
    pub fn force_match(&mut self, token: &Token) -> Result<(), Diagnostic> {
        if self.match_token(token) {
            Ok(())
        } else {
            let expected = format!("`{token}'");
            Err(self.error_expecting(&[expected.as_str()]))
        }
    }

    /// Consumes the current token if it is an identifier that matches
    /// `keyword`, otherwise returns an error.
    pub fn force_match_id(&mut self, keyword: &str) -> Result<(), Diagnostic> {
        if self.match_id(keyword) {
            Ok(())
        } else {
            Err(self.error_expecting(&[keyword]))
        }
    }

    /// Consumes and returns the current token if it is a string, otherwise
    /// returns an error.
    pub fn force_string(&mut self) -> Result<String, Diagnostic> {
        match self.token().as_string().map(String::from) {
            Some(s) => {
                self.get();
                Ok(s)
            }
            None => Err(self.error("Syntax error expecting string.")),
        }
    }

    /// Consumes and returns the current token if it is an identifier,
    /// otherwise returns an error.
    pub fn force_id(&mut self) -> Result<Identifier, Diagnostic> {
        match self.token().id().cloned() {
            Some(id) => {
                self.get();
                Ok(id)
            }
            None => Err(self.error("Syntax error expecting identifier.")),
        }
    }

    /// Consumes and returns the current token if it is an integer, otherwise
    /// returns an error.
    pub fn force_integer(&mut self) -> Result<i64, Diagnostic> {
        match self.token().as_integer() {
            Some(integer) => {
                self.get();
                Ok(integer)
            }
            None => Err(self.error("Syntax error expecting integer.")),
        }
    }

    /// Returns an error unless the current token ends a command.
    pub fn end_of_command(&mut self) -> Result<(), Diagnostic> {
        if self.token().is_terminator() {
            Ok(())
        } else {
            Err(self.error("Syntax error expecting end of command."))
        }
    }

    /// If the current source has [ErrorHandling::Terminal], discards all of
    /// its buffered input and tokens, so that the next token comes from
    /// whatever is read next.  This avoids cascading errors after an error in
    /// a command typed interactively.
    pub fn interactive_reset(&mut self) {
        if let Some(source) = self.sources.front_mut()
            && source.error_handling() == ErrorHandling::Terminal
        {
            debug!("interactive reset");
            source.reset();
        }
    }

    /// Advances past any tokens up to the end of the command.
    pub fn discard_rest_of_command(&mut self) {
        while !self.token().is_terminator() {
            self.get();
        }
    }

    /// Discards all lookahead, then discards input sources until one with
    /// [ErrorHandling::Terminal] or until there are none left.  Does nothing
    /// if the current source has [ErrorHandling::Ignore].
    pub fn discard_noninteractive(&mut self) {
        let Some(source) = self.sources.front_mut() else {
            return;
        };
        if source.error_handling() == ErrorHandling::Ignore {
            return;
        }

        source.pp.clear();
        source.merge.clear();
        source.clear_parse();
        while self
            .sources
            .front()
            .is_some_and(|source| source.error_handling() != ErrorHandling::Terminal)
        {
            self.sources.pop_front();
        }
        if let Some(source) = self.sources.front_mut()
            && source.parse.is_empty()
        {
            let pos = source.seg_pos..source.seg_pos;
            source.parse.push(LexToken::new(Token::End, pos));
        }
    }

    fn next_ofs(&self, n: isize) -> usize {
        self.ofs().saturating_add_signed(n)
    }

    fn next_lex(&mut self, n: isize) -> &LexToken {
        if self.sources.is_empty() {
            &STOP_TOKEN
        } else {
            match self.ofs().checked_add_signed(n) {
                Some(ofs) => self.ofs_lex(ofs),
                None => &END_TOKEN,
            }
        }
    }

    fn ofs_lex(&mut self, ofs: usize) -> &LexToken {
        self.fill(ofs);
        self.sources
            .front()
            .map_or(&STOP_TOKEN, |source| source.ofs_token(ofs))
    }

    fn fill(&mut self, ofs: usize) {
        let Self {
            sources,
            macros,
            settings,
            pending,
            ..
        } = self;
        if let Some(source) = sources.front_mut() {
            source.fill(
                ofs,
                &mut Context {
                    macros: &*macros,
                    settings: &*settings,
                    pending,
                },
            );
        }
        self.flush();
    }

    fn flush(&mut self) {
        let Pending { output, messages } = take(&mut self.pending);
        for item in output
            .into_iter()
            .chain(messages.into_iter().map(Output::Diagnostic))
        {
            (self.output)(item);
        }
    }
}
