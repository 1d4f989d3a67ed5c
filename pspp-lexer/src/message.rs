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

//! Diagnostics produced while lexing and expanding syntax.

use std::{
    borrow::Cow,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::Range,
    sync::Arc,
};

use enum_map::Enum;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Returns the first line of `s`, truncated with `...` if it is wider than
/// fits in a one-line message or if there is more than one line.
pub fn ellipsize(s: &str) -> Cow<'_, str> {
    ellipsize_to(s, 60)
}

/// Like [ellipsize], with an explicit maximum display width.
pub fn ellipsize_to(s: &str, max_width: usize) -> Cow<'_, str> {
    let line = s.lines().next().unwrap_or_default();
    if line.len() == s.len() && s.width() <= max_width {
        return Cow::from(s);
    }

    let mut out = String::new();
    let mut width = 0;
    for c in line.chars() {
        width += c.width().unwrap_or(0);
        if width > max_width {
            break;
        }
        out.push(c);
    }
    out.push_str("...");
    Cow::from(out)
}

/// A line number and optional column number within a source file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Point {
    /// 1-based line number.
    pub line: i32,

    /// 1-based column number.
    ///
    /// Columns count display width as measured by the `unicode_width` crate,
    /// so that CJK characters count 2 and combining characters count 0.
    pub column: Option<i32>,
}

impl Point {
    pub fn new(line: i32, column: Option<i32>) -> Self {
        Self { line, column }
    }

    /// Returns this point moved past `syntax`: one line for each new-line,
    /// and the display width of the text after the last new-line.
    pub fn advance(&self, syntax: &str) -> Self {
        syntax
            .split_inclusive('\n')
            .fold(*self, |point, piece| match piece.strip_suffix('\n') {
                Some(_) => Point::new(point.line + 1, Some(1)),
                None => Point::new(
                    point.line,
                    point.column.map(|column| column + piece.width() as i32),
                ),
            })
    }
}

/// Where a diagnostic applies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub file_name: Option<Arc<String>>,

    /// Half-open span: `end.column` is one past the last column.
    pub span: Option<Range<Point>>,

    /// Suppresses underlining of the source lines shown with a diagnostic.
    pub omit_underlines: bool,
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if let Some(file_name) = &self.file_name {
            write!(f, "{}", file_name)?;
        }

        if let Some(span) = &self.span {
            if self.file_name.is_some() {
                write!(f, ":")?;
            }
            let l1 = span.start.line;
            let l2 = span.end.line;
            match (span.start.column.zip(span.end.column), l2 > l1) {
                (Some((c1, c2)), true) => write!(f, "{l1}.{c1}-{l2}.{}", c2 - 1)?,
                (Some((c1, c2)), false) => write!(f, "{l1}.{c1}-{}", c2 - 1)?,
                (None, true) => write!(f, "{l1}-{l2}")?,
                (None, false) => write!(f, "{l1}")?,
            }
        }
        Ok(())
    }
}

impl Location {
    pub fn new(file_name: Option<Arc<String>>, span: Range<Point>) -> Self {
        Self {
            file_name,
            span: Some(span),
            omit_underlines: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_name.is_none() && self.span.is_none()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Enum)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Category {
    General,
    Syntax,
}

/// One frame of macro-expansion context for a [Diagnostic], printed on its
/// own line before the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stack {
    pub location: Location,
    pub description: String,
}

impl Stack {
    pub fn new(location: Location, description: impl Into<String>) -> Self {
        Self {
            location,
            description: description.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub location: Location,

    /// Source lines to show below the message, each with its line number.
    pub source: Vec<(i32, String)>,
    pub stack: Vec<Stack>,
    pub command_name: Option<&'static str>,
    pub text: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, category: Category, text: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            location: Location::default(),
            source: Vec::new(),
            stack: Vec::new(),
            command_name: None,
            text: text.into(),
        }
    }

    /// A syntax error with no location.
    pub fn syntax_error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, Category::Syntax, text)
    }

    pub fn with_location(self, location: Location) -> Self {
        Self { location, ..self }
    }

    pub fn with_stack(self, stack: Vec<Stack>) -> Self {
        Self { stack, ..self }
    }

    pub fn with_source(self, source: Vec<(i32, String)>) -> Self {
        Self { source, ..self }
    }

    /// Names the command that the diagnostic is about.  A syntax error shows
    /// the command name before its text.
    pub fn with_command_name(self, command_name: &'static str) -> Self {
        Self {
            command_name: Some(command_name),
            ..self
        }
    }

    fn write_source(&self, f: &mut Formatter<'_>) -> FmtResult {
        let Some(Range {
            start: Point {
                line: l0,
                column: Some(c0),
            },
            end: Point {
                line: l1,
                column: Some(c1),
            },
        }) = self.location.span
        else {
            return Ok(());
        };

        let mut prev_line_number = None;
        for (line_number, line) in &self.source {
            if prev_line_number.is_some_and(|prev| *line_number != prev + 1) {
                write!(f, "\n  ... |")?;
            }
            prev_line_number = Some(*line_number);

            write!(f, "\n{line_number:5} | {line}")?;
            if self.location.omit_underlines {
                continue;
            }

            let start = if *line_number == l0 { c0 } else { 1 };
            let end = if *line_number == l1 {
                c1
            } else {
                line.width() as i32 + 1
            };
            write!(f, "\n      | {:width$}", "", width = (start - 1).max(0) as usize)?;
            if *line_number == l0 {
                f.write_str("^")?;
                f.write_str(&"~".repeat((end - start - 1).max(0) as usize))?;
            } else {
                f.write_str(&"~".repeat((end - start).max(0) as usize))?;
            }
        }
        Ok(())
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for Stack {
            location,
            description,
        } in &self.stack
        {
            if !location.is_empty() {
                write!(f, "{location}: ")?;
            }
            writeln!(f, "{description}")?;
        }
        if self.category != Category::General && !self.location.is_empty() {
            write!(f, "{}: ", self.location)?;
        }

        write!(f, "{}: ", self.severity)?;

        match self.command_name {
            Some(command_name) if self.category == Category::Syntax => {
                write!(f, "{command_name}: ")?
            }
            _ => (),
        }

        write!(f, "{}", self.text)?;
        self.write_source(f)
    }
}

impl Debug for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ellipsize, Diagnostic, Location, Point, Stack};

    #[test]
    fn ellipsize_long_and_multiline() {
        assert_eq!(ellipsize("short"), "short");
        assert_eq!(ellipsize("two\nlines"), "two...");
        let long = "x".repeat(70);
        assert_eq!(ellipsize(&long), format!("{}...", "x".repeat(60)));
    }

    #[test]
    fn advance() {
        let start = Point::new(1, Some(1));
        assert_eq!(start.advance("abc"), Point::new(1, Some(4)));
        assert_eq!(start.advance("abc\nde"), Point::new(2, Some(3)));
        assert_eq!(start.advance("中文"), Point::new(1, Some(5)));
        assert_eq!(Point::new(1, None).advance("x"), Point::new(1, None));
    }

    #[test]
    fn location_display() {
        let file_name = Some(Arc::new(String::from("x.sps")));
        let location = Location::new(
            file_name.clone(),
            Point::new(3, Some(5))..Point::new(3, Some(9)),
        );
        assert_eq!(location.to_string(), "x.sps:3.5-8");

        let location = Location::new(file_name, Point::new(3, None)..Point::new(5, None));
        assert_eq!(location.to_string(), "x.sps:3-5");

        let location = Location::new(None, Point::new(1, Some(2))..Point::new(4, Some(3)));
        assert_eq!(location.to_string(), "1.2-4.2");
    }

    #[test]
    fn display_with_stack_and_source() {
        let diagnostic = Diagnostic::syntax_error("Bad thing.")
            .with_location(Location::new(
                None,
                Point::new(2, Some(3))..Point::new(2, Some(6)),
            ))
            .with_source(vec![(2, String::from("x yyy z"))])
            .with_stack(vec![Stack::new(
                Location::default(),
                "In the expansion of `!m',",
            )]);
        assert_eq!(
            diagnostic.to_string(),
            "In the expansion of `!m',\n2.3-5: error: Bad thing.\n    2 | x yyy z\n      |   ^~~"
        );
    }
}
