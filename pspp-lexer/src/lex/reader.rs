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

//! Syntax readers.
//!
//! A [Reader] supplies UTF-8 syntax text to a
//! [Lexer](crate::lex::lexer::Lexer) on demand, a piece at a time.  The lexer
//! only asks for more text when it needs it to produce the next token, which
//! matters for interactive readers that must show a prompt first.

use std::{
    fs,
    io::{Read, Result as IoResult, stdin},
    path::Path,
    sync::Arc,
};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::{lex::segment::Syntax, prompt::PromptStyle};

/// Error handling for a syntax reader.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ErrorHandling {
    /// Discard input line and continue reading.
    Terminal,

    /// Continue to next command, except for cascading failures.
    #[default]
    Continue,

    /// Continue, even for cascading failures.
    Ignore,

    /// Stop processing.
    Stop,
}

/// Properties of a [Reader].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Name of the file being read, if any, for use in diagnostics.
    pub file_name: Option<Arc<String>>,

    /// The encoding that the input was originally in.  The text supplied to
    /// the lexer is always UTF-8.
    pub encoding: Option<&'static Encoding>,

    pub syntax: Syntax,
    pub error_handling: ErrorHandling,

    /// 1-based line number of the first line of input, or 0 if line numbers
    /// are not meaningful for this reader.
    pub line_number: i32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            file_name: None,
            encoding: None,
            syntax: Syntax::default(),
            error_handling: ErrorHandling::default(),
            line_number: 1,
        }
    }
}

impl ReaderOptions {
    pub fn with_file_name(self, file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(Arc::new(file_name.into())),
            ..self
        }
    }

    pub fn with_syntax(self, syntax: Syntax) -> Self {
        Self { syntax, ..self }
    }

    pub fn with_error_handling(self, error_handling: ErrorHandling) -> Self {
        Self {
            error_handling,
            ..self
        }
    }
}

/// A source of syntax text.
pub trait Reader {
    fn options(&self) -> &ReaderOptions;

    /// Appends more syntax to `buf` and returns the number of bytes appended,
    /// or 0 at end of input.  An interactive reader should show `prompt`
    /// before reading.
    ///
    /// The lexer keeps calling this until it has a complete line (or end of
    /// input), so a reader may return less than a line at a time.
    fn read(&mut self, buf: &mut String, prompt: PromptStyle) -> IoResult<usize>;
}

/// Returns the first line in `s`, including its new-line, or all of `s` if it
/// has no new-line.
fn first_line(s: &str) -> &str {
    match s.find('\n') {
        Some(index) => &s[..=index],
        None => s,
    }
}

/// A [Reader] for syntax held in memory.
///
/// The text is supplied to the lexer one line at a time.
#[derive(Clone, Debug)]
pub struct StringReader {
    options: ReaderOptions,
    contents: String,
    pos: usize,
}

impl StringReader {
    pub fn new(contents: impl Into<String>, options: ReaderOptions) -> Self {
        Self {
            options,
            contents: contents.into(),
            pos: 0,
        }
    }

    /// Returns a reader for `contents` with default options.
    pub fn for_string(contents: impl Into<String>) -> Self {
        Self::new(contents, ReaderOptions::default())
    }
}

impl Reader for StringReader {
    fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn read(&mut self, buf: &mut String, _prompt: PromptStyle) -> IoResult<usize> {
        let line = first_line(&self.contents[self.pos..]);
        buf.push_str(line);
        self.pos += line.len();
        Ok(line.len())
    }
}

/// A [Reader] for a syntax file, or for standard input if the file name is
/// `-`.
///
/// The whole file is read and recoded to UTF-8 up front.  If no encoding is
/// given in the options, the encoding is guessed from the file contents.
pub struct FileReader {
    inner: StringReader,
}

impl FileReader {
    pub fn new<P>(path: P, options: ReaderOptions) -> IoResult<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let (bytes, file_name) = if path == Path::new("-") {
            let mut bytes = Vec::new();
            stdin().read_to_end(&mut bytes)?;
            (bytes, String::from("<stdin>"))
        } else {
            (fs::read(path)?, path.to_string_lossy().into_owned())
        };
        Ok(Self::for_bytes(&bytes, file_name, options))
    }

    /// Returns a reader for `bytes`, which were read from `file_name`.
    pub fn for_bytes(bytes: &[u8], file_name: impl Into<String>, options: ReaderOptions) -> Self {
        let encoding = options.encoding.unwrap_or_else(|| {
            let mut encoding_detector = EncodingDetector::new();
            encoding_detector.feed(bytes, true);
            encoding_detector.guess(None, true)
        });
        let (contents, encoding, malformed) = encoding.decode(bytes);
        debug!(
            encoding = encoding.name(),
            malformed, "decoded {} bytes of syntax", bytes.len()
        );
        let options = ReaderOptions {
            file_name: options
                .file_name
                .or_else(|| Some(Arc::new(file_name.into()))),
            encoding: Some(encoding),
            ..options
        };
        Self {
            inner: StringReader::new(contents.into_owned(), options),
        }
    }

    /// The encoding that the file was decoded from.
    pub fn encoding(&self) -> &'static Encoding {
        self.inner.options.encoding.unwrap_or(UTF_8)
    }
}

impl Reader for FileReader {
    fn options(&self) -> &ReaderOptions {
        self.inner.options()
    }

    fn read(&mut self, buf: &mut String, prompt: PromptStyle) -> IoResult<usize> {
        self.inner.read(buf, prompt)
    }
}

#[cfg(test)]
mod tests {
    use encoding_rs::{UTF_8, WINDOWS_1252};

    use crate::prompt::PromptStyle;

    use super::{FileReader, Reader, ReaderOptions, StringReader};

    fn read_all(reader: &mut dyn Reader) -> Vec<String> {
        let mut chunks = Vec::new();
        loop {
            let mut buf = String::new();
            if reader.read(&mut buf, PromptStyle::First).unwrap() == 0 {
                break;
            }
            chunks.push(buf);
        }
        chunks
    }

    #[test]
    fn string_reader_lines() {
        let mut reader = StringReader::for_string("a\nbc\r\nd");
        assert_eq!(read_all(&mut reader), vec!["a\n", "bc\r\n", "d"]);
    }

    #[test]
    fn file_reader_decoding() {
        let mut reader =
            FileReader::for_bytes(b"\xef\xbb\xbfx\n", "x.sps", ReaderOptions::default());
        assert_eq!(reader.encoding(), UTF_8);
        assert_eq!(reader.options().file_name.as_deref().map(String::as_str), Some("x.sps"));
        assert_eq!(read_all(&mut reader), vec!["x\n"]);

        let options = ReaderOptions {
            encoding: Some(WINDOWS_1252),
            ..ReaderOptions::default()
        };
        let mut reader = FileReader::for_bytes(b"caf\xe9.\n", "y.sps", options);
        assert_eq!(reader.encoding(), WINDOWS_1252);
        assert_eq!(read_all(&mut reader), vec!["café.\n"]);
    }
}
