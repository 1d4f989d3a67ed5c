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

use std::{cell::RefCell, io::stderr, path::PathBuf, rc::Rc};

use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use encoding_rs::Encoding;
use enum_map::EnumMap;
use pspp_lexer::{
    lex::{
        lexer::{Lexer, Output},
        reader::{FileReader, ReaderOptions},
        segment::Syntax,
    },
    message::Severity,
    settings::MacroSettings,
};
use thiserror::Error as ThisError;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{expand::Expand, tokens::Tokens};

mod expand;
mod tokens;

/// Tokenizes PSPP syntax and expands PSPP macros.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    Tokens(Tokens),
    Expand(Expand),
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Command::Tokens(tokens) => tokens.run(),
            Command::Expand(expand) => expand.run(),
        }
    }
}

#[derive(ThisError, Debug)]
#[error("{0}: unknown encoding")]
struct UnknownEncodingError(String);

fn parse_encoding(arg: &str) -> Result<&'static Encoding, UnknownEncodingError> {
    match Encoding::for_label_no_replacement(arg.as_bytes()) {
        Some(encoding) => Ok(encoding),
        None => Err(UnknownEncodingError(arg.to_string())),
    }
}

/// Syntax mode for reading the input.
#[derive(ValueEnum, Copy, Clone, Debug, Default)]
enum SyntaxMode {
    /// Decide between interactive and batch syntax line by line.
    #[default]
    Auto,

    /// Commands end with a period or a blank line.
    Interactive,

    /// A line that is not indented starts a new command.
    Batch,
}

impl From<SyntaxMode> for Syntax {
    fn from(value: SyntaxMode) -> Self {
        match value {
            SyntaxMode::Auto => Syntax::Auto,
            SyntaxMode::Interactive => Syntax::Interactive,
            SyntaxMode::Batch => Syntax::Batch,
        }
    }
}

/// Options for reading syntax, shared by all the subcommands.
#[derive(Args, Clone, Debug)]
struct InputOptions {
    /// Syntax file to read, or `-` for standard input.
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Syntax mode.
    #[arg(long, value_enum, default_value_t)]
    syntax: SyntaxMode,

    /// The encoding of the input.  If omitted, it is guessed from the input.
    #[arg(long, value_parser = parse_encoding)]
    encoding: Option<&'static Encoding>,

    /// Don't expand macros.
    #[arg(long, help_heading = "Macro options")]
    no_expand: bool,

    /// Print each macro expansion (`SET MPRINT=ON`).
    #[arg(long, help_heading = "Macro options")]
    mprint: bool,

    /// Maximum number of iterations of a macro `!DO` loop.
    #[arg(long, default_value_t = 1000, help_heading = "Macro options")]
    miterate: usize,

    /// Maximum nesting level for macro expansion.
    #[arg(long, default_value_t = 50, help_heading = "Macro options")]
    mnest: usize,
}

/// Counts of the diagnostics that a [Lexer] has reported, by severity.
type Counts = Rc<RefCell<EnumMap<Severity, usize>>>;

impl InputOptions {
    /// Opens the input and returns a lexer for it.
    ///
    /// The lexer prints diagnostics to stderr, prints macro expansions to
    /// stdout, and logs the syntax that it reads.
    fn open(&self) -> Result<(Lexer, Counts)> {
        let options = ReaderOptions {
            encoding: self.encoding,
            syntax: self.syntax.into(),
            ..ReaderOptions::default()
        };
        let reader = FileReader::new(&self.input, options)
            .map_err(|error| anyhow!("{}: {error}", self.input.display()))?;
        info!(encoding = reader.encoding().name(), "reading syntax");

        let mut lexer = Lexer::with_settings(MacroSettings {
            expand: !self.no_expand,
            print_expansions: self.mprint,
            max_iterations: self.miterate,
            max_nest: self.mnest,
        });
        let counts = Counts::default();
        let sink = Rc::clone(&counts);
        lexer.set_output(move |output| match output {
            Output::Syntax(line) => info!(target: "pspp_lexer::syntax", "{line}"),
            Output::MacroExpansion(expansion) => println!("{expansion}"),
            Output::Diagnostic(diagnostic) => {
                sink.borrow_mut()[diagnostic.severity] += 1;
                eprintln!("{diagnostic}");
            }
        });
        lexer.append(Box::new(reader));
        Ok((lexer, counts))
    }
}

/// Fails if any errors were reported.
fn check_counts(counts: &Counts) -> Result<()> {
    let counts = counts.borrow();
    info!(
        errors = counts[Severity::Error],
        warnings = counts[Severity::Warning],
        notes = counts[Severity::Note],
        "done"
    );
    match counts[Severity::Error] {
        0 => Ok(()),
        1 => bail!("1 error"),
        n => bail!("{n} errors"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(stderr),
        )
        .init();

    Cli::parse().command.run()
}
