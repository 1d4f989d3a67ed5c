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

use anyhow::{Result, bail};
use clap::Args;
use pspp_lexer::{
    define::parse_define,
    lex::{reader::ErrorHandling, token::Token},
};

use crate::{InputOptions, check_counts};

/// Processes `DEFINE` commands in a syntax file and prints every other
/// command with macros expanded.
#[derive(Args, Clone, Debug)]
pub struct Expand {
    #[command(flatten)]
    input: InputOptions,
}

impl Expand {
    pub fn run(self) -> Result<()> {
        let (mut lexer, counts) = self.input.open()?;
        lexer.get();
        while *lexer.token() != Token::Stop {
            if lexer.match_id("DEFINE") {
                if let Err(diagnostic) = parse_define(&mut lexer) {
                    lexer.emit(diagnostic);
                    if lexer.error_handling() == ErrorHandling::Stop {
                        bail!("stopping after error in DEFINE");
                    }
                    lexer.discard_rest_of_command();
                }
            } else if *lexer.token() != Token::End {
                let last = lexer.max_ofs();
                let command = lexer.ofs_representation(0, last.saturating_sub(1));
                println!("{command}.");
                lexer.discard_rest_of_command();
            }
            lexer.get();
        }
        check_counts(&counts)
    }
}
