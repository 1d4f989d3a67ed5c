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

use anyhow::Result;
use clap::Args;
use pspp_lexer::lex::token::Token;

use crate::{InputOptions, check_counts};

/// Prints the tokens in a syntax file, one per line.
///
/// Each line shows a token, then its location, then the syntax that it came
/// from.  A token that came from a macro expansion is marked with `*`, and
/// its syntax is the part of the expansion that produced it.
#[derive(Args, Clone, Debug)]
pub struct Tokens {
    #[command(flatten)]
    input: InputOptions,
}

impl Tokens {
    pub fn run(self) -> Result<()> {
        let (mut lexer, counts) = self.input.open()?;
        loop {
            lexer.get();
            if *lexer.token() == Token::Stop {
                break;
            }
            let token = format!("{:?}", lexer.token());
            let location = lexer.get_location(0, 0);
            let marker = if lexer.next_is_from_macro(0) { "*" } else { " " };
            let representation = lexer.next_representation(0, 0);
            println!("{location}\t{marker}{token}\t{representation}");
        }
        check_counts(&counts)
    }
}
