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

//! Lexical analysis of PSPP syntax, including the PSPP macro language.
//!
//! [lex] turns syntax into tokens, in layers: [lex::segment] divides text into
//! segments, [lex::scan] turns segments into tokens, and [lex::lexer] drives
//! both from one or more [lex::reader::Reader]s, expanding macro calls with
//! [macros] along the way.  [define] parses the `DEFINE` command that creates
//! macros.

pub mod define;
pub mod identifier;
pub mod lex;
pub mod macros;
pub mod message;
pub mod prompt;
pub mod settings;
