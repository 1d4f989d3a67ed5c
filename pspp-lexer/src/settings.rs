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

/// Settings that control macro expansion, as set with `SET MEXPAND`,
/// `SET MPRINT`, `SET MITERATE`, and `SET MNEST`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MacroSettings {
    /// Expand macros? (`MEXPAND`)
    pub expand: bool,

    /// Print macro expansions? (`MPRINT`)
    pub print_expansions: bool,

    /// Maximum iterations of `!DO`. (`MITERATE`)
    pub max_iterations: usize,

    /// Maximum nested macro expansion levels. (`MNEST`)
    pub max_nest: usize,
}

impl Default for MacroSettings {
    fn default() -> Self {
        Self {
            expand: true,
            print_expansions: false,
            max_iterations: 1000,
            max_nest: 50,
        }
    }
}
