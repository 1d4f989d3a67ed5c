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

//! Recognizing macro calls and collecting their arguments.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    iter::once,
};

use crate::{
    lex::{
        segment::Syntax,
        token::{Punct, Token},
    },
    message::{Diagnostic, Location},
    settings::MacroSettings,
};

use super::{
    Frame, Macro, MacroError, MacroSet, MacroToken, Parameter, ValueType, expand::Expander,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ParserState {
    /// Accumulating tokens toward the end of any type of argument.
    Arg,

    /// Expecting the opening delimiter of an `!ENCLOSE` argument.
    Enclose,

    /// Expecting a keyword for a keyword argument.
    Keyword,

    /// Expecting an equal sign for a keyword argument.
    Equals,

    /// Macro fully parsed and ready for expansion.
    Finished,
}

impl ParserState {
    /// Returns the state for starting to read an argument for `param`.
    fn for_param(param: &Parameter) -> Self {
        if !param.is_positional() {
            Self::Keyword
        } else if let ValueType::Enclose(_, _) = param.arg {
            Self::Enclose
        } else {
            Self::Arg
        }
    }
}

/// Macro call parser FSM.
pub struct Parser<'a> {
    macros: &'a MacroSet,
    macro_: &'a Macro,

    /// Set when parsing a call found inside a macro body, so that arguments
    /// may refer to the enclosing macro's arguments and variables.
    expander: Option<Expander<'a>>,

    state: ParserState,
    args: Vec<Option<Vec<MacroToken>>>,
    arg_index: usize,

    /// Length of macro call so far.
    n_tokens: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseStatus {
    Complete,
    Incomplete,
}

impl<'a> Parser<'a> {
    /// Starts parsing a macro call, if `token` is the name of a macro in
    /// `macros`.
    pub fn new(macros: &'a MacroSet, token: &Token) -> Option<Self> {
        Self::new__(macros, None, token)
    }

    pub(super) fn nested(expander: Expander<'a>, token: &Token) -> Option<Self> {
        Self::new__(expander.macros, Some(expander), token)
    }

    fn new__(macros: &'a MacroSet, expander: Option<Expander<'a>>, token: &Token) -> Option<Self> {
        let macro_ = macros.get(token.any_id()?.as_str())?;
        Some(Self {
            macros,
            macro_,
            expander,
            state: macro_
                .parameters
                .first()
                .map_or(ParserState::Finished, ParserState::for_param),
            args: vec![None; macro_.parameters.len()],
            arg_index: 0,
            n_tokens: 1,
        })
    }

    pub fn status(&self) -> ParseStatus {
        if self.state == ParserState::Finished {
            ParseStatus::Complete
        } else {
            ParseStatus::Incomplete
        }
    }

    fn error(&self, location: Option<&Location>, error: &dyn Fn(Diagnostic), e: MacroError) {
        error(match &self.expander {
            Some(expander) => expander.stack.diagnostic(None, e),
            None => Frame::call_site(location).diagnostic(None, e),
        })
    }

    fn expected(
        &self,
        mt: &MacroToken,
        expected: String,
        location: Option<&Location>,
        error: &dyn Fn(Diagnostic),
    ) {
        let actual = match mt.token {
            Token::Stop => String::from("<end of input>"),
            _ => mt.syntax.clone(),
        };
        let param = &self.macro_.parameters[self.arg_index];
        self.error(
            location,
            error,
            MacroError::UnexpectedToken {
                actual,
                expected,
                arg: param.name.clone(),
                macro_: self.macro_.name.clone(),
            },
        );
    }

    fn finished(&mut self) {
        self.state = ParserState::Finished;
        for (arg, param) in self.args.iter_mut().zip(&self.macro_.parameters) {
            if arg.is_none() {
                *arg = Some(param.default.clone());
            }
        }
    }

    fn next_arg(&mut self) {
        let macro_ = self.macro_;
        let Some(param) = macro_.parameters.get(self.arg_index) else {
            return self.finished();
        };
        if param.is_positional() {
            self.arg_index += 1;
            match macro_.parameters.get(self.arg_index) {
                Some(param) => self.state = ParserState::for_param(param),
                None => self.finished(),
            }
        } else if self.args.iter().any(|arg| arg.is_none()) {
            self.state = ParserState::Keyword;
        } else {
            self.finished();
        }
    }

    fn push_arg(
        &mut self,
        mt: &MacroToken,
        location: Option<&Location>,
        error: &dyn Fn(Diagnostic),
    ) {
        let macro_ = self.macro_;
        let param = &macro_.parameters[self.arg_index];
        if mt.token.is_terminator() {
            if let Some(arg) = &self.args[self.arg_index] {
                let e = match &param.arg {
                    ValueType::NTokens(n) => Some(MacroError::ExpectedMoreTokens {
                        n: n.saturating_sub(arg.len()),
                        arg: param.name.clone(),
                        macro_: macro_.name.clone(),
                    }),
                    ValueType::CharEnd(end) | ValueType::Enclose(_, end) => {
                        Some(MacroError::ExpectedToken {
                            token: end.to_string(),
                            arg: param.name.clone(),
                            macro_: macro_.name.clone(),
                        })
                    }
                    // The expected way to end the argument.
                    ValueType::CmdEnd => None,
                };
                if let Some(e) = e {
                    self.error(location, error, e);
                }
            }
            return self.finished();
        }

        let arg_len = self.args[self.arg_index].as_ref().map_or(0, Vec::len);
        let (
            add_token, // Should we add `mt` to the current arg?
            next_arg,  // Should we advance to the next arg?
        ) = match &param.arg {
            ValueType::NTokens(n) => (true, arg_len + 1 >= *n),
            ValueType::CharEnd(end) | ValueType::Enclose(_, end) => {
                let at_end = &mt.token == end;
                (!at_end, at_end)
            }
            ValueType::CmdEnd => (true, false),
        };
        let expander = self.expander;
        let arg = self.args[self.arg_index].get_or_insert_default();
        if add_token && !expander.is_some_and(|expander| expander.expand_arg(&mt.token, arg)) {
            arg.push(mt.clone());
        }
        self.n_tokens += 1;
        if next_arg {
            self.next_arg();
        }
    }

    fn push_enclose(
        &mut self,
        mt: &MacroToken,
        location: Option<&Location>,
        error: &dyn Fn(Diagnostic),
    ) {
        let param = &self.macro_.parameters[self.arg_index];
        let ValueType::Enclose(start, _) = &param.arg else {
            return self.finished();
        };
        if &mt.token == start {
            self.n_tokens += 1;
            self.args[self.arg_index] = Some(Vec::new());
            self.state = ParserState::Arg;
        } else if param.is_positional() && mt.token.is_terminator() {
            self.finished();
        } else {
            self.expected(mt, start.to_string(), location, error);
            self.finished();
        }
    }

    fn push_keyword(
        &mut self,
        mt: &MacroToken,
        location: Option<&Location>,
        error: &dyn Fn(Diagnostic),
    ) {
        let Some(id) = mt.token.id() else {
            return self.finished();
        };
        let Some(arg_index) = self.macro_.find_parameter(id.as_str()) else {
            return self.finished();
        };
        if self.args[arg_index].is_some() {
            self.error(
                location,
                error,
                MacroError::DuplicateArg {
                    arg: self.macro_.parameters[arg_index].name.clone(),
                    macro_: self.macro_.name.clone(),
                },
            );
        }
        self.args[arg_index] = Some(Vec::new());
        self.arg_index = arg_index;
        self.n_tokens += 1;
        self.state = ParserState::Equals;
    }

    fn push_equals(
        &mut self,
        mt: &MacroToken,
        location: Option<&Location>,
        error: &dyn Fn(Diagnostic),
    ) {
        if mt.token.is_punct(Punct::Equals) {
            self.n_tokens += 1;
            self.state = match self.macro_.parameters[self.arg_index].arg {
                ValueType::Enclose(_, _) => ParserState::Enclose,
                _ => ParserState::Arg,
            };
        } else {
            self.expected(mt, String::from("="), location, error);
            self.finished()
        }
    }

    /// Adds `mt`, which came from `location`, to the collection of tokens in
    /// `self` that potentially need to be macro expanded.
    ///
    /// Returns [ParseStatus::Incomplete] if the macro expander needs more
    /// tokens, for macro arguments or to decide whether this is actually a
    /// macro invocation.  The caller should call `push` again with the next
    /// token.
    ///
    /// Returns [ParseStatus::Complete] if the macro invocation is now complete.
    /// The caller should call [`Self::finish()`] to obtain the expansion.
    /// Pushing [Token::End] or [Token::Stop] always completes the call.
    pub fn push(
        &mut self,
        mt: &MacroToken,
        location: Option<&Location>,
        error: &dyn Fn(Diagnostic),
    ) -> ParseStatus {
        match self.state {
            ParserState::Arg => self.push_arg(mt, location, error),
            ParserState::Enclose => self.push_enclose(mt, location, error),
            ParserState::Keyword => self.push_keyword(mt, location, error),
            ParserState::Equals => self.push_equals(mt, location, error),
            ParserState::Finished => (),
        }
        self.status()
    }

    /// Returns the parsed call.  If the call is not yet complete, arguments
    /// not yet supplied take their default values.
    pub fn finish(mut self) -> Call<'a> {
        if self.state != ParserState::Finished {
            self.finished();
        }
        Call {
            macros: self.macros,
            macro_: self.macro_,
            args: self.args.into_iter().map(Option::unwrap_or_default).collect(),
            n_tokens: self.n_tokens,
        }
    }
}

/// A complete macro call, ready to expand.
pub struct Call<'a> {
    macros: &'a MacroSet,
    macro_: &'a Macro,
    args: Vec<Vec<MacroToken>>,
    n_tokens: usize,
}

impl<'a> Call<'a> {
    /// Parses a macro call from the beginning of `tokens`, which come from
    /// within the body of a macro being expanded by `expander`.  If `tokens`
    /// runs out before the call is complete, it is completed as if by the end
    /// of a command.
    pub(super) fn for_tokens(expander: Expander<'a>, tokens: &[MacroToken]) -> Option<Self> {
        let (first, rest) = tokens.split_first()?;
        let mut parser = Parser::nested(expander, &first.token)?;
        if parser.status() == ParseStatus::Incomplete {
            let end = MacroToken::new(Token::End, "");
            for mt in rest.iter().chain(once(&end)) {
                if parser.push(mt, None, expander.error) == ParseStatus::Complete {
                    break;
                }
            }
        }
        Some(parser.finish())
    }

    /// Expands this call, appending the expansion to `output`.  `call_loc` is
    /// the location of the call in the source, for use in error messages,
    /// which are passed to `error`.
    pub fn expand(
        &self,
        syntax: Syntax,
        call_loc: Location,
        settings: &MacroSettings,
        output: &mut Vec<MacroToken>,
        error: &dyn Fn(Diagnostic),
    ) {
        let call_site = Frame::call_site(Some(&call_loc));
        let stack = call_site.push(self.macro_.name.as_str(), Some(&self.macro_.location));
        let expand = Cell::new(true);
        let vars = RefCell::new(HashMap::new());
        let expander = Expander {
            macros: self.macros,
            settings,
            error,
            syntax,
            nesting_countdown: settings.max_nest,
            stack: &stack,
            expand: &expand,
            vars: &vars,
            break_: None,
            macro_: Some(self.macro_),
            args: Some(self.args.as_slice()),
        };
        expander.expand(&self.macro_.body, output);
    }

    /// Returns the number of tokens consumed from the input for the macro
    /// call, including the macro name.
    pub fn len(&self) -> usize {
        self.n_tokens
    }

    pub fn macro_(&self) -> &'a Macro {
        self.macro_
    }

    pub(super) fn macros(&self) -> &'a MacroSet {
        self.macros
    }

    /// Returns the arguments, in the order of the macro's parameters.
    pub fn args(&self) -> &[Vec<MacroToken>] {
        &self.args
    }
}
