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

//! PSPP macros.
//!
//! A macro is defined with `DEFINE ... !ENDDEFINE` and called by naming it,
//! followed by its arguments.  Recognizing a call, and collecting its
//! arguments, is the job of [Parser].  [Call::expand] then expands the body
//! of the macro, including the macro language's conditionals, loops,
//! variables, and functions.

use std::{collections::HashMap, ops::Range};

use thiserror::Error as ThisError;
use unicase::UniCase;

use crate::{
    identifier::Identifier,
    lex::{
        scan::{ScanError, ScanToken, StringSegmenter},
        segment::Syntax,
        token::{Punct, Token},
    },
    message::{Diagnostic, Location, Stack, ellipsize},
};

mod call;
mod expand;

pub use call::{Call, ParseStatus, Parser};

#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum MacroError {
    /// Expected more tokens.
    #[error(
        "Reached end of command expecting {n} more {} in argument {arg} to macro {macro_}.",
        if *n == 1 { "token" } else { "tokens" }
    )]
    ExpectedMoreTokens {
        n: usize,
        arg: Identifier,
        macro_: Identifier,
    },

    /// Expected a particular token at end of command.
    #[error("Reached end of command expecting \"{token}\" in argument {arg} to macro {macro_}.")]
    ExpectedToken {
        token: String,
        arg: Identifier,
        macro_: Identifier,
    },

    /// Expected a particular token, got a different one.
    #[error(
        "Found `{actual}' while expecting `{expected}' reading argument {arg} to macro {macro_}."
    )]
    UnexpectedToken {
        actual: String,
        expected: String,
        arg: Identifier,
        macro_: Identifier,
    },

    /// Argument specified multiple times,
    #[error("Argument {arg} multiply specified in call to macro {macro_}.")]
    DuplicateArg { arg: Identifier, macro_: Identifier },

    /// Maximum nesting limit exceeded.
    #[error("Maximum nesting level {limit} exceeded.  (Use SET MNEST to change the limit.)")]
    TooDeep { limit: usize },

    /// Error tokenizing during expansion.
    #[error(transparent)]
    ScanError(#[from] ScanError),

    #[error("Expecting ')' in macro expression.")]
    ExpectingRParen,

    #[error("Expecting literal or function invocation in macro expression.")]
    ExpectingLiteral,

    #[error("!THEN expected in macro !IF construct.")]
    ExpectingThen,

    #[error("!ELSE or !IFEND expected in macro !IF construct.")]
    ExpectingElseOrIfEnd,

    #[error("!IFEND expected in macro !IF construct.")]
    ExpectingIfEnd,

    /// Expecting macro variable name.
    #[error("Expected macro variable name following {0}.")]
    ExpectingMacroVarName(&'static str),

    /// Invalid `!LET` variable name.
    #[error("Cannot use argument name or macro keyword \"{0}\" as !LET variable.")]
    BadLetVarName(Identifier),

    /// Invalid `!DO` variable name.
    #[error("Cannot use argument name or macro keyword as !DO variable.")]
    BadDoVarName,

    #[error("Expected `=' following !LET.")]
    ExpectingEquals,

    #[error("Expected `=' or !IN in !DO loop.")]
    ExpectingEqualsOrIn,

    #[error("Missing !DOEND.")]
    MissingDoEnd,

    /// Bad numeric macro expression.
    #[error("Macro expression must evaluate to a number (not \"{0}\").")]
    BadNumericMacroExpression(String),

    /// Too many iterations for list-based loop.
    #[error(
        "!DO loop over list exceeded maximum number of iterations {0}.  (Use SET MITERATE to change the limit.)"
    )]
    MiterateList(usize),

    /// Too many iterations for numerical loop.
    #[error(
        "Numerical !DO loop exceeded maximum number of iterations {0}.  (Use SET MITERATE to change the limit.)"
    )]
    MiterateNumeric(usize),

    #[error("Expected !TO in numerical !DO loop.")]
    ExpectingTo,

    #[error("!BY value cannot be zero.")]
    ZeroBy,

    #[error("!BREAK outside !DO.")]
    BreakOutsideDo,

    #[error("`,' or `)' expected in call to macro function {0}.")]
    ExpectingCommaOrRParen(&'static str),

    #[error("Missing `)' in call to macro function {0}.")]
    MissingRParen(&'static str),

    #[error("Macro function {name} takes one argument (not {n_args}).")]
    ExpectingOneArg { name: &'static str, n_args: usize },

    #[error("Macro function {name} takes two arguments (not {n_args}).")]
    ExpectingTwoArgs { name: &'static str, n_args: usize },

    #[error("Macro function {name} takes two or three arguments (not {n_args}).")]
    ExpectingTwoOrThreeArgs { name: &'static str, n_args: usize },

    #[error("Macro function {name} needs at least one argument.")]
    ExpectingOneOrMoreArgs { name: &'static str },

    #[error("Argument to !BLANKS must be non-negative integer (not \"{0}\").")]
    InvalidBlanks(String),

    #[error("Second argument of !SUBSTR must be positive integer (not \"{0}\").")]
    InvalidSubstr2(String),

    #[error("Third argument of !SUBSTR must be non-negative integer (not \"{0}\").")]
    InvalidSubstr3(String),
}

/// A PSPP macro as defined with `DEFINE`.
#[derive(Clone, Debug)]
pub struct Macro {
    /// The macro's name. This is an ordinary identifier except that it is
    /// allowed (but not required) to begin with `!`.
    pub name: Identifier,

    /// Source code location of macro definition, for error reporting.
    pub location: Location,

    /// Parameters.  Positional parameters, if any, come first.
    pub parameters: Vec<Parameter>,

    /// Body.
    pub body: Vec<MacroToken>,
}

impl Macro {
    /// Returns the index of the parameter named `name`.  A leading `!` on
    /// `name` is ignored, so that a keyword argument may be written either
    /// way, and case is not significant.
    pub fn find_parameter(&self, name: &str) -> Option<usize> {
        let name = UniCase::new(name.trim_start_matches('!'));
        self.parameters
            .iter()
            .position(|param| UniCase::new(param.name.without_bang()) == name)
    }
}

#[derive(Clone, Debug)]
pub struct Parameter {
    /// `!name` or `!1`.
    pub name: Identifier,

    /// Default value.
    ///
    /// The tokens don't include white space, etc. between them.
    pub default: Vec<MacroToken>,

    /// Macro-expand the argument before substituting it?
    pub expand_arg: bool,

    /// How the argument is specified.
    pub arg: ValueType,
}

impl Parameter {
    /// Returns true if this is a positional parameter. Positional parameters
    /// are expanded by index (position) rather than by name.
    pub fn is_positional(&self) -> bool {
        self.name
            .as_str()
            .as_bytes()
            .get(1)
            .is_some_and(u8::is_ascii_digit)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueType {
    /// Argument consists of `.0` tokens.
    NTokens(usize),

    /// Argument runs until token `.0`.
    CharEnd(Token),

    /// Argument starts with token `.0` and ends with token `.1`.
    Enclose(Token, Token),

    /// Argument runs until the end of the command.
    CmdEnd,
}

/// A token and the syntax that was tokenized to produce it.  The syntax allows
/// the token to be turned back into syntax accurately.
#[derive(Clone, Debug, PartialEq)]
pub struct MacroToken {
    /// The token.
    pub token: Token,

    /// The syntax that produces `token`.
    pub syntax: String,
}

impl MacroToken {
    pub fn new(token: Token, syntax: impl Into<String>) -> Self {
        Self {
            token,
            syntax: syntax.into(),
        }
    }
}

/// Defined macros, indexed by case-insensitive name.
#[derive(Clone, Debug, Default)]
pub struct MacroSet(HashMap<UniCase<String>, Macro>);

impl MacroSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `macro_`, replacing any existing macro with the same name.
    pub fn define(&mut self, macro_: Macro) {
        self.0
            .insert(UniCase::new(macro_.name.as_str().into()), macro_);
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.0.get(&UniCase::new(String::from(name)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Returns true if `s` names one of the keywords of the macro language,
/// with or without its leading `!`.
pub fn is_macro_keyword(s: &str) -> bool {
    const KEYWORDS: [&str; 19] = [
        "BREAK",
        "CHAREND",
        "CMDEND",
        "DEFAULT",
        "DO",
        "DOEND",
        "ELSE",
        "ENCLOSE",
        "ENDDEFINE",
        "IF",
        "IFEND",
        "IN",
        "LET",
        "NOEXPAND",
        "OFFEXPAND",
        "ONEXPAND",
        "POSITIONAL",
        "THEN",
        "TOKENS",
    ];
    let s = s.strip_prefix('!').unwrap_or(s);
    KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(s))
}

/// Expansion stack entry.
///
/// Frames form a chain from the innermost construct being expanded out to
/// the macro call that started it all, whose frame has no `next` and whose
/// `location` is where errors get reported.
#[derive(Clone, Debug)]
pub struct Frame<'a> {
    /// A macro name or `!IF`, `!DO`, etc.
    pub name: Option<&'a str>,

    /// Source location, if available.
    pub location: Option<&'a Location>,

    pub next: Option<&'a Frame<'a>>,
}

impl<'a> Frame<'a> {
    /// Returns the outermost frame, for a call at `location`.
    pub fn call_site(location: Option<&'a Location>) -> Self {
        Self {
            name: None,
            location,
            next: None,
        }
    }

    /// Returns a frame for `name` nested inside `self`.
    pub fn push(&'a self, name: &'a str, location: Option<&'a Location>) -> Frame<'a> {
        Frame {
            name: Some(name),
            location,
            next: Some(self),
        }
    }

    /// Turns `error`, detected at `mt` if known, into a [Diagnostic] that
    /// explains the chain of expansions that led to it.
    pub fn diagnostic(&self, mt: Option<&MacroToken>, error: MacroError) -> Diagnostic {
        let mut stack = Vec::new();
        let mut frame = self;
        while let Some(next) = frame.next {
            let name = frame.name.unwrap_or_default();
            let description = if stack.is_empty() {
                match mt.filter(|mt| !mt.syntax.is_empty()) {
                    Some(mt) => format!(
                        "At `{}' in the expansion of `{name}',",
                        ellipsize(&mt.syntax)
                    ),
                    None => format!("In the expansion of `{name}',"),
                }
            } else {
                format!("inside the expansion of `{name}',")
            };
            stack.push(Stack::new(
                frame.location.cloned().unwrap_or_default(),
                description,
            ));
            frame = next;
        }
        Diagnostic::syntax_error(error.to_string())
            .with_location(frame.location.cloned().unwrap_or_default())
            .with_stack(stack)
    }
}

/// Tokenizes `s` and appends the tokens to `output`.  Errors are reported in
/// the context of `stack`.
pub fn tokenize_string_into(
    s: &str,
    syntax: Syntax,
    stack: &Frame,
    error: &dyn Fn(Diagnostic),
    output: &mut Vec<MacroToken>,
) {
    for (segment, token) in StringSegmenter::new(s, syntax, true) {
        match token {
            ScanToken::Token(token) => output.push(MacroToken::new(token, segment)),
            ScanToken::Error(scan_error) => error(stack.diagnostic(
                Some(&MacroToken::new(Token::Stop, segment)),
                scan_error.into(),
            )),
        }
    }
}

pub fn tokenize_string(
    s: &str,
    syntax: Syntax,
    stack: &Frame,
    error: &dyn Fn(Diagnostic),
) -> Vec<MacroToken> {
    let mut tokens = Vec::new();
    tokenize_string_into(s, syntax, stack, error, &mut tokens);
    tokens
}

/// If `input` is exactly one quoted string, returns its contents.
fn try_unquote_string(input: &str, syntax: Syntax) -> Option<String> {
    let mut tokens = StringSegmenter::new(input, syntax, true);
    let Some((_, ScanToken::Token(Token::String(unquoted)))) = tokens.next() else {
        return None;
    };
    tokens.next().is_none().then_some(unquoted)
}

fn unquote_string(input: String, syntax: Syntax) -> String {
    try_unquote_string(&input, syntax).unwrap_or(input)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TokenClass {
    /// No space before or after (new-line after).
    EndCommand,

    /// Space on both sides.
    BinaryOperator,

    /// Space afterward.
    Comma,

    /// Don't need spaces except sequentially.
    Id,

    /// Don't need spaces except sequentially.
    Punct,
}

impl TokenClass {
    fn separator(prev: Self, next: Self) -> &'static str {
        match (prev, next) {
            // A command ends with a new-line but nothing comes before it.
            (Self::EndCommand, _) => "\n",
            (_, Self::EndCommand) => "",

            (Self::BinaryOperator, _) | (_, Self::BinaryOperator) | (Self::Comma, _) => " ",

            // Two identifiers, or two punctuators, in a row.
            (prev, next) if prev == next => " ",
            _ => "",
        }
    }
}

impl From<&Token> for TokenClass {
    fn from(source: &Token) -> Self {
        match source {
            Token::Id(_) | Token::MacroId(_) | Token::Number(_) | Token::String(_) => Self::Id,
            Token::End => Self::EndCommand,
            Token::Stop => Self::Punct,
            Token::Punct(punct) => match punct {
                Punct::LParen
                | Punct::RParen
                | Punct::LSquare
                | Punct::RSquare
                | Punct::LCurly
                | Punct::RCurly => Self::Punct,

                Punct::Plus
                | Punct::Dash
                | Punct::Asterisk
                | Punct::Slash
                | Punct::Equals
                | Punct::Colon
                | Punct::And
                | Punct::Or
                | Punct::Not
                | Punct::Eq
                | Punct::Ge
                | Punct::Gt
                | Punct::Le
                | Punct::Lt
                | Punct::Ne
                | Punct::All
                | Punct::By
                | Punct::To
                | Punct::With
                | Punct::Exp
                | Punct::Bang
                | Punct::Percent
                | Punct::Question
                | Punct::Backtick
                | Punct::Dot
                | Punct::Underscore => Self::BinaryOperator,

                // `!*` stands for arguments, so it spaces like one.
                Punct::BangAsterisk => Self::Id,

                Punct::Comma | Punct::Semicolon => Self::Comma,
            },
        }
    }
}

/// Regenerates syntax for `input`.  Each item is a separator to emit followed
/// by the syntax for one token.
pub fn macro_tokens_to_syntax(input: &[MacroToken]) -> impl Iterator<Item = [&str; 2]> {
    input
        .iter()
        .take(1)
        .map(|token| ["", token.syntax.as_str()])
        .chain(input.windows(2).map(|w| {
            let c0 = (&w[0].token).into();
            let c1 = (&w[1].token).into();
            [TokenClass::separator(c0, c1), w[1].syntax.as_str()]
        }))
}

/// Like [macro_tokens_to_syntax], but returns the syntax as a single string.
pub fn macro_tokens_to_string(input: &[MacroToken]) -> String {
    macro_tokens_to_syntax(input).flatten().collect()
}

/// Like [macro_tokens_to_string], but also returns the byte range of each
/// token's syntax within the string.
pub fn macro_tokens_to_syntax_with_ranges(input: &[MacroToken]) -> (String, Vec<Range<usize>>) {
    let mut syntax = String::new();
    let mut ranges = Vec::with_capacity(input.len());
    for [separator, token] in macro_tokens_to_syntax(input) {
        syntax.push_str(separator);
        let start = syntax.len();
        syntax.push_str(token);
        ranges.push(start..syntax.len());
    }
    (syntax, ranges)
}
