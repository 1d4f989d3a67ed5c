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

//! Expanding macro bodies.

use std::{
    cell::{Cell, RefCell},
    cmp::Ordering,
    collections::HashMap,
    ops::RangeInclusive,
    vec::IntoIter,
};

use itertools::Itertools;
use num::Integer;

use crate::{
    identifier::Identifier,
    lex::{
        segment::Syntax,
        token::{Punct, Token},
    },
    message::Diagnostic,
    settings::MacroSettings,
};

use super::{
    Frame, Macro, MacroError, MacroSet, MacroToken, Parameter, call::Call, is_macro_keyword,
    macro_tokens_to_string, tokenize_string, tokenize_string_into, try_unquote_string,
    unquote_string,
};

/// A cursor over a sequence of macro tokens.
#[derive(Copy, Clone, Debug)]
struct MacroTokens<'a>(&'a [MacroToken]);

impl<'a> MacroTokens<'a> {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn first(&self) -> Option<&'a MacroToken> {
        self.0.first()
    }

    fn macro_id(&self) -> Option<&'a Identifier> {
        self.first().and_then(|mt| mt.token.macro_id())
    }

    /// Returns true if the first token's syntax is `s`, ignoring case.
    fn at_syntax(&self, s: &str) -> bool {
        self.first()
            .is_some_and(|mt| mt.syntax.eq_ignore_ascii_case(s))
    }

    fn at_punct(&self, punct: Punct) -> bool {
        self.first().is_some_and(|mt| mt.token.is_punct(punct))
    }

    fn at_macro_keyword(&self, keyword: &str) -> bool {
        self.first()
            .is_some_and(|mt| mt.token.is_macro_keyword(keyword))
    }

    /// Skips the first token if its syntax is `s`, ignoring case.
    fn match_syntax(&mut self, s: &str) -> bool {
        let matched = self.at_syntax(s);
        if matched {
            self.advance(1);
        }
        matched
    }

    fn match_relop(&mut self) -> Option<RelOp> {
        let relop = self.first().and_then(RelOp::from_macro_token)?;
        self.advance(1);
        Some(relop)
    }

    fn advance(&mut self, n: usize) {
        self.0 = self.0.get(n..).unwrap_or_default();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl RelOp {
    fn from_macro_token(mt: &MacroToken) -> Option<Self> {
        match &mt.token {
            Token::Punct(Punct::Equals) => Some(Self::Eq),

            // `NE` and the like are ordinary words inside macro expressions.
            Token::Punct(punct) if mt.syntax.starts_with(|c: char| !c.is_alphabetic()) => {
                match punct {
                    Punct::Ne => Some(Self::Ne),
                    Punct::Lt => Some(Self::Lt),
                    Punct::Gt => Some(Self::Gt),
                    Punct::Le => Some(Self::Le),
                    Punct::Ge => Some(Self::Ge),
                    _ => None,
                }
            }
            Token::MacroId(id) => [
                ("!EQ", Self::Eq),
                ("!NE", Self::Ne),
                ("!LT", Self::Lt),
                ("!GT", Self::Gt),
                ("!LE", Self::Le),
                ("!GE", Self::Ge),
            ]
            .into_iter()
            .find(|(name, _)| id.as_str().eq_ignore_ascii_case(name))
            .map(|(_, relop)| relop),
            _ => None,
        }
    }

    fn evaluate(&self, cmp: Ordering) -> bool {
        match self {
            Self::Eq => cmp == Ordering::Equal,
            Self::Ne => cmp != Ordering::Equal,
            Self::Lt => cmp == Ordering::Less,
            Self::Gt => cmp == Ordering::Greater,
            Self::Le => cmp != Ordering::Greater,
            Self::Ge => cmp != Ordering::Less,
        }
    }
}

fn bool_to_string(b: bool) -> String {
    if b {
        String::from("1")
    } else {
        String::from("0")
    }
}

/// Values for a `!DO` loop's variable.
enum DoInput {
    /// `!DO !var !IN (list)`.
    List(IntoIter<MacroToken>),

    /// `!DO !var = first !TO last !BY by`, counting up.
    Up { next: f64, last: f64, by: f64 },

    /// `!DO !var = first !TO last !BY by`, counting down.
    Down { next: f64, last: f64, by: f64 },
}

impl DoInput {
    fn from_list(items: Vec<MacroToken>) -> Self {
        Self::List(items.into_iter())
    }

    fn from_by(first: f64, last: f64, by: f64) -> Self {
        if by > 0.0 && first <= last {
            Self::Up {
                next: first,
                last,
                by,
            }
        } else if by < 0.0 && first >= last {
            Self::Down {
                next: first,
                last,
                by,
            }
        } else {
            Self::List(Vec::new().into_iter())
        }
    }

    fn too_many_iterations(&self, limit: usize) -> MacroError {
        match self {
            Self::List(_) => MacroError::MiterateList(limit),
            Self::Up { .. } | Self::Down { .. } => MacroError::MiterateNumeric(limit),
        }
    }
}

impl Iterator for DoInput {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self {
            Self::List(items) => items.next().map(|mt| mt.syntax),
            Self::Up { next, last, by } if *next <= *last => {
                let value = *next;
                *next += *by;
                Some(format!("{value}"))
            }
            Self::Down { next, last, by } if *next >= *last => {
                let value = *next;
                *next += *by;
                Some(format!("{value}"))
            }
            Self::Up { .. } | Self::Down { .. } => None,
        }
    }
}

/// Returns the number of tokens in `input` before the `!ELSE` or `!IFEND`
/// that ends the current clause of an `!IF`, skipping over nested `!IF`s.
fn find_ifend_clause(input: &[MacroToken]) -> Option<usize> {
    let mut nesting = 0;
    for (index, mt) in input.iter().enumerate() {
        let Some(id) = mt.token.macro_id() else {
            continue;
        };
        if id.as_str().eq_ignore_ascii_case("!IF") {
            nesting += 1;
        } else if id.matches_keyword_n("!IFEND", 4) {
            if nesting == 0 {
                return Some(index);
            }
            nesting -= 1;
        } else if id.matches_keyword_n("!ELSE", 4) && nesting == 0 {
            return Some(index);
        }
    }
    None
}

struct MacroFunction {
    name: &'static str,
    args: RangeInclusive<usize>,
    function: fn(&Expander, Vec<String>) -> Option<String>,
}

impl MacroFunction {
    fn check_args(&self, n_args: usize) -> Result<(), MacroError> {
        if self.args.contains(&n_args) {
            return Ok(());
        }
        let name = self.name;
        Err(match (*self.args.start(), *self.args.end()) {
            (1, 1) => MacroError::ExpectingOneArg { name, n_args },
            (2, 2) => MacroError::ExpectingTwoArgs { name, n_args },
            (2, 3) => MacroError::ExpectingTwoOrThreeArgs { name, n_args },
            _ => MacroError::ExpectingOneOrMoreArgs { name },
        })
    }
}

static MACRO_FUNCTIONS: [MacroFunction; 11] = [
    MacroFunction {
        name: "!BLANKS",
        args: 1..=1,
        function: expand_blanks,
    },
    MacroFunction {
        name: "!CONCAT",
        args: 1..=usize::MAX,
        function: expand_concat,
    },
    MacroFunction {
        name: "!EVAL",
        args: 1..=1,
        function: expand_eval,
    },
    MacroFunction {
        name: "!HEAD",
        args: 1..=1,
        function: expand_head,
    },
    MacroFunction {
        name: "!INDEX",
        args: 2..=2,
        function: expand_index,
    },
    MacroFunction {
        name: "!LENGTH",
        args: 1..=1,
        function: expand_length,
    },
    MacroFunction {
        name: "!QUOTE",
        args: 1..=1,
        function: expand_quote,
    },
    MacroFunction {
        name: "!SUBSTR",
        args: 2..=3,
        function: expand_substr,
    },
    MacroFunction {
        name: "!TAIL",
        args: 1..=1,
        function: expand_tail,
    },
    MacroFunction {
        name: "!UNQUOTE",
        args: 1..=1,
        function: expand_unquote,
    },
    MacroFunction {
        name: "!UPCASE",
        args: 1..=1,
        function: expand_upcase,
    },
];

fn parse_count(s: &str) -> Option<usize> {
    s.trim().parse().ok()
}

fn expand_blanks(e: &Expander, args: Vec<String>) -> Option<String> {
    match parse_count(&args[0]) {
        Some(n) => Some(" ".repeat(n)),
        None => {
            e.error(None, MacroError::InvalidBlanks(args[0].clone()));
            None
        }
    }
}

fn expand_concat(e: &Expander, args: Vec<String>) -> Option<String> {
    Some(
        args.into_iter()
            .map(|arg| try_unquote_string(&arg, e.syntax).unwrap_or(arg))
            .collect(),
    )
}

fn expand_eval(e: &Expander, args: Vec<String>) -> Option<String> {
    let tokens = tokenize_string(&args[0], e.syntax, e.stack, e.error);
    let frame = e.stack.push("!EVAL", None);
    let subexpander = Expander {
        break_: None,
        stack: &frame,
        ..*e
    };
    let mut output = Vec::new();
    subexpander.expand(&tokens, &mut output);
    Some(macro_tokens_to_string(&output))
}

fn expand_head(e: &Expander, mut args: Vec<String>) -> Option<String> {
    let arg = unquote_string(args.remove(0), e.syntax);
    let tokens = tokenize_string(&arg, e.syntax, e.stack, e.error);
    Some(
        tokens
            .into_iter()
            .next()
            .map(|mt| mt.syntax)
            .unwrap_or_default(),
    )
}

fn expand_index(_e: &Expander, args: Vec<String>) -> Option<String> {
    let haystack = &args[0];
    let needle = &args[1];
    let position = haystack
        .find(needle.as_str())
        .map_or(0, |offset| haystack[..offset].chars().count() + 1);
    Some(position.to_string())
}

fn expand_length(e: &Expander, mut args: Vec<String>) -> Option<String> {
    Some(unquote_string(args.remove(0), e.syntax).len().to_string())
}

fn expand_quote(e: &Expander, mut args: Vec<String>) -> Option<String> {
    let arg = args.remove(0);
    if try_unquote_string(&arg, e.syntax).is_some() {
        Some(arg)
    } else {
        let mut output = String::with_capacity(arg.len() + 2);
        output.push('\'');
        for c in arg.chars() {
            if c == '\'' {
                output.push('\'');
            }
            output.push(c);
        }
        output.push('\'');
        Some(output)
    }
}

fn expand_substr(e: &Expander, args: Vec<String>) -> Option<String> {
    let Some(start) = parse_count(&args[1]).filter(|start| *start >= 1) else {
        e.error(None, MacroError::InvalidSubstr2(args[1].clone()));
        return None;
    };
    let count = match args.get(2) {
        Some(arg) => {
            let Some(count) = parse_count(arg) else {
                e.error(None, MacroError::InvalidSubstr3(arg.clone()));
                return None;
            };
            count
        }
        None => usize::MAX,
    };
    let s = unquote_string(args[0].clone(), e.syntax);
    Some(s.chars().skip(start - 1).take(count).collect())
}

fn expand_tail(e: &Expander, mut args: Vec<String>) -> Option<String> {
    let arg = unquote_string(args.remove(0), e.syntax);
    let tokens = tokenize_string(&arg, e.syntax, e.stack, e.error);
    Some(
        tokens
            .get(1..)
            .map(macro_tokens_to_string)
            .unwrap_or_default(),
    )
}

fn expand_unquote(e: &Expander, mut args: Vec<String>) -> Option<String> {
    Some(unquote_string(args.remove(0), e.syntax))
}

fn expand_upcase(e: &Expander, mut args: Vec<String>) -> Option<String> {
    Some(unquote_string(args.remove(0), e.syntax).to_uppercase())
}

/// Macro expander.
///
/// An expander is cheap to copy.  Constructs that need a different context,
/// such as `!DO` loops and nested macro calls, copy the expander and change a
/// few fields.
#[derive(Copy, Clone)]
pub(super) struct Expander<'a> {
    /// Macros to expand recursively.
    pub macros: &'a MacroSet,

    pub settings: &'a MacroSettings,

    /// Error reporting callback.
    pub error: &'a dyn Fn(Diagnostic),

    /// Tokenization mode.
    pub syntax: Syntax,

    /// Remaining nesting levels.
    pub nesting_countdown: usize,

    /// Stack for error reporting.
    pub stack: &'a Frame<'a>,

    /// May macro calls be expanded?  Changed by `!ONEXPAND` and `!OFFEXPAND`.
    pub expand: &'a Cell<bool>,

    /// Variables from `!DO` and `!LET`.
    pub vars: &'a RefCell<HashMap<Identifier, String>>,

    /// Only set if inside a `!DO` loop. If true, break out of the loop.
    pub break_: Option<&'a Cell<bool>>,

    /// Only set if expanding a macro (and not, say, a macro argument).
    pub macro_: Option<&'a Macro>,

    /// Only set if expanding a macro (and not, say, a macro argument).
    pub args: Option<&'a [Vec<MacroToken>]>,
}

impl<'a> Expander<'a> {
    fn error(&self, mt: Option<&MacroToken>, error: MacroError) {
        (self.error)(self.stack.diagnostic(mt, error))
    }

    fn should_break(&self) -> bool {
        self.break_.is_some_and(Cell::get)
    }

    fn tokenize_into(&self, s: &str, output: &mut Vec<MacroToken>) {
        tokenize_string_into(s, self.syntax, self.stack, self.error, output)
    }

    /// Expands `input` into `output`.
    pub fn expand(&self, input: &[MacroToken], output: &mut Vec<MacroToken>) {
        if self.nesting_countdown == 0 {
            self.error(
                None,
                MacroError::TooDeep {
                    limit: self.settings.max_nest,
                },
            );
            output.extend_from_slice(input);
            return;
        }

        let mut input = MacroTokens(input);
        while !input.is_empty() && !self.should_break() {
            self.expand__(&mut input, output);
        }
    }

    fn expand_param(&self, param: &Parameter, arg: &[MacroToken], output: &mut Vec<MacroToken>) {
        if self.expand.get() && param.expand_arg {
            let vars = RefCell::new(HashMap::new());
            let frame = self.stack.push(param.name.as_str(), None);
            let subexpander = Expander {
                break_: None,
                vars: &vars,
                stack: &frame,
                macro_: None,
                args: None,
                ..*self
            };
            subexpander.expand(arg, output);
        } else {
            output.extend_from_slice(arg);
        }
    }

    /// If `token` names an argument of the macro being expanded, or `!*`, or a
    /// macro variable, appends its value to `output` and returns true.
    /// Otherwise, returns false.
    pub fn expand_arg(&self, token: &Token, output: &mut Vec<MacroToken>) -> bool {
        if let Some((macro_, args)) = self.macro_.zip(self.args) {
            match token {
                Token::MacroId(id) => {
                    if let Some(index) = macro_.find_parameter(id.as_str()) {
                        if let Some(arg) = args.get(index) {
                            self.expand_param(&macro_.parameters[index], arg, output);
                        }
                        return true;
                    }
                }
                Token::Punct(Punct::BangAsterisk) => {
                    for (param, arg) in macro_
                        .parameters
                        .iter()
                        .zip(args)
                        .take_while(|(param, _)| param.is_positional())
                    {
                        self.expand_param(param, arg, output);
                    }
                    return true;
                }
                _ => (),
            }
        }

        if let Token::MacroId(id) = token {
            let value = self.vars.borrow().get(id).cloned();
            if let Some(value) = value {
                self.tokenize_into(&value, output);
                return true;
            }
        }
        false
    }

    /// Parses the arguments to a macro function, starting just after the
    /// opening parenthesis.
    fn parse_function_args(
        &self,
        name: &'static str,
        input: &mut MacroTokens,
    ) -> Option<Vec<String>> {
        let mut args = Vec::new();
        while !input.is_empty() {
            if input.at_punct(Punct::RParen) {
                input.advance(1);
                return Some(args);
            }

            args.push(self.parse_function_arg(input));
            match input.first() {
                None => break,
                Some(mt) if mt.token.is_punct(Punct::Comma) => input.advance(1),
                Some(mt) if mt.token.is_punct(Punct::RParen) => {
                    input.advance(1);
                    return Some(args);
                }
                Some(mt) => {
                    self.error(Some(mt), MacroError::ExpectingCommaOrRParen(name));
                    return None;
                }
            }
        }
        self.error(None, MacroError::MissingRParen(name));
        None
    }

    /// Parses one function argument from `input`.  Each argument to a macro
    /// function is one of:
    ///
    /// - A quoted string or other single literal token.
    ///
    /// - An argument to the macro being expanded, e.g. `!1` or a named
    ///   argument.
    ///
    /// - `!*`.
    ///
    /// - A macro variable.
    ///
    /// - A function invocation.
    ///
    /// Each function invocation yields a character sequence to be turned into a
    /// sequence of tokens.  The case where that character sequence is a single
    /// quoted string is an important special case.
    fn parse_function_arg(&self, input: &mut MacroTokens) -> String {
        let Some(mt) = input.first() else {
            return String::new();
        };
        if let Some(macro_) = self.macro_ {
            match &mt.token {
                Token::MacroId(id) => {
                    if let Some(index) = macro_.find_parameter(id.as_str()) {
                        input.advance(1);
                        return self
                            .args
                            .and_then(|args| args.get(index))
                            .map(|arg| macro_tokens_to_string(arg))
                            .unwrap_or_default();
                    }
                    let value = self.vars.borrow().get(id).cloned();
                    if let Some(value) = value {
                        input.advance(1);
                        return value;
                    }
                    if let Some(output) = self.expand_macro_function(input) {
                        return output;
                    }
                }
                Token::Punct(Punct::BangAsterisk) => {
                    input.advance(1);
                    return macro_
                        .parameters
                        .iter()
                        .zip(self.args.unwrap_or_default())
                        .take_while(|(param, _)| param.is_positional())
                        .map(|(_, arg)| macro_tokens_to_string(arg))
                        .join(" ");
                }
                _ => (),
            }
        }
        input.advance(1);
        mt.syntax.clone()
    }

    /// Expands a macro function call at the start of `input`, if there is
    /// one, and returns its output.
    fn expand_macro_function(&self, orig_input: &mut MacroTokens) -> Option<String> {
        let mut input = *orig_input;
        let name = input.macro_id()?;
        if name.matches_keyword_n("!NULL", 4) {
            orig_input.advance(1);
            return Some(String::new());
        }

        input.advance(1);
        if !input.at_punct(Punct::LParen) {
            return None;
        }
        input.advance(1);

        let function = MACRO_FUNCTIONS
            .iter()
            .find(|function| name.matches_keyword_n(function.name, 4))?;
        let args = self.parse_function_args(function.name, &mut input)?;
        if let Err(error) = function.check_args(args.len()) {
            self.error(None, error);
            return None;
        }

        let output = (function.function)(self, args)?;
        *orig_input = input;
        Some(output)
    }

    fn evaluate_literal(&self, input: &mut MacroTokens) -> Option<String> {
        let mt = input.first()?;
        match mt.token {
            Token::Punct(Punct::LParen) => {
                input.advance(1);
                let value = self.evaluate_or(input)?;
                if input.at_punct(Punct::RParen) {
                    input.advance(1);
                    Some(value)
                } else {
                    self.error(input.first(), MacroError::ExpectingRParen);
                    None
                }
            }
            Token::Punct(Punct::RParen) => {
                self.error(Some(mt), MacroError::ExpectingLiteral);
                None
            }
            _ => Some(unquote_string(self.parse_function_arg(input), self.syntax)),
        }
    }

    fn evaluate_relational(&self, input: &mut MacroTokens) -> Option<String> {
        let lhs = self.evaluate_literal(input)?;
        let Some(relop) = input.match_relop() else {
            return Some(lhs);
        };
        let rhs = self.evaluate_literal(input)?;
        let cmp = unquote_string(lhs, self.syntax).cmp(&unquote_string(rhs, self.syntax));
        Some(bool_to_string(relop.evaluate(cmp)))
    }

    fn evaluate_not(&self, input: &mut MacroTokens) -> Option<String> {
        let mut negations = 0usize;
        while input.match_syntax("!NOT") || input.match_syntax("~") {
            negations += 1;
        }

        let operand = self.evaluate_relational(input)?;
        if negations == 0 {
            return Some(operand);
        }
        Some(bool_to_string((operand != "0") ^ negations.is_odd()))
    }

    fn evaluate_and(&self, input: &mut MacroTokens) -> Option<String> {
        let mut lhs = self.evaluate_not(input)?;
        while input.match_syntax("!AND") || input.match_syntax("&") {
            let rhs = self.evaluate_not(input)?;
            lhs = bool_to_string(lhs != "0" && rhs != "0");
        }
        Some(lhs)
    }

    fn evaluate_or(&self, input: &mut MacroTokens) -> Option<String> {
        let mut lhs = self.evaluate_and(input)?;
        while input.match_syntax("!OR") || input.match_syntax("|") {
            let rhs = self.evaluate_and(input)?;
            lhs = bool_to_string(lhs != "0" || rhs != "0");
        }
        Some(lhs)
    }

    fn evaluate_number(&self, input: &mut MacroTokens) -> Option<f64> {
        let s = self.evaluate_or(input)?;
        let tokens = tokenize_string(&s, self.syntax, self.stack, self.error);
        match tokens.as_slice() {
            [MacroToken {
                token: Token::Number(number),
                ..
            }] => Some(*number),
            _ => {
                self.error(tokens.first(), MacroError::BadNumericMacroExpression(s));
                None
            }
        }
    }

    fn expand_if(&self, orig_input: &mut MacroTokens, output: &mut Vec<MacroToken>) -> bool {
        let mut input = *orig_input;
        if !input.match_syntax("!IF") {
            return false;
        }
        let Some(result) = self.evaluate_or(&mut input) else {
            return false;
        };
        if !input.at_macro_keyword("!THEN") {
            self.error(input.first(), MacroError::ExpectingThen);
            return false;
        }
        input.advance(1);

        let Some(then_len) = find_ifend_clause(input.0) else {
            self.error(None, MacroError::ExpectingElseOrIfEnd);
            return false;
        };
        let then_clause = &input.0[..then_len];
        input.advance(then_len);

        let else_clause = if input
            .macro_id()
            .is_some_and(|id| id.matches_keyword_n("!ELSE", 4))
        {
            input.advance(1);
            let end = find_ifend_clause(input.0);
            let ifend = end.and_then(|end| input.0.get(end));
            if !ifend
                .and_then(|mt| mt.token.macro_id())
                .is_some_and(|id| id.matches_keyword_n("!IFEND", 4))
            {
                self.error(ifend, MacroError::ExpectingIfEnd);
                return false;
            }
            let else_len = end.unwrap_or_default();
            let else_clause = &input.0[..else_len];
            input.advance(else_len);
            Some(else_clause)
        } else {
            None
        };

        // Skip `!IFEND`.
        input.advance(1);

        let clause = if result != "0" {
            Some(then_clause)
        } else {
            else_clause
        };
        if let Some(clause) = clause.filter(|clause| !clause.is_empty()) {
            let frame = self.stack.push("!IF", None);
            let subexpander = Expander {
                stack: &frame,
                ..*self
            };
            subexpander.expand(clause, output);
        }
        *orig_input = input;
        true
    }

    /// Returns true if `name` may not be used as a `!LET` or `!DO` variable,
    /// because it is a macro keyword or the name of an argument.
    fn is_reserved_var_name(&self, name: &Identifier) -> bool {
        is_macro_keyword(name.as_str())
            || self
                .macro_
                .is_some_and(|macro_| macro_.find_parameter(name.as_str()).is_some())
    }

    fn expand_let(&self, orig_input: &mut MacroTokens) -> bool {
        let mut input = *orig_input;
        if !input.match_syntax("!LET") {
            return false;
        }

        let Some(var_name) = input.macro_id() else {
            self.error(input.first(), MacroError::ExpectingMacroVarName("!LET"));
            return false;
        };
        if self.is_reserved_var_name(var_name) {
            self.error(input.first(), MacroError::BadLetVarName(var_name.clone()));
            return false;
        }
        input.advance(1);

        if !input.at_punct(Punct::Equals) {
            self.error(input.first(), MacroError::ExpectingEquals);
            return false;
        }
        input.advance(1);

        let Some(value) = self.evaluate_or(&mut input) else {
            return false;
        };
        self.vars.borrow_mut().insert(var_name.clone(), value);
        *orig_input = input;
        true
    }

    /// Finds the `!DOEND` that ends the body of a `!DO` loop that begins at
    /// the start of `input`, skipping over nested loops.  Returns the body and
    /// advances `input` past the `!DOEND`.
    fn find_doend<'b>(&self, input: &mut MacroTokens<'b>) -> Option<&'b [MacroToken]> {
        let tokens = input.0;
        let mut nesting = 0;
        for (index, mt) in tokens.iter().enumerate() {
            let Some(id) = mt.token.macro_id() else {
                continue;
            };
            if id.as_str().eq_ignore_ascii_case("!DO") {
                nesting += 1;
            } else if id.matches_keyword_n("!DOEND", 4) {
                if nesting == 0 {
                    input.advance(index + 1);
                    return Some(&tokens[..index]);
                }
                nesting -= 1;
            }
        }
        self.error(None, MacroError::MissingDoEnd);
        None
    }

    fn expand_do(&self, orig_input: &mut MacroTokens, output: &mut Vec<MacroToken>) -> bool {
        let mut input = *orig_input;
        if !input.match_syntax("!DO") {
            return false;
        }

        let Some(var_name) = input.macro_id() else {
            self.error(input.first(), MacroError::ExpectingMacroVarName("!DO"));
            return false;
        };
        if self.is_reserved_var_name(var_name) {
            self.error(input.first(), MacroError::BadDoVarName);
            return false;
        }
        input.advance(1);

        let break_ = Cell::new(false);
        let frame = self.stack.push("!DO", None);
        let subexpander = Expander {
            break_: Some(&break_),
            stack: &frame,
            ..*self
        };

        let (items, body) = if input.at_macro_keyword("!IN") {
            input.advance(1);
            let Some(list) = subexpander.evaluate_or(&mut input) else {
                return false;
            };
            let items = tokenize_string(&list, self.syntax, self.stack, self.error);
            let Some(body) = subexpander.find_doend(&mut input) else {
                return false;
            };
            (DoInput::from_list(items), body)
        } else if input.at_punct(Punct::Equals) {
            input.advance(1);
            let Some(first) = subexpander.evaluate_number(&mut input) else {
                return false;
            };
            if !input.at_macro_keyword("!TO") {
                subexpander.error(input.first(), MacroError::ExpectingTo);
                return false;
            }
            input.advance(1);
            let Some(last) = subexpander.evaluate_number(&mut input) else {
                return false;
            };
            let by = if input.at_macro_keyword("!BY") {
                input.advance(1);
                let Some(by) = subexpander.evaluate_number(&mut input) else {
                    return false;
                };
                if by == 0.0 {
                    subexpander.error(None, MacroError::ZeroBy);
                    return false;
                }
                by
            } else {
                1.0
            };
            let Some(body) = subexpander.find_doend(&mut input) else {
                return false;
            };
            (DoInput::from_by(first, last, by), body)
        } else {
            self.error(input.first(), MacroError::ExpectingEqualsOrIn);
            return false;
        };

        let limit = self.settings.max_iterations;
        let too_many = items.too_many_iterations(limit);
        for (i, item) in items.enumerate() {
            if break_.get() {
                break;
            }
            if i >= limit {
                subexpander.error(None, too_many);
                break;
            }
            self.vars.borrow_mut().insert(var_name.clone(), item);
            subexpander.expand(body, output);
        }
        *orig_input = input;
        true
    }

    fn expand__(&self, input: &mut MacroTokens, output: &mut Vec<MacroToken>) {
        // Recursive macro calls.
        if self.expand.get() {
            if let Some(call) = Call::for_tokens(*self, input.0) {
                let macro_ = call.macro_();
                let vars = RefCell::new(HashMap::new());
                let frame = self.stack.push(macro_.name.as_str(), Some(&macro_.location));
                let subexpander = Expander {
                    macros: call.macros(),
                    break_: None,
                    vars: &vars,
                    nesting_countdown: self.nesting_countdown - 1,
                    stack: &frame,
                    macro_: Some(macro_),
                    args: Some(call.args()),
                    ..*self
                };
                subexpander.expand(&macro_.body, output);
                input.advance(call.len());
                return;
            }
        }

        let Some(mt) = input.first() else {
            return;
        };

        // Only identifiers beginning with `!` receive further processing.
        if !matches!(
            mt.token,
            Token::MacroId(_) | Token::Punct(Punct::BangAsterisk)
        ) {
            output.push(mt.clone());
            input.advance(1);
            return;
        }

        // Parameters and macro variables.
        if self.expand_arg(&mt.token, output) {
            input.advance(1);
            return;
        }

        // Macro functions.
        if let Some(function_output) = self.expand_macro_function(input) {
            self.tokenize_into(&function_output, output);
            return;
        }

        if self.expand_if(input, output) || self.expand_let(input) || self.expand_do(input, output)
        {
            return;
        }

        input.advance(1);
        match mt.token.macro_id() {
            Some(id) if id.matches_keyword_n("!BREAK", 4) => match self.break_ {
                Some(break_) => break_.set(true),
                None => self.error(Some(mt), MacroError::BreakOutsideDo),
            },
            Some(id) if id.matches_keyword_n("!ONEXPAND", 4) => self.expand.set(true),
            Some(id) if id.matches_keyword_n("!OFFEXPAND", 4) => self.expand.set(false),
            _ => output.push(mt.clone()),
        }
    }
}
