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

//! Parsing the `DEFINE` command.
//!
//! `DEFINE` defines a macro:
//!
//! ```text
//! DEFINE !name ([parameter [/parameter]...])
//! body
//! !ENDDEFINE.
//! ```
//!
//! The segmenter treats `DEFINE` specially, so that the macro name and each
//! line of the body arrive as [Token::String] and are not themselves subject
//! to macro expansion.

use thiserror::Error as ThisError;

use crate::{
    identifier::{Identifier, id_match_n_nonstatic},
    lex::{
        lexer::Lexer,
        scan::{ScanToken, StringScanner, token_from_segment},
        segment::Segmenter,
        token::{Punct, Token},
    },
    macros::{Macro, MacroToken, Parameter, ValueType, is_macro_keyword},
    message::{Category, Diagnostic, Location, Point, Severity},
};

#[derive(ThisError, Clone, Debug, PartialEq, Eq)]
pub enum DefineError {
    #[error("Syntax error expecting identifier.")]
    ExpectingIdentifier,

    #[error("Positional parameters must precede keyword parameters.")]
    PositionalAfterKeyword,

    #[error("Keyword macro parameter must be named in definition without \"!\" prefix.")]
    BangPrefix,

    #[error("Cannot use macro keyword \"{0}\" as an argument name.")]
    MacroKeyword(Identifier),

    #[error("Macro parameter {0} is defined more than once.")]
    DuplicateParameter(Identifier),

    #[error("!DEFAULT is allowed only once per argument.")]
    DuplicateDefault,

    #[error("Only one of !TOKENS, !CHAREND, !ENCLOSE, or !CMDEND is allowed.")]
    DuplicateArgType,

    #[error("Syntax error expecting positive integer for !TOKENS.")]
    ExpectingTokenCount,

    #[error("String must contain exactly one token.")]
    ExpectingOneToken,

    #[error("Syntax error expecting macro body or !ENDDEFINE.")]
    ExpectingBody,
}

/// Returns an error about tokens `n0` through `n1` relative to the current
/// token.
fn error(lexer: &mut Lexer, n0: isize, n1: isize, error: DefineError) -> Diagnostic {
    lexer.next_msg(Severity::Error, n0, n1, &error.to_string())
}

/// Matches `keyword`.  A keyword that begins with `!` must be a macro
/// identifier, and may be abbreviated to 4 characters.
fn match_macro_id(lexer: &mut Lexer, keyword: &str) -> bool {
    if !keyword.starts_with('!') {
        lexer.match_id(keyword)
    } else if lexer
        .token()
        .macro_id()
        .is_some_and(|id| id_match_n_nonstatic(keyword, id.as_str(), 4))
    {
        lexer.get();
        true
    } else {
        false
    }
}

/// Parses a string that must contain exactly one token and returns that
/// token.
fn parse_quoted_token(lexer: &mut Lexer) -> Result<Token, Diagnostic> {
    let Some(s) = lexer.token().as_string().map(String::from) else {
        return Err(lexer.error("Syntax error expecting string."));
    };
    let mut tokens = StringScanner::new(&s, lexer.syntax(), true);
    match (tokens.next(), tokens.next()) {
        (Some(ScanToken::Token(token)), None) => {
            lexer.get();
            Ok(token)
        }
        _ => Err(error(lexer, 0, 0, DefineError::ExpectingOneToken)),
    }
}

/// Returns an error if a parameter that already has argument type `arg` is
/// given another one.
fn check_dup_arg_type(lexer: &mut Lexer, arg: &Option<ValueType>) -> Result<(), Diagnostic> {
    match arg {
        Some(_) => Err(error(lexer, -1, -1, DefineError::DuplicateArgType)),
        None => Ok(()),
    }
}

/// Parses the options that follow a parameter's name.
fn parse_parameter_options(lexer: &mut Lexer, name: Identifier) -> Result<Parameter, Diagnostic> {
    let lparen = Token::Punct(Punct::LParen);
    let rparen = Token::Punct(Punct::RParen);

    let mut default = None;
    let mut expand_arg = true;
    let mut arg = None;
    loop {
        if match_macro_id(lexer, "!DEFAULT") {
            if default.is_some() {
                return Err(error(lexer, -1, -1, DefineError::DuplicateDefault));
            }
            lexer.force_match(&lparen)?;

            let mut tokens = Vec::new();
            while !lexer.match_token(&rparen) {
                if lexer.token().is_terminator() {
                    return Err(lexer.error_expecting(&["`)'"]));
                }
                let syntax = lexer.next_representation(0, 0);
                tokens.push(MacroToken::new(lexer.token().clone(), syntax));
                lexer.get();
            }
            default = Some(tokens);
        } else if match_macro_id(lexer, "!NOEXPAND") {
            expand_arg = false;
        } else if match_macro_id(lexer, "!TOKENS") {
            check_dup_arg_type(lexer, &arg)?;
            lexer.force_match(&lparen)?;
            let n = lexer
                .token()
                .as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|&n| n > 0);
            let Some(n) = n else {
                return Err(error(lexer, 0, 0, DefineError::ExpectingTokenCount));
            };
            lexer.get();
            lexer.force_match(&rparen)?;
            arg = Some(ValueType::NTokens(n));
        } else if match_macro_id(lexer, "!CHAREND") {
            check_dup_arg_type(lexer, &arg)?;
            lexer.force_match(&lparen)?;
            let end = parse_quoted_token(lexer)?;
            lexer.force_match(&rparen)?;
            arg = Some(ValueType::CharEnd(end));
        } else if match_macro_id(lexer, "!ENCLOSE") {
            check_dup_arg_type(lexer, &arg)?;
            lexer.force_match(&lparen)?;
            let start = parse_quoted_token(lexer)?;
            lexer.force_match(&Token::Punct(Punct::Comma))?;
            let end = parse_quoted_token(lexer)?;
            lexer.force_match(&rparen)?;
            arg = Some(ValueType::Enclose(start, end));
        } else if match_macro_id(lexer, "!CMDEND") {
            check_dup_arg_type(lexer, &arg)?;
            arg = Some(ValueType::CmdEnd);
        } else {
            break;
        }
    }

    let Some(arg) = arg else {
        return Err(lexer.error_expecting(&["!TOKENS", "!CHAREND", "!ENCLOSE", "!CMDEND"]));
    };
    Ok(Parameter {
        name,
        default: default.unwrap_or_default(),
        expand_arg,
        arg,
    })
}

fn parse_parameters(lexer: &mut Lexer) -> Result<Vec<Parameter>, Diagnostic> {
    lexer.force_match(&Token::Punct(Punct::LParen))?;

    let mut parameters: Vec<Parameter> = Vec::new();
    while !lexer.match_token(&Token::Punct(Punct::RParen)) {
        let name = if match_macro_id(lexer, "!POSITIONAL") {
            if parameters.last().is_some_and(|p| !p.is_positional()) {
                return Err(error(lexer, -1, -1, DefineError::PositionalAfterKeyword));
            }
            Identifier::new_unchecked(format!("!{}", parameters.len() + 1))
        } else {
            if lexer.token().macro_id().is_some() {
                return Err(error(lexer, 0, 0, DefineError::BangPrefix));
            }
            let Some(id) = lexer.token().id().cloned() else {
                return Err(error(lexer, 0, 0, DefineError::ExpectingIdentifier));
            };
            if is_macro_keyword(id.as_str()) {
                return Err(error(lexer, 0, 0, DefineError::MacroKeyword(id)));
            }
            if parameters
                .iter()
                .any(|p| p.name.without_bang().eq_ignore_ascii_case(id.as_str()))
            {
                return Err(error(lexer, 0, 0, DefineError::DuplicateParameter(id)));
            }
            lexer.get();
            Identifier::new_unchecked(format!("!{id}"))
        };
        lexer.match_token(&Token::Punct(Punct::Equals));

        parameters.push(parse_parameter_options(lexer, name)?);

        if *lexer.token() != Token::Punct(Punct::RParen) {
            lexer.force_match(&Token::Punct(Punct::Slash))?;
        }
    }
    Ok(parameters)
}

/// Parses the lines of a macro body through `!ENDDEFINE` and tokenizes them.
fn parse_body(lexer: &mut Lexer) -> Result<Vec<MacroToken>, Diagnostic> {
    let start = lexer.get_location(0, 0).span.map(|span| span.start);
    let mut body = String::new();
    while !match_macro_id(lexer, "!ENDDEFINE") {
        let Some(line) = lexer.token().as_string() else {
            return Err(error(lexer, 0, 0, DefineError::ExpectingBody));
        };
        body.push_str(line);
        body.push('\n');
        lexer.get();
    }

    let mut segmenter = Segmenter::new(lexer.syntax(), true);
    let mut tokens = Vec::new();
    let mut offset = 0;
    while let Ok(Some((seg_len, segment))) = segmenter.push(&body[offset..], true) {
        let syntax = &body[offset..offset + seg_len];
        match token_from_segment(syntax, segment) {
            Some(ScanToken::Token(token)) => tokens.push(MacroToken::new(token, syntax)),
            Some(ScanToken::Error(scan_error)) => {
                let span = start.map(|start| {
                    start.advance(&body[..offset])..start.advance(&body[..offset + seg_len])
                });
                let location = Location {
                    file_name: lexer.file_name(),
                    span,
                    ..Location::default()
                };
                return Err(Diagnostic::new(
                    Severity::Error,
                    Category::Syntax,
                    scan_error.to_string(),
                )
                .with_location(location));
            }
            None => (),
        }
        offset += seg_len;
    }
    Ok(tokens)
}

/// Parses the rest of a `DEFINE` command, with the lexer positioned just
/// after `DEFINE`, and adds the macro that it defines to `lexer`.
pub fn parse_define(lexer: &mut Lexer) -> Result<(), Diagnostic> {
    parse(lexer).map_err(|diagnostic| diagnostic.with_command_name("DEFINE"))
}

fn parse(lexer: &mut Lexer) -> Result<(), Diagnostic> {
    // The macro name is a string token so that the segmenter can keep it from
    // being macro-expanded.
    let name = lexer
        .token()
        .as_string()
        .filter(|name| Identifier::is_plausible(name.strip_prefix('!').unwrap_or(*name)).is_ok())
        .map(Identifier::new_unchecked);
    let Some(name) = name else {
        return Err(error(lexer, 0, 0, DefineError::ExpectingIdentifier));
    };
    let first_line = lexer.get_location(0, 0).span.map(|span| span.start.line);
    lexer.get();

    let parameters = parse_parameters(lexer)?;
    let body = parse_body(lexer)?;

    let last_line = lexer.get_location(-1, -1).span.map(|span| span.end.line);
    let location = Location {
        file_name: lexer.file_name(),
        span: first_line
            .zip(last_line)
            .map(|(first, last)| Point::new(first, None)..Point::new(last, None)),
        ..Location::default()
    };
    lexer.end_of_command()?;

    lexer.define_macro(Macro {
        name,
        location,
        parameters,
        body,
    });
    Ok(())
}

#[cfg(test)]
mod test;
