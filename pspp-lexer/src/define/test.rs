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

use crate::{
    identifier::Identifier,
    lex::{
        lexer::Lexer,
        reader::{ReaderOptions, StringReader},
        segment::Syntax,
        token::{Punct, Token},
    },
    macros::{MacroToken, ValueType},
};

use super::parse_define;

/// Returns a lexer for `input`, positioned just after `DEFINE`.
fn lexer_after_define(input: &str) -> Lexer {
    let mut lexer = Lexer::new();
    lexer.set_output(|_| ());
    lexer.append(Box::new(StringReader::new(
        input,
        ReaderOptions::default().with_syntax(Syntax::Interactive),
    )));
    lexer.get();
    assert!(lexer.match_id("DEFINE"));
    lexer
}

fn define_error(input: &str) -> String {
    let mut lexer = lexer_after_define(input);
    parse_define(&mut lexer).unwrap_err().text
}

fn id(s: &str) -> Token {
    Token::Id(Identifier::new(s).unwrap())
}

fn macro_id(s: &str) -> Token {
    Token::MacroId(Identifier::new(s).unwrap())
}

#[test]
fn define_and_expand() {
    let mut lexer = lexer_after_define("define !m()x y!enddefine.\n!m.\n");
    parse_define(&mut lexer).unwrap();
    assert_eq!(lexer.token(), &Token::End);

    let m = lexer.macros().get("!m").unwrap();
    assert!(m.parameters.is_empty());
    assert_eq!(
        m.body,
        vec![MacroToken::new(id("x"), "x"), MacroToken::new(id("y"), "y")]
    );

    lexer.get();
    assert_eq!(lexer.token(), &id("x"));
    assert!(lexer.next_is_from_macro(0));
    lexer.get();
    assert_eq!(lexer.token(), &id("y"));
    lexer.get();
    assert_eq!(lexer.token(), &Token::End);
}

#[test]
fn keyword_parameters() {
    let mut lexer = lexer_after_define(
        "define !k(arg1 = !tokens(1) / arg2 = !default(a b) !noexpand !charend('/'))
body !arg1
!enddefine.
",
    );
    parse_define(&mut lexer).unwrap();

    let m = lexer.macros().get("!k").unwrap();
    assert_eq!(m.location.to_string(), "1-3");
    assert_eq!(m.parameters.len(), 2);

    let arg1 = &m.parameters[0];
    assert_eq!(arg1.name.as_str(), "!arg1");
    assert!(arg1.default.is_empty());
    assert!(arg1.expand_arg);
    assert_eq!(arg1.arg, ValueType::NTokens(1));
    assert!(!arg1.is_positional());

    let arg2 = &m.parameters[1];
    assert_eq!(arg2.name.as_str(), "!arg2");
    assert_eq!(
        arg2.default,
        vec![MacroToken::new(id("a"), "a"), MacroToken::new(id("b"), "b")]
    );
    assert!(!arg2.expand_arg);
    assert_eq!(arg2.arg, ValueType::CharEnd(Token::Punct(Punct::Slash)));

    assert_eq!(
        m.body,
        vec![
            MacroToken::new(id("body"), "body"),
            MacroToken::new(macro_id("!arg1"), "!arg1")
        ]
    );
}

#[test]
fn positional_parameters() {
    let mut lexer = lexer_after_define(
        "define !p(!positional !tokens(1) / !positional !enclose('[', ']') / x = !cmdend)!1 !2!enddefine.\n",
    );
    parse_define(&mut lexer).unwrap();

    let m = lexer.macros().get("!p").unwrap();
    let names = m
        .parameters
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["!1", "!2", "!x"]);
    assert_eq!(m.parameters[0].arg, ValueType::NTokens(1));
    assert_eq!(
        m.parameters[1].arg,
        ValueType::Enclose(Token::Punct(Punct::LSquare), Token::Punct(Punct::RSquare))
    );
    assert_eq!(m.parameters[2].arg, ValueType::CmdEnd);
    assert_eq!(m.find_parameter("x"), Some(2));
}

#[test]
fn errors() {
    for (input, expected) in [
        (
            "define !p(x=!tokens(1) / !positional !tokens(1))x!enddefine.\n",
            "Positional parameters must precede keyword parameters.",
        ),
        (
            "define !p(x=!tokens(1) !cmdend)x!enddefine.\n",
            "Only one of !TOKENS, !CHAREND, !ENCLOSE, or !CMDEND is allowed.",
        ),
        (
            "define !p(x)x!enddefine.\n",
            "Syntax error expecting !TOKENS, !CHAREND, !ENCLOSE, or !CMDEND.",
        ),
        (
            "define !p(x=!charend('a b'))x!enddefine.\n",
            "String must contain exactly one token.",
        ),
        (
            "define !p(!x=!cmdend)x!enddefine.\n",
            "Keyword macro parameter must be named in definition without \"!\" prefix.",
        ),
        (
            "define !p(doend=!cmdend)x!enddefine.\n",
            "Cannot use macro keyword \"doend\" as an argument name.",
        ),
        (
            "define !p(x=!cmdend / x=!cmdend)x!enddefine.\n",
            "Macro parameter x is defined more than once.",
        ),
        (
            "define !p(x=!default(a) !default(b) !cmdend)x!enddefine.\n",
            "!DEFAULT is allowed only once per argument.",
        ),
        (
            "define !p(x=!tokens(0))x!enddefine.\n",
            "Syntax error expecting positive integer for !TOKENS.",
        ),
    ] {
        assert_eq!(define_error(input), expected, "{input:?}");
    }
}
