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

use std::{cell::RefCell, rc::Rc};

use pspp_lexer::{
    define::parse_define,
    identifier::Identifier,
    lex::{
        lexer::{Lexer, Output},
        reader::{ReaderOptions, StringReader},
        segment::Syntax,
        token::{Punct, Token},
    },
    settings::MacroSettings,
};

/// The result of running a syntax file through the lexer, defining macros
/// along the way.
#[derive(Default)]
struct Expansion {
    /// Each command other than `DEFINE`, without its terminator.
    commands: Vec<Vec<Token>>,

    /// Each diagnostic, as it would be displayed.
    diagnostics: Vec<String>,
}

fn expand(input: &str, settings: MacroSettings) -> Expansion {
    let diagnostics = Rc::new(RefCell::new(Vec::new()));
    let mut lexer = Lexer::with_settings(settings);
    let sink = Rc::clone(&diagnostics);
    lexer.set_output(move |output| {
        if let Output::Diagnostic(diagnostic) = output {
            sink.borrow_mut().push(diagnostic.to_string());
        }
    });
    lexer.append(Box::new(StringReader::new(
        input,
        ReaderOptions::default()
            .with_file_name("test.sps")
            .with_syntax(Syntax::Interactive),
    )));

    let mut commands = Vec::new();
    lexer.get();
    while *lexer.token() != Token::Stop {
        if lexer.match_id("DEFINE") {
            if let Err(diagnostic) = parse_define(&mut lexer) {
                lexer.emit(diagnostic);
                lexer.discard_rest_of_command();
            }
        } else if *lexer.token() != Token::End {
            let mut command = Vec::new();
            while !lexer.token().is_terminator() {
                command.push(lexer.token().clone());
                lexer.get();
            }
            commands.push(command);
        }
        lexer.get();
    }
    let diagnostics = diagnostics.take();
    Expansion {
        commands,
        diagnostics,
    }
}

fn id(s: &str) -> Token {
    Token::Id(Identifier::new(s).unwrap())
}

fn check_commands(actual: &[Vec<Token>], expected: &[Vec<Token>]) {
    if actual != expected {
        println!("commands differ from expected:");
        let difference = diff::slice(expected, actual);
        for result in difference {
            match result {
                diff::Result::Left(command) => println!("-{command:?}"),
                diff::Result::Both(command, _) => println!(" {command:?}"),
                diff::Result::Right(command) => println!("+{command:?}"),
            }
        }
        panic!();
    }
}

#[test]
fn positional_and_keyword_macros() {
    let expansion = expand(
        r#"DEFINE !vars(!POSITIONAL !CMDEND)
frequencies variables=!1
!ENDDEFINE.
!vars a b c.
DEFINE !twice(x = !TOKENS(1))!x !x!ENDDEFINE.
list !twice x=y.
"#,
        MacroSettings::default(),
    );
    assert_eq!(expansion.diagnostics, Vec::<String>::new());
    check_commands(
        &expansion.commands,
        &[
            vec![
                id("frequencies"),
                id("variables"),
                Token::Punct(Punct::Equals),
                id("a"),
                id("b"),
                id("c"),
            ],
            vec![id("list"), id("y"), id("y")],
        ],
    );
}

#[test]
fn bad_definition() {
    let expansion = expand(
        "DEFINE !bad(x)x!ENDDEFINE.\n!bad.\n",
        MacroSettings::default(),
    );
    assert_eq!(expansion.diagnostics.len(), 1);
    let first_line = expansion.diagnostics[0].lines().next().unwrap();
    assert_eq!(
        first_line,
        "test.sps:1.14-14: error: DEFINE: Syntax error expecting !TOKENS, !CHAREND, !ENCLOSE, or !CMDEND."
    );
    check_commands(
        &expansion.commands,
        &[vec![Token::MacroId(Identifier::new("!bad").unwrap())]],
    );
}

#[test]
fn unexpanded_when_disabled() {
    let expansion = expand(
        "DEFINE !m()x!ENDDEFINE.\n!m.\n",
        MacroSettings {
            expand: false,
            ..MacroSettings::default()
        },
    );
    assert_eq!(expansion.diagnostics, Vec::<String>::new());
    check_commands(
        &expansion.commands,
        &[vec![Token::MacroId(Identifier::new("!m").unwrap())]],
    );
}

#[test]
fn nesting_limit() {
    let expansion = expand(
        "DEFINE !r()!r!ENDDEFINE.\n!r.\n",
        MacroSettings {
            max_nest: 3,
            ..MacroSettings::default()
        },
    );
    assert!(
        expansion
            .diagnostics
            .iter()
            .any(|d| d.contains("Maximum nesting level 3 exceeded.")),
        "{:?}",
        expansion.diagnostics
    );
}
