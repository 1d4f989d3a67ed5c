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

use std::{
    cell::{Cell, RefCell},
    io::Error as IoError,
    rc::Rc,
};

use crate::{
    identifier::Identifier,
    lex::{
        reader::{ErrorHandling, Reader, ReaderOptions, StringReader},
        scan::{ScanToken, StringSegmenter},
        segment::Syntax,
        token::{Punct, Token},
    },
    macros::{Macro, MacroToken, Parameter, ValueType},
    message::{Location, Severity},
    prompt::PromptStyle,
    settings::MacroSettings,
};

use super::{Lexer, Output};

type Captured = Rc<RefCell<Vec<Output>>>;

fn new_lexer(settings: MacroSettings) -> (Lexer, Captured) {
    let output = Captured::default();
    let mut lexer = Lexer::with_settings(settings);
    let sink = Rc::clone(&output);
    lexer.set_output(move |item| sink.borrow_mut().push(item));
    (lexer, output)
}

fn reader(input: &str) -> Box<dyn Reader> {
    reader_with(input, ReaderOptions::default())
}

fn reader_with(input: &str, options: ReaderOptions) -> Box<dyn Reader> {
    Box::new(StringReader::new(
        input,
        options.with_syntax(Syntax::Interactive),
    ))
}

fn id(s: &str) -> Token {
    Token::Id(Identifier::new(s).unwrap())
}

fn string(s: &str) -> Token {
    Token::String(String::from(s))
}

/// Reads tokens up to and including [Token::Stop].
fn collect_tokens(lexer: &mut Lexer) -> Vec<Token> {
    let mut tokens = Vec::new();
    loop {
        lexer.get();
        tokens.push(lexer.token().clone());
        if *lexer.token() == Token::Stop {
            break tokens;
        }
    }
}

fn check_tokens(actual: &[Token], expected: &[Token]) {
    if actual != expected {
        println!("tokens differ from expected:");
        let difference = diff::slice(expected, actual);
        for result in difference {
            match result {
                diff::Result::Left(token) => println!("-{token:?}"),
                diff::Result::Both(token, _) => println!(" {token:?}"),
                diff::Result::Right(token) => println!("+{token:?}"),
            }
        }
        panic!();
    }
}

fn render(output: &Output) -> String {
    match output {
        Output::Syntax(line) => format!("syntax: {line}"),
        Output::MacroExpansion(expansion) => format!("mprint: {expansion}"),
        Output::Diagnostic(diagnostic) => diagnostic.to_string(),
    }
}

fn check_output(actual: &Captured, expected: &[&str]) {
    let actual = actual.borrow().iter().map(render).collect::<Vec<_>>();
    let actual = actual.iter().map(String::as_str).collect::<Vec<_>>();
    if actual != expected {
        println!("output differs from expected:");
        let difference = diff::slice(expected, &actual);
        for result in difference {
            match result {
                diff::Result::Left(line) => println!("-{line}"),
                diff::Result::Both(line, _) => println!(" {line}"),
                diff::Result::Right(line) => println!("+{line}"),
            }
        }
        panic!();
    }
}

fn macro_tokens(s: &str) -> Vec<MacroToken> {
    StringSegmenter::new(s, Syntax::Interactive, true)
        .filter_map(|(syntax, token)| match token {
            ScanToken::Token(token) => Some(MacroToken::new(token, syntax)),
            ScanToken::Error(_) => None,
        })
        .collect()
}

fn define(lexer: &mut Lexer, name: &str, parameters: Vec<Parameter>, body: &str) {
    lexer.define_macro(Macro {
        name: Identifier::new(name).unwrap(),
        location: Location::default(),
        parameters,
        body: macro_tokens(body),
    });
}

#[test]
fn tokens_and_merging() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader("x = 'a' + \"b\" - 5.\ny.\n"));
    check_tokens(
        &collect_tokens(&mut lexer),
        &[
            id("x"),
            Token::Punct(Punct::Equals),
            string("ab"),
            Token::Number(-5.0),
            Token::End,
            id("y"),
            Token::End,
            Token::End,
            Token::Stop,
        ],
    );
}

#[test]
fn no_sources() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    assert_eq!(lexer.token(), &Token::Stop);
    lexer.get();
    assert_eq!(lexer.token(), &Token::Stop);
    assert_eq!(lexer.next(1), &Token::Stop);
    assert_eq!(lexer.error_handling(), ErrorHandling::Terminal);
    assert_eq!(
        lexer.error("").text,
        "At end of input: Syntax error."
    );
}

#[test]
fn lookahead_and_representation() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader_with(
        "first /* comment */ second 'x'.\nnext.\n",
        ReaderOptions::default().with_file_name("test.sps"),
    ));
    assert_eq!(lexer.token(), &Token::End);
    lexer.get();
    assert_eq!(lexer.token(), &id("first"));
    assert_eq!(lexer.next(1), &id("second"));
    assert_eq!(lexer.next(2), &string("x"));
    assert_eq!(lexer.next(3), &Token::End);

    // Lookahead doesn't go past the end of the command.
    assert_eq!(lexer.next(10), &Token::End);
    assert_eq!(lexer.next(-1), &Token::End);

    assert_eq!(lexer.ofs(), 0);
    assert_eq!(lexer.max_ofs(), 3);
    assert_eq!(
        lexer.next_representation(0, 2),
        "first /* comment */ second 'x'"
    );
    assert_eq!(lexer.ofs_representation(1, 1), "second");
    assert_eq!(lexer.get_location(0, 1).to_string(), "test.sps:1.1-26");
    assert!(!lexer.next_is_from_macro(0));

    lexer.get_n(4);
    assert_eq!(lexer.token(), &id("next"));
    assert_eq!(lexer.ofs(), 0);
    assert_eq!(lexer.get_location(0, 0).to_string(), "test.sps:2.1-4");
}

/// A [Reader] that counts how many times it has been asked for input.
struct CountingReader {
    inner: StringReader,
    reads: Rc<Cell<usize>>,
}

impl Reader for CountingReader {
    fn options(&self) -> &ReaderOptions {
        self.inner.options()
    }

    fn read(&mut self, buf: &mut String, prompt: PromptStyle) -> std::io::Result<usize> {
        self.reads.set(self.reads.get() + 1);
        self.inner.read(buf, prompt)
    }
}

#[test]
fn reads_on_demand() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    let reads = Rc::new(Cell::new(0));
    lexer.append(Box::new(CountingReader {
        inner: StringReader::new(
            "x y.\nz.\n",
            ReaderOptions::default().with_syntax(Syntax::Interactive),
        ),
        reads: Rc::clone(&reads),
    }));
    assert_eq!(reads.get(), 0);

    lexer.get();
    assert_eq!(lexer.token(), &id("x"));
    assert_eq!(lexer.next(1), &id("y"));
    assert_eq!(lexer.next(2), &Token::End);
    assert_eq!(reads.get(), 1);

    lexer.get_n(3);
    assert_eq!(lexer.token(), &id("z"));
    assert_eq!(reads.get(), 2);
}

#[test]
fn journal() {
    let (mut lexer, output) = new_lexer(MacroSettings::default());
    lexer.append(reader("a. b.\nc\n d.\n"));
    collect_tokens(&mut lexer);
    check_output(&output, &["syntax: a. b.", "syntax: c", "syntax:  d."]);
}

#[test]
fn journal_unterminated_last_line() {
    let (mut lexer, output) = new_lexer(MacroSettings::default());
    lexer.append(reader("a.\nb"));
    check_tokens(
        &collect_tokens(&mut lexer),
        &[id("a"), Token::End, id("b"), Token::End, Token::Stop],
    );
    check_output(&output, &["syntax: a.", "syntax: b"]);
}

#[test]
fn scan_errors() {
    let (mut lexer, output) = new_lexer(MacroSettings::default());
    lexer.append(reader("a \\ b.\n"));
    check_tokens(
        &collect_tokens(&mut lexer),
        &[id("a"), id("b"), Token::End, Token::End, Token::Stop],
    );
    check_output(
        &output,
        &[
            "1.3-3: error: Bad character `\\' in input.\n    1 | a \\ b.\n      |   ^",
            "syntax: a \\ b.",
        ],
    );
}

struct BrokenReader {
    options: ReaderOptions,
    sent: bool,
}

impl Reader for BrokenReader {
    fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn read(&mut self, buf: &mut String, _prompt: PromptStyle) -> std::io::Result<usize> {
        if self.sent {
            Err(IoError::other("disk on fire"))
        } else {
            self.sent = true;
            buf.push_str("a ");
            Ok(2)
        }
    }
}

#[test]
fn read_errors() {
    let (mut lexer, output) = new_lexer(MacroSettings::default());
    lexer.append(Box::new(BrokenReader {
        options: ReaderOptions::default()
            .with_file_name("broken.sps")
            .with_syntax(Syntax::Interactive),
        sent: false,
    }));
    check_tokens(
        &collect_tokens(&mut lexer),
        &[id("a"), Token::End, Token::Stop],
    );
    check_output(
        &output,
        &[
            "error: Error reading `broken.sps': disk on fire.",
            "syntax: a ",
        ],
    );
}

#[test]
fn include_and_append() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader("a.\n"));
    lexer.append(reader("b.\n"));
    check_tokens(
        &collect_tokens(&mut lexer),
        &[
            id("a"),
            Token::End,
            Token::End,
            Token::End,
            id("b"),
            Token::End,
            Token::End,
            Token::Stop,
        ],
    );

    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader("a.\nc.\n"));
    lexer.get_n(2);
    assert_eq!(lexer.token(), &Token::End);
    lexer.include(reader("b.\n"));
    assert_eq!(lexer.token(), &Token::End);
    check_tokens(
        &collect_tokens(&mut lexer),
        &[
            id("b"),
            Token::End,
            Token::End,
            Token::End,
            id("c"),
            Token::End,
            Token::End,
            Token::Stop,
        ],
    );
}

#[test]
fn trims_consumed_lines() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    let input = (0..50).map(|i| format!("x{i}.\n")).collect::<String>();
    lexer.append(reader(&input));
    while lexer.token() != &id("x40") {
        lexer.get();
    }
    let source = lexer.sources.front().unwrap();
    assert!(source.base > 0);
    assert!(source.buffer.len() < 20, "{:?}", source.buffer);
    assert_eq!(lexer.get_location(0, 0).to_string(), "41.1-3");
}

#[test]
fn macro_expansion() {
    let (mut lexer, output) = new_lexer(MacroSettings {
        print_expansions: true,
        ..MacroSettings::default()
    });
    define(&mut lexer, "!m", Vec::new(), "a b");
    lexer.append(reader("x !m y.\n"));
    lexer.get();
    assert_eq!(lexer.token(), &id("x"));
    assert!(!lexer.next_is_from_macro(0));
    assert!(lexer.next_is_from_macro(1));
    assert!(lexer.next_is_from_macro(2));
    assert!(!lexer.next_is_from_macro(3));
    assert_eq!(lexer.ofs_representation(0, 3), "x a b y");

    lexer.get();
    assert_eq!(lexer.token(), &id("a"));
    assert_eq!(lexer.get_location(0, 0).to_string(), "1.3-4");
    assert_eq!(
        lexer.error("bad").text,
        "In syntax expanded from `!m': bad."
    );
    assert_eq!(lexer.next_msg(Severity::Warning, 2, 2, "").text, "Syntax error.");

    check_tokens(
        &collect_tokens(&mut lexer),
        &[id("b"), id("y"), Token::End, Token::End, Token::Stop],
    );
    check_output(&output, &["mprint: a b", "syntax: x !m y."]);
}

#[test]
fn macro_arguments() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    define(
        &mut lexer,
        "!p",
        vec![Parameter {
            name: Identifier::new("!1").unwrap(),
            default: Vec::new(),
            expand_arg: true,
            arg: ValueType::NTokens(1),
        }],
        "!1 !1",
    );
    lexer.append(reader("!p z.\n"));
    check_tokens(
        &collect_tokens(&mut lexer),
        &[id("z"), id("z"), Token::End, Token::End, Token::Stop],
    );
}

#[test]
fn merge_within_expansion() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    define(&mut lexer, "!s", Vec::new(), "'a' + 'b'");
    lexer.append(reader("!s.\n"));
    lexer.get();
    assert_eq!(lexer.token(), &string("ab"));
    assert!(lexer.next_is_from_macro(0));
    assert_eq!(lexer.next_representation(0, 0), "'a' + 'b'");
}

#[test]
fn macros_not_expanded() {
    let (mut lexer, _) = new_lexer(MacroSettings {
        expand: false,
        ..MacroSettings::default()
    });
    define(&mut lexer, "!m", Vec::new(), "a b");
    lexer.append(reader("!m.\n"));
    check_tokens(
        &collect_tokens(&mut lexer),
        &[
            Token::MacroId(Identifier::new("!m").unwrap()),
            Token::End,
            Token::End,
            Token::Stop,
        ],
    );
}

#[test]
fn error_expecting() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader("x.\n"));
    lexer.get();
    assert_eq!(lexer.error_expecting(&["A"]).text, "Syntax error expecting A.");
    assert_eq!(
        lexer.error_expecting(&["A", "B"]).text,
        "Syntax error expecting A or B."
    );
    assert_eq!(
        lexer.error_expecting(&["A", "B", "C"]).text,
        "Syntax error expecting A, B, or C."
    );
    assert_eq!(
        lexer
            .error_expecting(&["A", "B", "C", "D", "E", "F", "G", "H", "I"])
            .text,
        "Syntax error expecting one of the following: A, B, C, D, E, F, G, H, I."
    );
}

#[test]
fn match_and_force() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader("dat lis 'f' 12 x /.\n"));
    lexer.get();
    assert!(lexer.at_keywords("DATA LIST"));
    assert!(!lexer.match_keywords("DATA FILE"));
    assert_eq!(lexer.token(), &id("dat"));
    assert!(lexer.match_keywords("DATA LIST"));
    assert!(!lexer.match_id("FILE"));
    assert_eq!(lexer.force_string(), Ok(String::from("f")));
    assert_eq!(
        lexer.force_string().unwrap_err().text,
        "Syntax error expecting string."
    );
    assert_eq!(lexer.force_integer(), Ok(12));
    assert_eq!(lexer.force_id(), Ok(Identifier::new("x").unwrap()));
    assert_eq!(
        lexer
            .force_match(&Token::Punct(Punct::Comma))
            .unwrap_err()
            .text,
        "Syntax error expecting `,'."
    );
    assert_eq!(
        lexer.end_of_command().unwrap_err().text,
        "Syntax error expecting end of command."
    );
    assert!(lexer.match_token(&Token::Punct(Punct::Slash)));
    assert_eq!(lexer.end_of_command(), Ok(()));
}

#[test]
fn discard_rest_of_command() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader("a b c.\nd.\n"));
    lexer.get();
    lexer.discard_rest_of_command();
    assert_eq!(lexer.token(), &Token::End);
    lexer.get();
    assert_eq!(lexer.token(), &id("d"));
}

#[test]
fn interactive_reset() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader_with(
        "x y\nz.\n",
        ReaderOptions::default().with_error_handling(ErrorHandling::Terminal),
    ));
    lexer.get();
    assert_eq!(lexer.token(), &id("x"));
    lexer.interactive_reset();
    assert_eq!(lexer.token(), &Token::End);
    lexer.get();
    assert_eq!(lexer.token(), &id("z"));
    assert_eq!(lexer.get_location(0, 0).to_string(), "2.1-1");
}

#[test]
fn discard_noninteractive() {
    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader("a b.\nc.\n"));
    lexer.append(reader_with(
        "t.\n",
        ReaderOptions::default().with_error_handling(ErrorHandling::Terminal),
    ));
    lexer.get();
    lexer.discard_noninteractive();
    assert_eq!(lexer.token(), &Token::End);
    assert_eq!(lexer.error_handling(), ErrorHandling::Terminal);
    lexer.get();
    assert_eq!(lexer.token(), &id("t"));

    let (mut lexer, _) = new_lexer(MacroSettings::default());
    lexer.append(reader_with(
        "a b.\n",
        ReaderOptions::default().with_error_handling(ErrorHandling::Ignore),
    ));
    lexer.get();
    lexer.discard_noninteractive();
    assert_eq!(lexer.token(), &id("a"));
}
