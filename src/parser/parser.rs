//! Render target parser
//!
//! Parses Graphite render targets into [`Expr`] trees.
//!
//! # Supported Syntax
//!
//! ```text
//! expr    := name | const | string | func '(' arglist ')' | expr '|' func '(' arglist ')'
//! arglist := [ arg (',' arg)* ]
//! arg     := expr | key '=' literal
//! ```
//!
//! # Examples
//!
//! ```text
//! servers.{web,db}[0-9].load
//! scale(servers.web1.load, 2e-3)
//! movingAverage(servers.web1.load, windowSize='5min')
//! servers.web1.load|scale(10)|alias('load x10')
//! ```

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, one_of},
    combinator::opt,
    error::ErrorKind,
    IResult,
};

use crate::parser::ast::{Call, Expr};
use crate::parser::error::{ParseError, ParseResult};

/// Internal failure carrying the input slice where it happened
#[derive(Debug, Clone, PartialEq)]
struct Failure<'a> {
    input: &'a str,
    kind: FailureKind,
}

#[derive(Debug, Clone, PartialEq)]
enum FailureKind {
    Nom,
    MissingExpr,
    MissingQuote(char),
    MissingParen,
    UnmatchedBrace,
    MissingComma,
    BadNamedArgument(String),
    DuplicateNamedArgument(String),
    PipeTarget,
}

impl<'a> nom::error::ParseError<&'a str> for Failure<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Failure {
            input,
            kind: FailureKind::Nom,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl Failure<'_> {
    fn into_parse_error(self, original: &str) -> ParseError {
        let position = original.len() - self.input.len();
        let next = self.input.chars().next();
        let missing_comma = self.kind == FailureKind::MissingComma;
        match self.kind {
            FailureKind::MissingExpr => ParseError::MissingExpr { position },
            FailureKind::MissingQuote(quote) => ParseError::MissingQuote { position, quote },
            FailureKind::MissingParen => ParseError::MissingParen { position },
            FailureKind::UnmatchedBrace => ParseError::UnmatchedBrace { position },
            FailureKind::BadNamedArgument(name) => ParseError::BadNamedArgument { position, name },
            FailureKind::DuplicateNamedArgument(name) => {
                ParseError::DuplicateNamedArgument { position, name }
            }
            FailureKind::PipeTarget => ParseError::PipeTarget { position },
            FailureKind::MissingComma | FailureKind::Nom => match next {
                Some(character) if missing_comma => {
                    ParseError::MissingComma { position, character }
                }
                Some(character) => ParseError::UnexpectedCharacter { position, character },
                None => ParseError::MissingExpr { position },
            },
        }
    }
}

type PResult<'a, T> = IResult<&'a str, T, Failure<'a>>;

fn fail<T>(input: &str, kind: FailureKind) -> PResult<'_, T> {
    Err(nom::Err::Failure(Failure { input, kind }))
}

/// Parse a render target, returning the expression and any unconsumed input
pub fn parse_expr(input: &str) -> ParseResult<(Expr, &str)> {
    match expression(input) {
        Ok((rest, expr)) => Ok((expr, rest)),
        Err(nom::Err::Error(f)) | Err(nom::Err::Failure(f)) => Err(f.into_parse_error(input)),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::MissingExpr {
            position: input.len(),
        }),
    }
}

/// Parse a render target that must consume the whole input
pub fn parse(input: &str) -> ParseResult<Expr> {
    let (expr, rest) = parse_expr(input)?;
    let trailing = rest.trim_start();

    match trailing.chars().next() {
        Some(character) => Err(ParseError::UnexpectedCharacter {
            position: input.len() - trailing.len(),
            character,
        }),
        None => Ok(expr),
    }
}

/// Whether `c` may appear in a bare metric name
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '.' | '_' | '-' | '*' | '?' | ':' | '[' | ']' | '^' | '$' | '<' | '>' | '&' | '#'
                | '/' | '%' | '@' | '+' | '~'
        )
        || c.is_alphabetic()
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E')
}

fn starts_expression(c: char) -> bool {
    is_name_char(c) || matches!(c, '\'' | '"' | '{' | '\\')
}

fn ws(input: &str) -> PResult<'_, &str> {
    take_while(is_space)(input)
}

fn pipe_bar(input: &str) -> PResult<'_, Option<char>> {
    opt(char('|'))(input)
}

fn open_paren(input: &str) -> PResult<'_, char> {
    char('(')(input)
}

fn quote_char(input: &str) -> PResult<'_, char> {
    one_of("'\"")(input)
}

fn number_run(input: &str) -> PResult<'_, &str> {
    take_while1(is_number_char)(input)
}

/// Expression followed by any number of `|func(...)` applications
fn expression(input: &str) -> PResult<'_, Expr> {
    let (rest, (expr, _)) = piped_expression(input)?;
    Ok((rest, expr))
}

/// An expression and whether any `|` was folded into it
fn piped_expression(input: &str) -> PResult<'_, (Expr, bool)> {
    let (mut input, mut lhs) = expression_without_pipe(input)?;
    let mut piped = false;

    loop {
        let (rest, _) = ws(input)?;
        let (after_bar, bar) = pipe_bar(rest)?;
        if bar.is_none() {
            return Ok((rest, (lhs, piped)));
        }
        piped = true;

        let (after, rhs) = expression_without_pipe(after_bar)?;
        let mut call = match rhs {
            Expr::Call(call) => call,
            _ => return fail(rest, FailureKind::PipeTarget),
        };

        let rendered = lhs.to_string();
        call.arg_string = if call.arg_string.is_empty() {
            rendered
        } else {
            format!("{},{}", rendered, call.arg_string)
        };
        call.args.insert(0, lhs);

        lhs = Expr::Call(call);
        input = after;
    }
}

fn expression_without_pipe(input: &str) -> PResult<'_, Expr> {
    let (input, _) = ws(input)?;

    match input.chars().next() {
        None | Some(',') | Some(')') => fail(input, FailureKind::MissingExpr),
        Some('\'') | Some('"') => string_literal(input),
        Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => number_or_name(input),
        Some(_) => name_or_call(input),
    }
}

/// Numeric literal, or a name that merely starts like one (`1h`, `-foo`, `10.*`)
fn number_or_name(input: &str) -> PResult<'_, Expr> {
    let (rest, literal) = number_run(input)?;

    let continues_name = rest
        .chars()
        .next()
        .map_or(false, |c| is_name_char(c) || c == '{' || c == '\\');
    if continues_name {
        return name_or_call(input);
    }

    match literal.parse::<f64>() {
        Ok(value) => Ok((
            rest,
            Expr::Const {
                value,
                literal: literal.to_string(),
            },
        )),
        Err(_) => name_or_call(input),
    }
}

fn string_literal(input: &str) -> PResult<'_, Expr> {
    let (body, quote) = quote_char(input)?;
    let mut value = String::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&body[i + c.len_utf8()..], Expr::String { value, quote }));
        }
        if c == '\\' && body[i + 1..].starts_with(quote) {
            value.push(quote);
            chars.next();
            continue;
        }
        value.push(c);
    }

    fail(input, FailureKind::MissingQuote(quote))
}

fn name_or_call(input: &str) -> PResult<'_, Expr> {
    let (rest, name) = metric_name(input)?;
    if name.is_empty() {
        return Err(nom::Err::Error(Failure {
            input,
            kind: FailureKind::Nom,
        }));
    }

    if rest.starts_with('(') {
        let (rest, call) = call_arguments(name, rest)?;
        return Ok((rest, Expr::Call(call)));
    }

    Ok((rest, Expr::Name(name)))
}

/// Scan a metric name, honoring brace groups and backslash escapes
fn metric_name(input: &str) -> PResult<'_, String> {
    let mut name = String::with_capacity(input.len());
    let mut open_braces: Vec<usize> = Vec::new();
    let mut end = input.len();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        if is_name_char(c) {
            name.push(c);
            continue;
        }

        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    name.push(escaped);
                }
            }
            '{' => {
                open_braces.push(i);
                name.push(c);
            }
            '}' if !open_braces.is_empty() => {
                open_braces.pop();
                name.push(c);
            }
            ',' if !open_braces.is_empty() => name.push(c),
            '=' if is_trailing_equals(&input[i + 1..]) => name.push(c),
            _ => {
                end = i;
                break;
            }
        }
    }

    if let Some(&at) = open_braces.first() {
        return fail(&input[at..], FailureKind::UnmatchedBrace);
    }

    Ok((&input[end..], name))
}

/// `=` ends a name unless nothing meaningful follows it
fn is_trailing_equals(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with('=') || rest.starts_with(',') || rest.starts_with(')')
}

/// Parse `(arg, key=value, ...)` after a function name
fn call_arguments(name: String, input: &str) -> PResult<'_, Call> {
    let open = input;
    let (mut input, _) = open_paren(input)?;
    let mut call = Call::new(name);
    let mut pieces: Vec<String> = Vec::new();

    let (rest, _) = ws(input)?;
    if let Some(rest) = rest.strip_prefix(')') {
        return Ok((rest, call));
    }

    loop {
        let piece_start = input;
        let (arg_start, _) = ws(input)?;
        if arg_start.is_empty() {
            return fail(open, FailureKind::MissingParen);
        }

        let (rest, (arg, piped)) = piped_expression(input)?;

        match (arg, rest.strip_prefix('=')) {
            (Expr::Name(key), Some(value_input)) => {
                let (after, value) = expression(value_input)?;
                let value = match named_value(value) {
                    Some(value) => value,
                    None => return fail(arg_start, FailureKind::BadNamedArgument(key)),
                };
                if call.named_args.contains_key(&key) {
                    return fail(arg_start, FailureKind::DuplicateNamedArgument(key));
                }
                call.named_args.insert(key, value);
                pieces.push(piece_start[..piece_start.len() - after.len()].to_string());
                input = after;
            }
            (arg, _) => {
                pieces.push(if piped {
                    arg.to_string()
                } else {
                    piece_start[..piece_start.len() - rest.len()].to_string()
                });
                call.args.push(positional_value(arg));
                input = rest;
            }
        }

        let (rest, _) = ws(input)?;
        match rest.chars().next() {
            Some(')') => {
                call.arg_string = pieces.join(",");
                return Ok((&rest[1..], call));
            }
            Some(',') => input = &rest[1..],
            None => return fail(open, FailureKind::MissingParen),
            Some(c) if starts_expression(c) => return fail(rest, FailureKind::MissingComma),
            Some(_) => return fail(rest, FailureKind::Nom),
        }
    }
}

/// Named argument values are literals; bare true/false become booleans
fn named_value(value: Expr) -> Option<Expr> {
    match value {
        Expr::Name(name) if name.eq_ignore_ascii_case("true") => Some(Expr::Bool(true)),
        Expr::Name(name) if name.eq_ignore_ascii_case("false") => Some(Expr::Bool(false)),
        Expr::Call(_) => None,
        other => Some(other),
    }
}

/// Positional bare true/false are kept as strings
fn positional_value(arg: Expr) -> Expr {
    match arg {
        Expr::Name(name)
            if name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") =>
        {
            Expr::String {
                value: name,
                quote: '\'',
            }
        }
        other => other,
    }
}
