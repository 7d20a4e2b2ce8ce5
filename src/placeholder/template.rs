//! A small template language for cells that are more than one field reference.
//!
//! Syntax follows the familiar `{{ .Field }}` action style: text is copied
//! verbatim, actions evaluate pipelines (`{{ .Name | upper }}`), `{{- ` and
//! ` -}}` trim surrounding whitespace, `{{/* */}}` is a comment, and
//! `{{ if }} / {{ else if }} / {{ else }} / {{ end }}` select between branches.
//! Field lookup is strict: naming a field the row does not have is an error.

use crate::errors::ResolveError;
use crate::value::{FetchedRow, FieldValue};
use std::cmp::Ordering;

const FUNCTIONS: &[&str] = &[
    "and", "eq", "ge", "gt", "index", "json", "le", "len", "lower", "lt", "ne", "not", "or",
    "print", "printf", "trim", "upper",
];

#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
struct Pipeline {
    commands: Vec<Command>,
}

#[derive(Debug, Clone)]
struct Command {
    args: Vec<Arg>,
}

#[derive(Debug, Clone)]
enum Arg {
    /// Field path; empty means the whole row (`.`).
    Field(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Function(String),
    Pipeline(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Ident(String),
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug)]
enum Item {
    Text(String),
    Action { offset: usize, tokens: Vec<Token> },
}

enum Terminator {
    Else(Option<Pipeline>),
    End,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, ResolveError> {
        let items = lex(source)?;
        let mut parser = Parser {
            items: items.into_iter(),
        };
        let (nodes, terminator) = parser.parse_list()?;
        match terminator {
            None => Ok(Self { nodes }),
            Some((offset, Terminator::End)) => Err(ResolveError::parse(offset, "unexpected {{end}}")),
            Some((offset, Terminator::Else(_))) => {
                Err(ResolveError::parse(offset, "unexpected {{else}}"))
            }
        }
    }

    pub fn render(&self, fields: &FetchedRow) -> Result<String, ResolveError> {
        let mut out = String::new();
        render_nodes(&self.nodes, fields, &mut out)?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Lexing

fn lex(source: &str) -> Result<Vec<Item>, ResolveError> {
    let mut items = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let Some(found) = source[pos..].find("{{") else {
            items.push(Item::Text(source[pos..].to_string()));
            break;
        };
        let start = pos + found;
        let mut text = &source[pos..start];
        let mut inner = start + 2;
        if is_left_trim(&source[inner..]) {
            text = text.trim_end();
            inner += 1;
        }
        if !text.is_empty() {
            items.push(Item::Text(text.to_string()));
        }

        let (tokens, after, trim_right) = lex_action(source, inner, start)?;
        if let Some(tokens) = tokens {
            items.push(Item::Action {
                offset: start,
                tokens,
            });
        }
        pos = after;
        if trim_right {
            pos += source[pos..].len() - source[pos..].trim_start().len();
        }
    }

    Ok(items)
}

fn is_left_trim(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Returns `(tokens, position after "}}", trim_right)`. Comments yield no tokens.
fn lex_action(
    source: &str,
    mut pos: usize,
    action_start: usize,
) -> Result<(Option<Vec<Token>>, usize, bool), ResolveError> {
    let bytes = source.as_bytes();
    let skip_ws = |mut p: usize| {
        while p < bytes.len() && (bytes[p] as char).is_ascii_whitespace() {
            p += 1;
        }
        p
    };

    let comment_start = skip_ws(pos);
    if source[comment_start..].starts_with("/*") {
        let Some(end) = source[comment_start + 2..].find("*/") else {
            return Err(ResolveError::parse(action_start, "unclosed comment"));
        };
        let after_comment = skip_ws(comment_start + 2 + end + 2);
        let rest = &source[after_comment..];
        if rest.starts_with("}}") {
            return Ok((None, after_comment + 2, false));
        }
        if rest.starts_with("-}}") && after_comment > comment_start + 2 + end + 2 {
            return Ok((None, after_comment + 3, true));
        }
        return Err(ResolveError::parse(action_start, "comment ends before closing delimiter"));
    }

    let mut tokens = Vec::new();
    loop {
        let before_ws = pos;
        pos = skip_ws(pos);
        if pos >= source.len() {
            return Err(ResolveError::parse(action_start, "unclosed action"));
        }
        let rest = &source[pos..];
        if rest.starts_with("}}") {
            return Ok((Some(tokens), pos + 2, false));
        }
        if rest.starts_with("-}}") && pos > before_ws {
            return Ok((Some(tokens), pos + 3, true));
        }

        let c = rest.chars().next().unwrap_or_default();
        match c {
            '|' => {
                tokens.push(Token::Pipe);
                pos += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            '"' => {
                let (value, len) = lex_quoted(rest, pos)?;
                tokens.push(Token::Str(value));
                pos += len;
            }
            '`' => {
                let Some(end) = rest[1..].find('`') else {
                    return Err(ResolveError::parse(pos, "unterminated raw string"));
                };
                tokens.push(Token::Str(rest[1..1 + end].to_string()));
                pos += end + 2;
            }
            '.' => {
                let (path, len) = lex_field(rest);
                tokens.push(Token::Field(path));
                pos += len;
            }
            c if c.is_ascii_digit() || ((c == '-' || c == '+') && starts_number(&rest[1..])) => {
                let (token, len) = lex_number(rest, pos)?;
                tokens.push(token);
                pos += len;
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                    .unwrap_or(rest.len());
                tokens.push(Token::Ident(rest[..len].to_string()));
                pos += len;
            }
            other => {
                return Err(ResolveError::parse(
                    pos,
                    format!("unexpected {other:?} in action"),
                ));
            }
        }
    }
}

fn starts_number(rest: &str) -> bool {
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn lex_quoted(rest: &str, offset: usize) -> Result<(String, usize), ResolveError> {
    let mut out = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, idx + 1)),
            '\n' => break,
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    break;
                };
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    other => {
                        return Err(ResolveError::parse(
                            offset + idx,
                            format!("unknown escape sequence \\{other}"),
                        ));
                    }
                }
            }
            c => out.push(c),
        }
    }
    Err(ResolveError::parse(offset, "unterminated quoted string"))
}

fn lex_field(rest: &str) -> (Vec<String>, usize) {
    let bytes = rest.as_bytes();
    let mut path = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos] == b'.' {
        let start = pos + 1;
        let mut end = start;
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        if end == start {
            // A bare dot only counts when it is the whole operand.
            if path.is_empty() {
                pos = start;
            }
            break;
        }
        path.push(rest[start..end].to_string());
        pos = end;
    }
    (path, pos)
}

fn lex_number(rest: &str, offset: usize) -> Result<(Token, usize), ResolveError> {
    let len = rest
        .char_indices()
        .skip(1)
        .find(|(_, c)| {
            !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '+' || *c == '-')
        })
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    let literal = &rest[..len];
    let token = if literal.contains(['.', 'e', 'E']) {
        literal.parse::<f64>().map(Token::Float).ok()
    } else {
        literal.parse::<i64>().map(Token::Int).ok()
    };
    token
        .map(|token| (token, len))
        .ok_or_else(|| ResolveError::parse(offset, format!("bad number syntax: {literal:?}")))
}

// ---------------------------------------------------------------------------
// Parsing

struct Parser {
    items: std::vec::IntoIter<Item>,
}

impl Parser {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Option<(usize, Terminator)>), ResolveError> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            match item {
                Item::Text(text) => nodes.push(Node::Text(text)),
                Item::Action { offset, tokens } => match tokens.first() {
                    Some(Token::Ident(word)) if word == "if" => {
                        let node = self.parse_if(offset, &tokens[1..])?;
                        nodes.push(node);
                    }
                    Some(Token::Ident(word)) if word == "else" => {
                        let terminator = match &tokens[1..] {
                            [] => Terminator::Else(None),
                            [Token::Ident(kw), rest @ ..] if kw == "if" => {
                                Terminator::Else(Some(parse_pipeline(rest, offset)?))
                            }
                            _ => return Err(ResolveError::parse(offset, "unexpected tokens after else")),
                        };
                        return Ok((nodes, Some((offset, terminator))));
                    }
                    Some(Token::Ident(word)) if word == "end" => {
                        if tokens.len() > 1 {
                            return Err(ResolveError::parse(offset, "unexpected tokens after end"));
                        }
                        return Ok((nodes, Some((offset, Terminator::End))));
                    }
                    _ => nodes.push(Node::Action(parse_pipeline(&tokens, offset)?)),
                },
            }
        }
        Ok((nodes, None))
    }

    fn parse_if(&mut self, offset: usize, condition: &[Token]) -> Result<Node, ResolveError> {
        let mut branches = Vec::new();
        let mut pending = parse_pipeline(condition, offset)?;
        loop {
            let (body, terminator) = self.parse_list()?;
            match terminator {
                Some((_, Terminator::End)) => {
                    branches.push((pending, body));
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    });
                }
                Some((_, Terminator::Else(Some(next)))) => {
                    branches.push((pending, body));
                    pending = next;
                }
                Some((else_offset, Terminator::Else(None))) => {
                    branches.push((pending, body));
                    let (otherwise, terminator) = self.parse_list()?;
                    return match terminator {
                        Some((_, Terminator::End)) => Ok(Node::If {
                            branches,
                            otherwise,
                        }),
                        _ => Err(ResolveError::parse(else_offset, "expected {{end}} after {{else}}")),
                    };
                }
                None => return Err(ResolveError::parse(offset, "unexpected EOF, missing {{end}}")),
            }
        }
    }
}

fn parse_pipeline(tokens: &[Token], offset: usize) -> Result<Pipeline, ResolveError> {
    let mut commands = Vec::new();
    let mut depth = 0usize;
    let mut segment_start = 0;
    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ResolveError::parse(offset, "unexpected right paren"))?;
            }
            Token::Pipe if depth == 0 => {
                commands.push(parse_command(&tokens[segment_start..idx], offset)?);
                segment_start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ResolveError::parse(offset, "unclosed left paren"));
    }
    commands.push(parse_command(&tokens[segment_start..], offset)?);
    Ok(Pipeline { commands })
}

fn parse_command(tokens: &[Token], offset: usize) -> Result<Command, ResolveError> {
    if tokens.is_empty() {
        return Err(ResolveError::parse(offset, "missing value for command"));
    }
    let mut args = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        let arg = match &tokens[idx] {
            Token::Field(path) => Arg::Field(path.clone()),
            Token::Str(s) => Arg::Str(s.clone()),
            Token::Int(n) => Arg::Int(*n),
            Token::Float(n) => Arg::Float(*n),
            Token::Ident(word) => match word.as_str() {
                "true" => Arg::Bool(true),
                "false" => Arg::Bool(false),
                "nil" => Arg::Nil,
                name if FUNCTIONS.contains(&name) => Arg::Function(name.to_string()),
                "if" | "else" | "end" => {
                    return Err(ResolveError::parse(offset, format!("unexpected keyword {word:?}")));
                }
                name => {
                    return Err(ResolveError::parse(
                        offset,
                        format!("function {name:?} not defined"),
                    ));
                }
            },
            Token::LParen => {
                let close = matching_paren(tokens, idx)
                    .ok_or_else(|| ResolveError::parse(offset, "unclosed left paren"))?;
                let inner = parse_pipeline(&tokens[idx + 1..close], offset)?;
                idx = close;
                Arg::Pipeline(inner)
            }
            Token::RParen => return Err(ResolveError::parse(offset, "unexpected right paren")),
            Token::Pipe => return Err(ResolveError::parse(offset, "missing command before pipe")),
        };
        args.push(arg);
        idx += 1;
    }
    Ok(Command { args })
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Evaluation

fn render_nodes(nodes: &[Node], fields: &FetchedRow, out: &mut String) -> Result<(), ResolveError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action(pipeline) => {
                let value = eval_pipeline(pipeline, fields)?;
                out.push_str(&value.to_string());
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let mut taken = false;
                for (condition, body) in branches {
                    if truthy(&eval_pipeline(condition, fields)?) {
                        render_nodes(body, fields, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    render_nodes(otherwise, fields, out)?;
                }
            }
        }
    }
    Ok(())
}

fn eval_pipeline(pipeline: &Pipeline, fields: &FetchedRow) -> Result<FieldValue, ResolveError> {
    let mut previous: Option<FieldValue> = None;
    for command in &pipeline.commands {
        previous = Some(eval_command(command, fields, previous.take())?);
    }
    previous.ok_or_else(|| ResolveError::execute("empty pipeline"))
}

fn eval_command(
    command: &Command,
    fields: &FetchedRow,
    piped: Option<FieldValue>,
) -> Result<FieldValue, ResolveError> {
    match command.args.split_first() {
        Some((Arg::Function(name), rest)) if name == "and" || name == "or" => short_circuit(
            name,
            rest.iter()
                .map(|arg| eval_arg(arg, fields))
                .chain(piped.map(Ok)),
        ),
        Some((Arg::Function(name), rest)) => {
            let mut args = rest
                .iter()
                .map(|arg| eval_arg(arg, fields))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(value) = piped {
                args.push(value);
            }
            call(name, args)
        }
        Some((operand, [])) if piped.is_none() => eval_arg(operand, fields),
        Some(_) => Err(ResolveError::execute("can't give argument to non-function")),
        None => Err(ResolveError::execute("missing value for command")),
    }
}

fn eval_arg(arg: &Arg, fields: &FetchedRow) -> Result<FieldValue, ResolveError> {
    match arg {
        Arg::Field(path) => lookup(path, fields),
        Arg::Str(s) => Ok(FieldValue::Text(s.clone())),
        Arg::Int(n) => Ok(FieldValue::Int(*n)),
        Arg::Float(n) => Ok(FieldValue::Float(*n)),
        Arg::Bool(b) => Ok(FieldValue::Bool(*b)),
        Arg::Nil => Ok(FieldValue::Null),
        Arg::Function(name) => call(name, Vec::new()),
        Arg::Pipeline(pipeline) => eval_pipeline(pipeline, fields),
    }
}

fn lookup(path: &[String], fields: &FetchedRow) -> Result<FieldValue, ResolveError> {
    let Some((first, rest)) = path.split_first() else {
        let object = fields
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        return Ok(FieldValue::Json(serde_json::Value::Object(object)));
    };

    let mut current = fields
        .get(first)
        .cloned()
        .ok_or_else(|| ResolveError::execute(format!("map has no entry for key {first:?}")))?;

    for key in rest {
        current = match current {
            FieldValue::Json(serde_json::Value::Object(mut map)) => map
                .remove(key)
                .map(FieldValue::from_json)
                .ok_or_else(|| ResolveError::execute(format!("map has no entry for key {key:?}")))?,
            other => {
                return Err(ResolveError::execute(format!(
                    "can't evaluate field {key} in type {}",
                    other.type_name()
                )));
            }
        };
    }
    Ok(current)
}

fn truthy(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => false,
        FieldValue::Bool(b) => *b,
        FieldValue::Int(n) => *n != 0,
        FieldValue::Float(n) => *n != 0.0,
        FieldValue::Text(s) => !s.is_empty(),
        FieldValue::Bytes(b) => !b.is_empty(),
        FieldValue::Json(json) => match json {
            serde_json::Value::Null => false,
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            serde_json::Value::String(s) => !s.is_empty(),
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Object(map) => !map.is_empty(),
        },
        FieldValue::Date(_)
        | FieldValue::DateTime(_)
        | FieldValue::Infinity
        | FieldValue::NegativeInfinity => true,
    }
}

fn call(name: &str, args: Vec<FieldValue>) -> Result<FieldValue, ResolveError> {
    match name {
        "print" => Ok(FieldValue::Text(sprint(&args))),
        "printf" => {
            let mut iter = args.into_iter();
            let format = match iter.next() {
                Some(FieldValue::Text(format)) => format,
                Some(other) => {
                    return Err(ResolveError::execute(format!(
                        "printf: format must be text, got {}",
                        other.type_name()
                    )));
                }
                None => return Err(wrong_args(name, 0)),
            };
            sprintf(&format, &iter.collect::<Vec<_>>()).map(FieldValue::Text)
        }
        "len" => {
            let [value] = exact::<1>(name, args)?;
            let len = match &value {
                FieldValue::Text(s) => s.len(),
                FieldValue::Bytes(b) => b.len(),
                FieldValue::Json(serde_json::Value::Array(items)) => items.len(),
                FieldValue::Json(serde_json::Value::Object(map)) => map.len(),
                other => {
                    return Err(ResolveError::execute(format!(
                        "len of type {}",
                        other.type_name()
                    )));
                }
            };
            Ok(FieldValue::Int(len as i64))
        }
        "index" => {
            let mut iter = args.into_iter();
            let mut current = iter.next().ok_or_else(|| wrong_args(name, 0))?;
            for key in iter {
                current = index_into(current, &key)?;
            }
            Ok(current)
        }
        "eq" => {
            let Some((first, rest)) = args.split_first().filter(|(_, rest)| !rest.is_empty())
            else {
                return Err(wrong_args(name, args.len()));
            };
            for other in rest {
                if compare(first, other)? == Some(Ordering::Equal) {
                    return Ok(FieldValue::Bool(true));
                }
            }
            Ok(FieldValue::Bool(false))
        }
        "ne" => {
            let [a, b] = exact::<2>(name, args)?;
            Ok(FieldValue::Bool(compare(&a, &b)? != Some(Ordering::Equal)))
        }
        "lt" | "le" | "gt" | "ge" => {
            let [a, b] = exact::<2>(name, args)?;
            let ordering = compare(&a, &b)?.ok_or_else(|| {
                ResolveError::execute(format!("{name}: values are not ordered"))
            })?;
            let result = match name {
                "lt" => ordering == Ordering::Less,
                "le" => ordering != Ordering::Greater,
                "gt" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(FieldValue::Bool(result))
        }
        "not" => {
            let [value] = exact::<1>(name, args)?;
            Ok(FieldValue::Bool(!truthy(&value)))
        }
        "and" | "or" => short_circuit(name, args.into_iter().map(Ok)),
        "upper" => {
            let [value] = exact::<1>(name, args)?;
            Ok(FieldValue::Text(value.to_string().to_uppercase()))
        }
        "lower" => {
            let [value] = exact::<1>(name, args)?;
            Ok(FieldValue::Text(value.to_string().to_lowercase()))
        }
        "trim" => {
            let [value] = exact::<1>(name, args)?;
            Ok(FieldValue::Text(value.to_string().trim().to_string()))
        }
        "json" => {
            let [value] = exact::<1>(name, args)?;
            serde_json::to_string(&value.to_json())
                .map(FieldValue::Text)
                .map_err(|e| ResolveError::execute(format!("json: {e}")))
        }
        other => Err(ResolveError::execute(format!("function {other:?} not defined"))),
    }
}

/// `and` returns the first falsy argument, `or` the first truthy one; later
/// arguments are never evaluated.
fn short_circuit(
    name: &str,
    values: impl Iterator<Item = Result<FieldValue, ResolveError>>,
) -> Result<FieldValue, ResolveError> {
    let want = name == "or";
    let mut last = None;
    for value in values {
        let value = value?;
        if truthy(&value) == want {
            return Ok(value);
        }
        last = Some(value);
    }
    last.ok_or_else(|| wrong_args(name, 0))
}

fn wrong_args(name: &str, got: usize) -> ResolveError {
    ResolveError::execute(format!("wrong number of args for {name}: got {got}"))
}

fn exact<const N: usize>(name: &str, args: Vec<FieldValue>) -> Result<[FieldValue; N], ResolveError> {
    let got = args.len();
    args.try_into().map_err(|_| wrong_args(name, got))
}

fn index_into(value: FieldValue, key: &FieldValue) -> Result<FieldValue, ResolveError> {
    match (value, key) {
        (FieldValue::Json(serde_json::Value::Array(items)), FieldValue::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .map(FieldValue::from_json)
            .ok_or_else(|| ResolveError::execute(format!("index out of range: {i}"))),
        (FieldValue::Json(serde_json::Value::Object(map)), FieldValue::Text(k)) => {
            Ok(map.get(k).cloned().map(FieldValue::from_json).unwrap_or(FieldValue::Null))
        }
        (FieldValue::Text(s), FieldValue::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| s.as_bytes().get(i).copied())
            .map(|b| FieldValue::Int(i64::from(b)))
            .ok_or_else(|| ResolveError::execute(format!("index out of range: {i}"))),
        (value, key) => Err(ResolveError::execute(format!(
            "can't index item of type {} with {}",
            value.type_name(),
            key.type_name()
        ))),
    }
}

/// `Some(ordering)` for comparable values, `None` for equality-only kinds that differ.
fn compare(a: &FieldValue, b: &FieldValue) -> Result<Option<Ordering>, ResolveError> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return Ok(x.partial_cmp(&y));
    }
    let ordering = match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => Some(x.cmp(y)),
        (FieldValue::Date(x), FieldValue::Date(y)) => Some(x.cmp(y)),
        (FieldValue::DateTime(x), FieldValue::DateTime(y)) => Some(x.cmp(y)),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => (x == y).then_some(Ordering::Equal),
        (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
        (FieldValue::Infinity, FieldValue::Infinity)
        | (FieldValue::NegativeInfinity, FieldValue::NegativeInfinity) => Some(Ordering::Equal),
        (FieldValue::Json(x), FieldValue::Json(y)) => (x == y).then_some(Ordering::Equal),
        (FieldValue::Null, _) | (_, FieldValue::Null) => None,
        _ => {
            return Err(ResolveError::execute(format!(
                "incompatible types for comparison: {} and {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(ordering)
}

/// Operands are joined with a space unless one side is text.
fn sprint(args: &[FieldValue]) -> String {
    let mut out = String::new();
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            let prev_text = matches!(args[idx - 1], FieldValue::Text(_));
            let this_text = matches!(arg, FieldValue::Text(_));
            if !prev_text && !this_text {
                out.push(' ');
            }
        }
        out.push_str(&arg.to_string());
    }
    out
}

fn sprintf(format: &str, args: &[FieldValue]) -> Result<String, ResolveError> {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next_arg = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse().unwrap_or(0));
        }
        let verb = chars
            .next()
            .ok_or_else(|| ResolveError::execute("printf: format ends with '%'"))?;
        let arg = next_arg
            .next()
            .ok_or_else(|| ResolveError::execute(format!("printf: missing argument for %{verb}")))?;

        let formatted = format_verb(verb, precision, arg)?;
        let width: usize = width.parse().unwrap_or(0);
        let pad = width.saturating_sub(formatted.chars().count());
        if pad == 0 {
            out.push_str(&formatted);
        } else if left_align {
            out.push_str(&formatted);
            out.extend(std::iter::repeat_n(' ', pad));
        } else if zero_pad && matches!(verb, 'd' | 'f') {
            let (sign, digits) = match formatted.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", formatted.as_str()),
            };
            out.push_str(sign);
            out.extend(std::iter::repeat_n('0', pad));
            out.push_str(digits);
        } else {
            out.extend(std::iter::repeat_n(' ', pad));
            out.push_str(&formatted);
        }
    }

    let extra = next_arg.count();
    if extra > 0 {
        return Err(ResolveError::execute(format!(
            "printf: {extra} extra argument(s)"
        )));
    }
    Ok(out)
}

fn format_verb(verb: char, precision: Option<usize>, arg: &FieldValue) -> Result<String, ResolveError> {
    let bad = || {
        ResolveError::execute(format!(
            "printf: %{verb} does not accept {}",
            arg.type_name()
        ))
    };
    match verb {
        'v' | 's' => {
            let text = arg.to_string();
            Ok(match precision {
                Some(p) if verb == 's' => text.chars().take(p).collect(),
                _ => text,
            })
        }
        'd' => match arg {
            FieldValue::Int(n) => Ok(n.to_string()),
            FieldValue::Float(n) if n.fract() == 0.0 => Ok(format!("{n:.0}")),
            _ => Err(bad()),
        },
        'f' => {
            let n = arg.as_f64().ok_or_else(bad)?;
            Ok(format!("{:.*}", precision.unwrap_or(6), n))
        }
        'q' => match arg {
            FieldValue::Text(s) => Ok(format!("{s:?}")),
            _ => Err(bad()),
        },
        't' => match arg {
            FieldValue::Bool(b) => Ok(b.to_string()),
            _ => Err(bad()),
        },
        other => Err(ResolveError::execute(format!("printf: unsupported verb %{other}"))),
    }
}
