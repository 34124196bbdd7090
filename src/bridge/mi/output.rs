//! Grammar for GDB/MI output records.
//!
//! One parsed line of gdb output is an [`MiLine`]: a result record
//! (`4^done,bkpt={..}`), an asynchronous record (`*stopped,reason=".."`,
//! `=breakpoint-modified,..`), a stream record (`~"text"`) or the `(gdb)`
//! prompt terminator.

use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{anychar, char, digit1};
use nom::combinator::{all_consuming, map, opt, verify};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, separated_pair};
use nom::IResult;
use serde_json::json;

/// A `variable=value` list as it appears in result and async records.
///
/// MI allows repeated variable names, so this is an association list rather
/// than a map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MiTuple(pub Vec<(String, MiValue)>);

impl MiTuple {
    pub fn get(&self, name: &str) -> Option<&MiValue> {
        self.0
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(MiValue::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MiValue {
    String(String),
    Tuple(MiTuple),
    List(Vec<MiValue>),
}

impl MiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MiValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&MiValue> {
        match self {
            MiValue::Tuple(t) => t.get(name),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MiValue::String(s) => json!(s),
            MiValue::Tuple(t) => t.to_json(),
            MiValue::List(items) => {
                serde_json::Value::Array(items.iter().map(MiValue::to_json).collect())
            }
        }
    }
}

impl MiTuple {
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.0 {
            map.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// Reply to a single MI command.
#[derive(Debug, Clone, PartialEq)]
pub struct MiResult {
    pub token: Option<u64>,
    pub class: String,
    pub fields: MiTuple,
}

/// Unsolicited record (`*` exec, `+` status, `=` notify).
#[derive(Debug, Clone, PartialEq)]
pub struct MiAsync {
    pub token: Option<u64>,
    pub class: String,
    pub fields: MiTuple,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MiLine {
    Result(MiResult),
    Exec(MiAsync),
    Status(MiAsync),
    Notify(MiAsync),
    Stream(char, String),
    Prompt,
}

fn token(input: &str) -> IResult<&str, u64> {
    map(digit1, |d: &str| d.parse().unwrap_or(0))(input)
}

fn class(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')(input)
}

fn c_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            many0(alt((
                preceded(
                    char('\\'),
                    map(anychar, |c| match c {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    }),
                ),
                verify(anychar, |c| *c != '"' && *c != '\\'),
            ))),
            |chars| chars.into_iter().collect(),
        ),
        char('"'),
    )(input)
}

fn mi_value(input: &str) -> IResult<&str, MiValue> {
    alt((
        map(c_string, MiValue::String),
        map(
            delimited(char('{'), separated_list0(char(','), mi_result), char('}')),
            |pairs| MiValue::Tuple(MiTuple(pairs)),
        ),
        map(
            delimited(
                char('['),
                separated_list0(
                    char(','),
                    alt((
                        mi_value,
                        // lists may carry named results ("frame={..}"); keep
                        // them as single-entry tuples
                        map(mi_result, |pair| MiValue::Tuple(MiTuple(vec![pair]))),
                    )),
                ),
                char(']'),
            ),
            MiValue::List,
        ),
    ))(input)
}

fn mi_result(input: &str) -> IResult<&str, (String, MiValue)> {
    map(
        separated_pair(class, char('='), mi_value),
        |(k, v)| (k.to_string(), v),
    )(input)
}

fn fields(input: &str) -> IResult<&str, MiTuple> {
    map(many0(preceded(char(','), mi_result)), MiTuple)(input)
}

fn record<'a>(
    marker: char,
) -> impl FnMut(&'a str) -> IResult<&'a str, (Option<u64>, String, MiTuple)> {
    map(
        pair(opt(token), preceded(char(marker), pair(class, fields))),
        |(token, (class, fields))| (token, class.to_string(), fields),
    )
}

/// Parse one line of gdb output. Returns `None` for lines that are not valid
/// MI records (gdb occasionally emits plain text on startup).
pub fn parse_line(line: &str) -> Option<MiLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim() == "(gdb)" {
        return Some(MiLine::Prompt);
    }

    let stream = map(
        pair(
            alt((char('~'), char('@'), char('&'))),
            alt((c_string, map(nom::combinator::rest, str::to_string))),
        ),
        |(kind, text)| MiLine::Stream(kind, text),
    );

    let parsed = all_consuming(alt((
        map(record('^'), |(t, c, f)| {
            MiLine::Result(MiResult {
                token: t,
                class: c,
                fields: f,
            })
        }),
        map(record('*'), |(t, c, f)| {
            MiLine::Exec(MiAsync {
                token: t,
                class: c,
                fields: f,
            })
        }),
        map(record('+'), |(t, c, f)| {
            MiLine::Status(MiAsync {
                token: t,
                class: c,
                fields: f,
            })
        }),
        map(record('='), |(t, c, f)| {
            MiLine::Notify(MiAsync {
                token: t,
                class: c,
                fields: f,
            })
        }),
        stream,
    )))(line);

    parsed.ok().map(|(_, l)| l)
}
