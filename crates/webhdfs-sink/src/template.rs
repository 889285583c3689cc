// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `%{...}` string templates used for destination paths and message formats.
//!
//! Two placeholder kinds are recognized:
//!
//! * `%{field}` or `%{[outer][inner]}`: replaced with the record field value.
//!   Missing fields render as the empty string.
//! * `%{+PATTERN}`: the record timestamp (or the flush time when the record
//!   carries none) formatted with a Joda-style date pattern such as
//!   `YYYY-MM-dd` or `HH`. `%{+%s}` renders epoch seconds.
//!
//! Templates are parsed once and rendered per record.

use std::fmt::Write;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Vec<String>),
    Time(String),
    EpochSeconds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[allow(clippy::expect_used)]
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%\{([^}]+)\}").expect("placeholder regex is valid"))
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for captures in placeholder_regex().captures_iter(source) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            segments.push(parse_placeholder(inner.as_str()));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }
        Self {
            source: source.to_string(),
            segments,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn render(&self, fields: &Map<String, Value>, now: DateTime<Utc>) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(path) => {
                    if let Some(value) = lookup(fields, path) {
                        push_value(&mut out, value);
                    }
                }
                Segment::Time(format) => {
                    let _ = write!(out, "{}", now.format(format));
                }
                Segment::EpochSeconds => {
                    let _ = write!(out, "{}", now.timestamp());
                }
            }
        }
        out
    }

    /// Destination key for `record`, using its own timestamp when it has one.
    #[must_use]
    pub fn resolve(&self, record: &Record, flush_time: DateTime<Utc>) -> String {
        self.render(record.fields(), record.timestamp().unwrap_or(flush_time))
    }
}

fn parse_placeholder(inner: &str) -> Segment {
    if let Some(pattern) = inner.strip_prefix('+') {
        if pattern == "%s" {
            return Segment::EpochSeconds;
        }
        return Segment::Time(joda_to_strftime(pattern));
    }
    Segment::Field(parse_field_reference(inner))
}

/// `[a][b]` becomes `["a", "b"]`, a bare name is a single-element path.
fn parse_field_reference(reference: &str) -> Vec<String> {
    let trimmed = reference.trim();
    if !trimmed.starts_with('[') {
        return vec![trimmed.to_string()];
    }
    trimmed
        .split(['[', ']'])
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn lookup<'a>(fields: &'a Map<String, Value>, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = fields.get(first)?;
    for key in rest {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_value(out, item);
            }
        }
        other => {
            let _ = write!(out, "{other}");
        }
    }
}

/// Translates a Joda-Time pattern into a chrono format string. Unknown
/// pattern letters are kept as literal text.
fn joda_to_strftime(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // quoted literal, '' is an escaped quote
            let mut j = i + 1;
            if j < chars.len() && chars[j] == '\'' {
                out.push('\'');
                i = j + 1;
                continue;
            }
            while j < chars.len() && chars[j] != '\'' {
                push_literal(&mut out, chars[j]);
                j += 1;
            }
            i = j + 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        match (c, run) {
            ('y' | 'Y', 2) => out.push_str("%y"),
            ('y' | 'Y', _) => out.push_str("%Y"),
            ('x', 2) => out.push_str("%g"),
            ('x', _) => out.push_str("%G"),
            ('w', 1) => out.push_str("%-V"),
            ('w', _) => out.push_str("%V"),
            ('M', 1) => out.push_str("%-m"),
            ('M', 2) => out.push_str("%m"),
            ('M', 3) => out.push_str("%b"),
            ('M', _) => out.push_str("%B"),
            ('d', 1) => out.push_str("%-d"),
            ('d', _) => out.push_str("%d"),
            ('D', _) => out.push_str("%j"),
            ('H', 1) => out.push_str("%-H"),
            ('H', _) => out.push_str("%H"),
            ('h', 1) => out.push_str("%-I"),
            ('h', _) => out.push_str("%I"),
            ('m', 1) => out.push_str("%-M"),
            ('m', _) => out.push_str("%M"),
            ('s', 1) => out.push_str("%-S"),
            ('s', _) => out.push_str("%S"),
            ('S', _) => out.push_str("%3f"),
            ('E', 4..) => out.push_str("%A"),
            ('E', _) => out.push_str("%a"),
            ('a', _) => out.push_str("%p"),
            ('Z', 1) => out.push_str("%z"),
            ('Z', _) => out.push_str("%:z"),
            _ => {
                for _ in 0..run {
                    push_literal(&mut out, c);
                }
            }
        }
        i += run;
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
