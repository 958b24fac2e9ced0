// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Source positions as delivered by the front end.
//!
//! Lines and columns are 1-based. A span is written `L:C-L:C` both in snapshots and in
//! rendered diagnostics, e.g. `3:9-3:18`.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open source range. Ordering is by start, then end, which is the order
/// diagnostics are reported in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid span `{0}`, expected `line:column-line:column`")]
pub struct SpanParseError(String);

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn from_coords(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self::new(
            Position::new(start_line, start_column),
            Position::new(end_line, end_column),
        )
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

fn parse_position(text: &str) -> Option<Position> {
    let (line, column) = text.trim().split_once(':')?;
    let line = line.parse().ok()?;
    let column = column.parse().ok()?;
    if line == 0 || column == 0 {
        return None;
    }
    Some(Position::new(line, column))
}

impl FromStr for Span {
    type Err = SpanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SpanParseError(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(err)?;
        let start = parse_position(start).ok_or_else(err)?;
        let end = parse_position(end).ok_or_else(err)?;
        if end < start {
            return Err(err());
        }
        Ok(Span::new(start, end))
    }
}

impl TryFrom<String> for Span {
    type Error = SpanParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Span> for String {
    fn from(span: Span) -> Self {
        span.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_spans() {
        let span: Span = "3:9-3:18".parse().unwrap();
        assert_eq!(span, Span::from_coords(3, 9, 3, 18));
        assert_eq!(span.to_string(), "3:9-3:18");
    }

    #[test]
    fn rejects_malformed_spans() {
        assert!("3:9".parse::<Span>().is_err());
        assert!("0:1-1:1".parse::<Span>().is_err());
        assert!("4:1-3:1".parse::<Span>().is_err());
        assert!("a:b-c:d".parse::<Span>().is_err());
    }

    #[test]
    fn orders_by_start_then_end() {
        let a = Span::from_coords(1, 1, 1, 5);
        let b = Span::from_coords(1, 1, 2, 1);
        let c = Span::from_coords(1, 2, 1, 3);
        let mut spans = vec![c, b, a];
        spans.sort();
        assert_eq!(spans, vec![a, b, c]);
    }
}
