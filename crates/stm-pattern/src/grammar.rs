//! nom grammar for flat STIX patterns.
//!
//! ```text
//! pattern  := '[' expr ']'
//! expr     := clause (AND clause)* | clause (OR clause)*
//! clause   := path op literal
//! path     := object-type ':' segment ('.' segment | '[' index ']')*
//! segment  := identifier | quoted-identifier
//! index    := digits | '*'
//! op       := '=' | '!=' | 'LIKE' | 'MATCHES'
//! literal  := quoted-string | integer | 'true' | 'false'
//! ```

use std::fmt;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, none_of},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    error::{VerboseError, context, convert_error},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::error::PatternError;
use crate::path::{FieldPath, Segment};

type PResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

// ============================================================================
// AST
// ============================================================================

/// Boolean operator joining every clause of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    And,
    Or,
}

impl Joiner {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for Joiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Like,
    Matches,
}

impl Operator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Like => "LIKE",
            Self::Matches => "MATCHES",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Quoted string, already un-escaped.
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl Literal {
    /// Value as it appears in an output attribute.
    #[must_use]
    pub fn as_value(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(number) => number.to_string(),
            Self::Boolean(flag) => flag.to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => {
                let escaped = text.replace('\\', "\\\\").replace('\'', "\\'");
                write!(f, "'{escaped}'")
            }
            Self::Integer(number) => write!(f, "{number}"),
            Self::Boolean(flag) => write!(f, "{flag}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub path: FieldPath,
    pub operator: Operator,
    pub value: Literal,
}

impl Clause {
    #[must_use]
    pub fn equal(path: FieldPath, value: impl Into<String>) -> Self {
        Self {
            path,
            operator: Operator::Equal,
            value: Literal::Text(value.into()),
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.path.key()
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.operator, self.value)
    }
}

/// A parsed pattern: clauses in source order and the operator joining them.
///
/// A single-clause pattern reports [`Joiner::And`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub joiner: Joiner,
    pub clauses: Vec<Clause>,
}

impl Pattern {
    /// Ordered `(qualified key, value)` pairs, one per clause.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.clauses
            .iter()
            .map(|c| (c.key(), c.value.as_value()))
            .collect()
    }

    /// Clauses other than `*_ref.type` discriminators.
    pub fn significant_clauses(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| !c.path.is_type_discriminator())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (position, clause) in self.clauses.iter().enumerate() {
            if position > 0 {
                write!(f, " {} ", self.joiner)?;
            }
            write!(f, "{clause}")?;
        }
        f.write_str("]")
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse one pattern string.
///
/// # Errors
///
/// Returns [`PatternError::Syntax`] when the text does not match the grammar
/// and [`PatternError::MixedOperators`] when both `AND` and `OR` join clauses.
pub fn parse(input: &str) -> Result<Pattern, PatternError> {
    let input = input.trim();
    let (first, rest) = match all_consuming(pattern)(input) {
        Ok((_, parsed)) => parsed,
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            return Err(PatternError::Syntax(convert_error(input, e)));
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(PatternError::Syntax("incomplete pattern".to_string()));
        }
    };

    let joiner = rest.first().map_or(Joiner::And, |(joiner, _)| *joiner);
    if rest.iter().any(|(other, _)| *other != joiner) {
        return Err(PatternError::MixedOperators);
    }

    let mut clauses = Vec::with_capacity(rest.len() + 1);
    clauses.push(first);
    clauses.extend(rest.into_iter().map(|(_, clause)| clause));
    Ok(Pattern { joiner, clauses })
}

// ============================================================================
// Internal Parsers
// ============================================================================

fn pattern(input: &str) -> PResult<'_, (Clause, Vec<(Joiner, Clause)>)> {
    context(
        "pattern",
        delimited(
            pair(char('['), multispace0),
            pair(clause, many0(pair(joiner, clause))),
            pair(multispace0, char(']')),
        ),
    )(input)
}

fn joiner(input: &str) -> PResult<'_, Joiner> {
    delimited(
        multispace1,
        alt((value(Joiner::And, tag("AND")), value(Joiner::Or, tag("OR")))),
        multispace1,
    )(input)
}

fn clause(input: &str) -> PResult<'_, Clause> {
    map(
        context(
            "comparison",
            tuple((
                object_path,
                delimited(multispace0, operator, multispace0),
                literal,
            )),
        ),
        |(path, operator, value)| Clause {
            path,
            operator,
            value,
        },
    )(input)
}

fn operator(input: &str) -> PResult<'_, Operator> {
    alt((
        value(Operator::NotEqual, tag("!=")),
        value(Operator::Equal, tag("=")),
        value(Operator::Like, tag("LIKE")),
        value(Operator::Matches, tag("MATCHES")),
    ))(input)
}

// ----------------------------------------------------------------------------
// Paths
// ----------------------------------------------------------------------------

fn object_path(input: &str) -> PResult<'_, FieldPath> {
    let (input, object_type) = context("object type", terminated(identifier, char(':')))(input)?;
    let (input, first) = field(input)?;
    let (input, rest) = many0(alt((preceded(char('.'), field), index)))(input)?;

    let mut segments = Vec::with_capacity(rest.len() + 1);
    segments.push(first);
    segments.extend(rest);
    Ok((input, FieldPath::new(object_type, segments)))
}

fn identifier(input: &str) -> PResult<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)
}

fn field(input: &str) -> PResult<'_, Segment> {
    map(
        alt((
            delimited(char('\''), take_while1(|c: char| c != '\''), char('\'')),
            identifier,
        )),
        |name: &str| Segment::Field(name.to_string()),
    )(input)
}

fn index(input: &str) -> PResult<'_, Segment> {
    context(
        "list index",
        delimited(
            char('['),
            alt((
                value(Segment::Index(None), char('*')),
                map_res(digit1, |digits: &str| {
                    digits.parse::<usize>().map(|n| Segment::Index(Some(n)))
                }),
            )),
            char(']'),
        ),
    )(input)
}

// ----------------------------------------------------------------------------
// Literals
// ----------------------------------------------------------------------------

fn literal(input: &str) -> PResult<'_, Literal> {
    context(
        "literal",
        alt((
            map(quoted_string, Literal::Text),
            map(integer, Literal::Integer),
            value(Literal::Boolean(true), tag("true")),
            value(Literal::Boolean(false), tag("false")),
        )),
    )(input)
}

fn quoted_string(input: &str) -> PResult<'_, String> {
    delimited(
        char('\''),
        map(
            opt(escaped_transform(
                none_of("\\'"),
                '\\',
                alt((value('\\', char('\\')), value('\'', char('\'')))),
            )),
            Option::unwrap_or_default,
        ),
        char('\''),
    )(input)
}

fn integer(input: &str) -> PResult<'_, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |digits: &str| {
        digits.parse::<i64>()
    })(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_clause() {
        let pattern = parse("[ipv4-addr:value = '1.2.3.4']").unwrap();
        assert_eq!(pattern.joiner, Joiner::And);
        assert_eq!(
            pattern.pairs(),
            vec![("ipv4-addr:value".to_string(), "1.2.3.4".to_string())]
        );
    }

    #[test]
    fn escapes_are_removed() {
        let pattern = parse(r"[file:name = 'C:\\temp\\it\'s.exe']").unwrap();
        assert_eq!(pattern.clauses[0].value, Literal::Text(r"C:\temp\it's.exe".into()));
    }

    #[test]
    fn empty_string_literal() {
        let pattern = parse("[file:name = '']").unwrap();
        assert_eq!(pattern.clauses[0].value, Literal::Text(String::new()));
    }

    #[test]
    fn integer_and_boolean_literals() {
        let pattern =
            parse("[network-traffic:dst_port = 443 AND network-traffic:extensions.'socket-ext'.is_listening = true]")
                .unwrap();
        assert_eq!(pattern.clauses[0].value, Literal::Integer(443));
        assert_eq!(pattern.clauses[1].value, Literal::Boolean(true));
        assert_eq!(pattern.pairs()[0].1, "443");
    }

    #[test]
    fn operators() {
        let pattern = parse(
            "[url:value LIKE '%evil%' OR url:value MATCHES '^http' OR url:value != 'x']",
        )
        .unwrap();
        let ops: Vec<Operator> = pattern.clauses.iter().map(|c| c.operator).collect();
        assert_eq!(ops, vec![Operator::Like, Operator::Matches, Operator::NotEqual]);
        assert_eq!(pattern.joiner, Joiner::Or);
    }

    #[test]
    fn mixed_operators_are_rejected() {
        let err = parse("[file:name = 'a' AND file:size = 1 OR file:name = 'b']").unwrap_err();
        assert_eq!(err, PatternError::MixedOperators);
    }

    #[test]
    fn syntax_error_carries_trace() {
        let err = parse("[file:name = 'unterminated]").unwrap_err();
        assert!(matches!(err, PatternError::Syntax(_)));
        assert!(parse("file:name = 'x'").is_err());
        assert!(parse("[file:name 'x']").is_err());
    }

    #[test]
    fn display_round_trips() {
        let text = r"[email-message:to_refs[0].value = 'a@b.c' AND file:hashes.'SHA-256' = 'it\'s']";
        let pattern = parse(text).unwrap();
        assert_eq!(pattern.to_string(), text);
        assert_eq!(parse(&pattern.to_string()).unwrap(), pattern);
    }

    #[test]
    fn significant_clauses_skip_discriminators() {
        let pattern = parse(
            "[network-traffic:dst_port = '80' AND network-traffic:dst_ref.type = 'ipv4-addr' AND network-traffic:dst_ref.value = '1.2.3.4']",
        )
        .unwrap();
        let keys: Vec<String> = pattern.significant_clauses().map(Clause::key).collect();
        assert_eq!(
            keys,
            vec![
                "network-traffic:dst_port".to_string(),
                "network-traffic:dst_ref.value".to_string()
            ]
        );
    }
}
