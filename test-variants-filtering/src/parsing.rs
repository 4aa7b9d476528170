// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for search queries.
//!
//! A query is split into whitespace-separated terms by a winnow parser that
//! records where each term starts. Each term is then interpreted on its own,
//! so that one bad term produces an error without hiding errors in the terms
//! after it.

use crate::{
    errors::ParseSingleError,
    search::{SearchMatcher, SearchTerm},
};
use miette::SourceSpan;
use std::collections::BTreeSet;
use test_variants_metadata::TestVariantStatus;
use winnow::{
    LocatingSlice, Parser,
    ascii::multispace0,
    combinator::{eof, opt, preceded, repeat, terminated},
    token::{take_till, take_while},
};

pub(crate) type Span<'a> = LocatingSlice<&'a str>;
type Error = ();
type PResult<T> = winnow::ModalResult<T, Error>;

/// A term as written, before interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
struct RawTerm<'a> {
    text: &'a str,
    start: usize,
}

fn parse_raw_term<'i>(input: &mut Span<'i>) -> PResult<RawTerm<'i>> {
    take_till(1.., char::is_whitespace)
        .with_span()
        .map(|(text, range)| RawTerm {
            text,
            start: range.start,
        })
        .parse_next(input)
}

fn parse_raw_terms<'i>(input: &mut Span<'i>) -> PResult<Vec<RawTerm<'i>>> {
    terminated(
        repeat(0.., preceded(multispace0, parse_raw_term)),
        (multispace0, eof),
    )
    .parse_next(input)
}

/// Parses the `<prefix>:` at the start of a term.
fn parse_prefix<'i>(input: &mut &'i str) -> PResult<&'i str> {
    terminated(take_while(1.., |c: char| c.is_ascii_alphabetic()), ':').parse_next(input)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Prefix {
    Id,
    Name,
    Status,
    Variant,
}

impl Prefix {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "status" => Some(Self::Status),
            "v" => Some(Self::Variant),
            _ => None,
        }
    }
}

fn span(start: usize, len: usize) -> SourceSpan {
    (start, len).into()
}

pub(crate) fn parse_terms(input: &str) -> Result<Vec<SearchTerm>, Vec<ParseSingleError>> {
    let mut stream = Span::new(input);
    let raw_terms = match parse_raw_terms(&mut stream) {
        Ok(raw_terms) => raw_terms,
        // The grammar accepts any input, so this isn't expected to happen.
        Err(_) => return Err(vec![ParseSingleError::Unknown]),
    };

    let mut terms = Vec::with_capacity(raw_terms.len());
    let mut errors = Vec::new();
    for raw in raw_terms {
        match interpret_term(&raw) {
            Ok(term) => terms.push(term),
            Err(mut term_errors) => errors.append(&mut term_errors),
        }
    }

    if errors.is_empty() {
        Ok(terms)
    } else {
        Err(errors)
    }
}

fn interpret_term(raw: &RawTerm<'_>) -> Result<SearchTerm, Vec<ParseSingleError>> {
    let (negated, body, body_start) = match raw.text.strip_prefix('-') {
        Some("") => {
            return Err(vec![ParseSingleError::ExpectedTerm(span(raw.start, 1))]);
        }
        Some(rest) => (true, rest, raw.start + 1),
        None => (false, raw.text, raw.start),
    };

    let mut rest = body;
    let prefix = opt(parse_prefix)
        .parse_next(&mut rest)
        .ok()
        .flatten()
        .and_then(|name| Prefix::from_name(name).map(|prefix| (name, prefix)));

    let matcher = match prefix {
        // Unknown prefixes are part of the text: test IDs commonly contain
        // colons.
        None => SearchMatcher::Text(body.to_lowercase()),
        Some((name, prefix)) => {
            let value_start = body_start + name.len() + 1;
            if rest.is_empty() {
                return Err(vec![ParseSingleError::ExpectedValue {
                    prefix: name.to_owned(),
                    span: span(body_start, body.len()),
                }]);
            }
            match prefix {
                Prefix::Id => SearchMatcher::TestId(rest.to_lowercase()),
                Prefix::Name => SearchMatcher::Name(rest.to_lowercase()),
                Prefix::Status => parse_statuses(rest, value_start)?,
                Prefix::Variant => parse_variant_matcher(rest, value_start)?,
            }
        }
    };

    Ok(SearchTerm { negated, matcher })
}

fn parse_statuses(value: &str, value_start: usize) -> Result<SearchMatcher, Vec<ParseSingleError>> {
    let mut statuses = BTreeSet::new();
    let mut errors = Vec::new();
    let mut offset = value_start;
    for name in value.split(',') {
        if !name.is_empty() {
            match name.parse::<TestVariantStatus>() {
                Ok(status) => {
                    statuses.insert(status);
                }
                Err(_) => errors.push(ParseSingleError::UnknownStatus {
                    name: name.to_owned(),
                    span: span(offset, name.len()),
                }),
            }
        }
        offset += name.len() + 1;
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    if statuses.is_empty() {
        return Err(vec![ParseSingleError::ExpectedValue {
            prefix: "STATUS".to_owned(),
            span: span(value_start, value.len()),
        }]);
    }
    Ok(SearchMatcher::Status(statuses))
}

fn parse_variant_matcher(
    value: &str,
    value_start: usize,
) -> Result<SearchMatcher, Vec<ParseSingleError>> {
    let (key, expected) = match value.split_once('=') {
        Some((key, expected)) => (key, Some(expected.to_owned())),
        None => (value, None),
    };
    if key.is_empty() {
        return Err(vec![ParseSingleError::ExpectedVariantKey(span(
            value_start,
            0,
        ))]);
    }
    Ok(SearchMatcher::Variant {
        key: key.to_owned(),
        value: expected,
    })
}
