// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP record tokenizer using nom combinators
//!
//! Turns the text of one record (`#123=IFCWALL(attr1,attr2,...);`) into a
//! [`DecodedEntity`]. String escapes are decoded when tokens are converted
//! to owned attribute values.

use ifc_ingest_model::{AttributeValue, DecodedEntity, EntityId, IfcType};
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, one_of},
    combinator::{opt, recognize},
    multi::separated_list0,
    sequence::{delimited, pair},
    IResult, Parser,
};
use thiserror::Error;

/// Why a record could not be tokenized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("expected '#' at start of record")]
    MissingId,
    #[error("expected '=' after entity id")]
    MissingEquals,
    #[error("expected type name")]
    MissingTypeName,
    #[error("malformed attribute list near '{0}'")]
    Attributes(String),
}

/// Raw token borrowed from the record text
#[derive(Clone, Debug, PartialEq)]
pub enum Token<'a> {
    EntityRef(u32),
    /// String body with escapes still encoded
    String(&'a str),
    /// Hex-encoded binary ("0FF")
    Binary(&'a str),
    Integer(i64),
    Float(f64),
    Enum(&'a str),
    List(Vec<Token<'a>>),
    TypedValue(&'a str, Vec<Token<'a>>),
    Null,
    Derived,
}

impl Token<'_> {
    pub fn to_attribute_value(&self) -> AttributeValue {
        match self {
            Token::EntityRef(id) => AttributeValue::EntityRef(EntityId(*id)),
            Token::String(s) => AttributeValue::String(decode_step_string(s)),
            Token::Binary(s) => AttributeValue::String((*s).to_string()),
            Token::Integer(i) => AttributeValue::Integer(*i),
            Token::Float(f) => AttributeValue::Float(*f),
            Token::Enum(s) => match *s {
                "T" | "TRUE" => AttributeValue::Bool(true),
                "F" | "FALSE" => AttributeValue::Bool(false),
                _ => AttributeValue::Enum((*s).to_string()),
            },
            Token::List(items) => {
                AttributeValue::List(items.iter().map(Token::to_attribute_value).collect())
            }
            Token::TypedValue(name, args) => AttributeValue::TypedValue(
                name.to_ascii_uppercase(),
                args.iter().map(Token::to_attribute_value).collect(),
            ),
            Token::Null => AttributeValue::Null,
            Token::Derived => AttributeValue::Derived,
        }
    }
}

/// Decode STEP string escapes
///
/// Handles `''`, `\\`, `\X2\hhhh…\X0\` (UTF-16), `\X4\hhhhhhhh…\X0\`
/// (UTF-32), `\X\hh` (ISO 8859-1) and `\S\c` (upper half of ISO 8859-1).
/// Malformed escapes are kept verbatim.
pub fn decode_step_string(raw: &str) -> String {
    if !raw.contains(['\\', '\'']) {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find(['\\', '\'']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("''") {
            out.push('\'');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("\\\\") {
            out.push('\\');
            rest = after;
        } else if let Some((decoded, after)) = decode_extended(tail) {
            out.push_str(&decoded);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("\\X\\") {
            match after.get(..2).and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                Some(byte) => {
                    out.push(char::from(byte));
                    rest = &after[2..];
                }
                None => {
                    out.push_str("\\X\\");
                    rest = after;
                }
            }
        } else if let Some(after) = tail.strip_prefix("\\S\\") {
            match after.chars().next() {
                Some(c) if c.is_ascii() => {
                    out.push(char::from(c as u8 + 128));
                    rest = &after[1..];
                }
                _ => {
                    out.push_str("\\S\\");
                    rest = after;
                }
            }
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// `\X2\…\X0\` and `\X4\…\X0\` runs
fn decode_extended(tail: &str) -> Option<(String, &str)> {
    let (width, body) = if let Some(body) = tail.strip_prefix("\\X2\\") {
        (4, body)
    } else if let Some(body) = tail.strip_prefix("\\X4\\") {
        (8, body)
    } else {
        return None;
    };

    let end = body.find("\\X0\\")?;
    let hex = &body[..end];
    if hex.len() % width != 0 || !hex.is_ascii() {
        return None;
    }

    let units = (0..hex.len())
        .step_by(width)
        .map(|i| u32::from_str_radix(&hex[i..i + width], 16).ok());

    let decoded = if width == 4 {
        let units: Option<Vec<u16>> = units.map(|u| u.map(|v| v as u16)).collect();
        char::decode_utf16(units?)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    } else {
        units
            .map(|u| u.map(|v| char::from_u32(v).unwrap_or(char::REPLACEMENT_CHARACTER)))
            .collect::<Option<String>>()?
    };

    Some((decoded, &body[end + 4..]))
}

// ============================================================================
// Parsing Primitives
// ============================================================================

/// Whitespace and `/* */` comments
fn ws(input: &str) -> IResult<&str, ()> {
    let mut rest = input;
    loop {
        rest = rest.trim_start();
        match rest.strip_prefix("/*") {
            Some(body) => match body.find("*/") {
                Some(end) => rest = &body[end + 2..],
                None => return Ok(("", ())),
            },
            None => return Ok((rest, ())),
        }
    }
}

fn entity_ref(input: &str) -> IResult<&str, Token<'_>> {
    let (input, _) = char('#')(input)?;
    let (input, digits) = take_while1(|c: char| c.is_ascii_digit())(input)?;
    match lexical_core::parse::<u32>(digits.as_bytes()) {
        Ok(id) => Ok((input, Token::EntityRef(id))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            digits,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

/// Quoted string; the body keeps its escapes
fn step_string(input: &str) -> IResult<&str, Token<'_>> {
    let (body, _) = char('\'')(input)?;

    let bytes = body.as_bytes();
    let mut end = 0;
    loop {
        match memchr::memchr(b'\'', &bytes[end..]) {
            Some(offset) => end += offset,
            None => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )))
            }
        }
        if bytes.get(end + 1) == Some(&b'\'') {
            end += 2;
            continue;
        }
        break;
    }

    Ok((&body[end + 1..], Token::String(&body[..end])))
}

fn binary(input: &str) -> IResult<&str, Token<'_>> {
    let (input, hex) = delimited(
        char('"'),
        take_while(|c: char| c.is_ascii_hexdigit()),
        char('"'),
    )
    .parse(input)?;
    Ok((input, Token::Binary(hex)))
}

fn number(input: &str) -> IResult<&str, Token<'_>> {
    let (input, num_str) = recognize((
        opt(one_of("+-")),
        take_while1(|c: char| c.is_ascii_digit()),
        opt(pair(char('.'), take_while(|c: char| c.is_ascii_digit()))),
        opt((
            one_of("eE"),
            opt(one_of("+-")),
            take_while1(|c: char| c.is_ascii_digit()),
        )),
    ))
    .parse(input)?;

    let digits = num_str.strip_prefix('+').unwrap_or(num_str).as_bytes();
    let token = if num_str.contains(['.', 'e', 'E']) {
        lexical_core::parse::<f64>(digits).ok().map(Token::Float)
    } else {
        lexical_core::parse::<i64>(digits)
            .ok()
            .map(Token::Integer)
            .or_else(|| lexical_core::parse::<f64>(digits).ok().map(Token::Float))
    };

    match token {
        Some(token) => Ok((input, token)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            num_str,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn enumeration(input: &str) -> IResult<&str, Token<'_>> {
    let (input, name) = delimited(
        char('.'),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        char('.'),
    )
    .parse(input)?;
    Ok((input, Token::Enum(name)))
}

fn null_value(input: &str) -> IResult<&str, Token<'_>> {
    let (input, _) = char('$')(input)?;
    Ok((input, Token::Null))
}

fn derived_value(input: &str) -> IResult<&str, Token<'_>> {
    let (input, _) = char('*')(input)?;
    Ok((input, Token::Derived))
}

/// `( token, token, ... )`
fn parenthesized(input: &str) -> IResult<&str, Vec<Token<'_>>> {
    delimited(
        pair(char('('), ws),
        separated_list0((ws, char(','), ws), token),
        pair(ws, char(')')),
    )
    .parse(input)
}

fn list(input: &str) -> IResult<&str, Token<'_>> {
    let (input, items) = parenthesized(input)?;
    Ok((input, Token::List(items)))
}

fn keyword(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// Typed value like IFCLABEL('text')
fn typed_value(input: &str) -> IResult<&str, Token<'_>> {
    let (input, type_name) = keyword(input)?;
    let (input, _) = ws(input)?;
    let (input, args) = parenthesized(input)?;
    Ok((input, Token::TypedValue(type_name, args)))
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        entity_ref,
        step_string,
        null_value,
        derived_value,
        enumeration,
        number,
        list,
        binary,
        typed_value,
    ))
    .parse(input)
}

// ============================================================================
// Record Parsing
// ============================================================================

/// Parse a complete record
///
/// Format: `#123=IFCWALL(attr1,attr2,...);`
pub fn parse_entity(input: &str) -> Result<DecodedEntity, SyntaxError> {
    let (input, _) = ws(input).map_err(|_| SyntaxError::MissingId)?;
    let (input, EntityId(id)) = parse_id(input)?;

    let (input, _) = (ws, char('='), ws)
        .parse(input)
        .map_err(|_: nom::Err<nom::error::Error<&str>>| SyntaxError::MissingEquals)?;

    let (input, type_name) = keyword(input).map_err(|_| SyntaxError::MissingTypeName)?;
    let (input, _) = ws(input).map_err(|_| SyntaxError::MissingTypeName)?;

    let (_, tokens) = parenthesized(input).map_err(|_| {
        SyntaxError::Attributes(input.chars().take(24).collect())
    })?;

    Ok(DecodedEntity {
        id: EntityId(id),
        ifc_type: IfcType::parse(type_name),
        attributes: tokens.iter().map(Token::to_attribute_value).collect(),
    })
}

fn parse_id(input: &str) -> Result<(&str, EntityId), SyntaxError> {
    match entity_ref(input) {
        Ok((rest, Token::EntityRef(id))) => Ok((rest, EntityId(id))),
        _ => Err(SyntaxError::MissingId),
    }
}

/// Parse a header record such as `FILE_SCHEMA(('IFC4'));`
pub fn parse_header_record(input: &str) -> Option<(String, Vec<AttributeValue>)> {
    let (input, _) = ws(input).ok()?;
    let (input, name) = keyword(input).ok()?;
    let (input, _) = ws(input).ok()?;
    let (_, tokens) = parenthesized(input).ok()?;
    Some((
        name.to_ascii_uppercase(),
        tokens.iter().map(Token::to_attribute_value).collect(),
    ))
}
