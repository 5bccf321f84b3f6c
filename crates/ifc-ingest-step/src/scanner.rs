// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-pass record scanner
//!
//! Finds every `#id=TYPE(...);` record in the DATA section without parsing
//! attributes. Uses memchr for the `#` search and for skipping through
//! quoted strings, so the cost is one linear pass over the buffer.

use crate::tokenizer;
use ifc_ingest_model::{AttributeValue, ModelMetadata};
use memchr::{memchr, memchr3, memmem};

const STEP_MAGIC: &[u8] = b"ISO-10303-21";

/// Location of one record, as found by the scanner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScannedRecord<'a> {
    pub express_id: u32,
    /// Type name as written in the file
    pub type_name: &'a str,
    /// Offset of the leading `#`
    pub byte_offset: usize,
    /// Length up to and including the terminating `;`
    pub byte_length: usize,
    /// 1-based line of the leading `#`
    pub line_number: u32,
}

/// Whether the buffer starts like an ISO-10303-21 file
pub fn looks_like_step(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(STEP_MAGIC)
}

/// Offset just past `DATA;`, if the file has a data section
pub fn data_section_start(bytes: &[u8]) -> Option<usize> {
    memmem::find(bytes, b"DATA;").map(|p| p + 5)
}

/// Index just past the `;` terminating the record that continues at `from`
///
/// Quoted strings (with `''` escapes) and `/* */` comments may contain `;`.
/// Returns `None` when the record is never terminated.
pub fn record_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    loop {
        i += memchr3(b'\'', b';', b'/', bytes.get(i..)?)?;
        match bytes[i] {
            b';' => return Some(i + 1),
            b'\'' => {
                i += 1;
                loop {
                    i += memchr(b'\'', bytes.get(i..)?)? + 1;
                    if bytes.get(i) == Some(&b'\'') {
                        i += 1;
                        continue;
                    }
                    break;
                }
            }
            _ => {
                if bytes.get(i + 1) == Some(&b'*') {
                    i += 2 + memmem::find(bytes.get(i + 2..)?, b"*/")? + 2;
                } else {
                    i += 1;
                }
            }
        }
    }
}

enum Step<'a> {
    Record(ScannedRecord<'a>),
    Resume(usize),
    End,
}

/// Iterator over the records of a STEP buffer
pub struct EntityScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    line_pos: usize,
}

impl<'a> EntityScanner<'a> {
    /// Scanner positioned after `DATA;` (or at the start if there is none)
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: data_section_start(bytes).unwrap_or(0),
            line: 1,
            line_pos: 0,
        }
    }

    /// Line number at `pos`; positions must be non-decreasing across calls
    fn line_at(&mut self, pos: usize) -> u32 {
        let newlines = memchr::memchr_iter(b'\n', &self.bytes[self.line_pos..pos]).count();
        self.line += newlines as u32;
        self.line_pos = pos;
        self.line
    }

    pub fn next_record(&mut self) -> Option<ScannedRecord<'a>> {
        let bytes = self.bytes;
        loop {
            let hash = self.pos + memchr(b'#', bytes.get(self.pos..)?)?;

            // A comment may hide this '#'
            if let Some(open) = memmem::find(&bytes[self.pos..hash], b"/*") {
                let body = self.pos + open + 2;
                self.pos = body + memmem::find(&bytes[body..], b"*/")? + 2;
                continue;
            }

            match self.record_at(hash) {
                Step::Record(record) => return Some(record),
                Step::Resume(pos) => self.pos = pos,
                Step::End => {
                    self.pos = bytes.len();
                    return None;
                }
            }
        }
    }

    fn record_at(&mut self, hash: usize) -> Step<'a> {
        let bytes = self.bytes;
        let skip_spaces = |mut i: usize| {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            i
        };

        let id_start = hash + 1;
        let mut i = id_start;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == id_start {
            return Step::Resume(id_start);
        }
        let Ok(express_id) = lexical_core::parse::<u32>(&bytes[id_start..i]) else {
            return Step::Resume(i);
        };

        i = skip_spaces(i);
        if bytes.get(i) != Some(&b'=') {
            return Step::Resume(i);
        }
        i = skip_spaces(i + 1);

        let type_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        let type_end = i;

        let Some(end) = record_end(bytes, i) else {
            log::debug!("unterminated record {} ignored", express_id);
            return Step::End;
        };

        if type_start == type_end {
            // Complex instance `#1=(A() B());` carries no single type name
            log::trace!("skipping complex record #{}", express_id);
            return Step::Resume(end);
        }

        let Ok(type_name) = std::str::from_utf8(&bytes[type_start..type_end]) else {
            return Step::Resume(end);
        };

        self.pos = end;
        Step::Record(ScannedRecord {
            express_id,
            type_name,
            byte_offset: hash,
            byte_length: end - hash,
            line_number: self.line_at(hash),
        })
    }
}

impl<'a> Iterator for EntityScanner<'a> {
    type Item = ScannedRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Parse the HEADER section into model metadata
///
/// Recognizes FILE_DESCRIPTION, FILE_NAME and FILE_SCHEMA; unknown header
/// records are ignored.
pub fn parse_header(bytes: &[u8]) -> ModelMetadata {
    let mut metadata = ModelMetadata::default();

    let Some(start) = memmem::find(bytes, b"HEADER;").map(|p| p + 7) else {
        return metadata;
    };
    let end = memmem::find(&bytes[start..], b"ENDSEC;")
        .map(|p| start + p)
        .unwrap_or(bytes.len());
    let header = &bytes[..end];

    let mut pos = start;
    while let Some(next) = record_end(header, pos) {
        let text = String::from_utf8_lossy(&header[pos..next]);
        pos = next;

        let Some((name, args)) = tokenizer::parse_header_record(&text) else {
            continue;
        };

        let string_at = |i: usize| args.get(i).and_then(|a| a.as_string()).map(str::to_string);
        let first_of_list = |i: usize| {
            args.get(i)
                .and_then(|a| a.as_list())
                .and_then(|items| items.iter().find_map(|v| v.as_string()))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match name.as_str() {
            "FILE_DESCRIPTION" => {
                metadata.file_description = args.first().and_then(|a| a.as_list()).map(|items| {
                    items
                        .iter()
                        .filter_map(AttributeValue::as_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                });
            }
            "FILE_NAME" => {
                metadata.file_name = string_at(0);
                metadata.timestamp = string_at(1);
                metadata.author = first_of_list(2);
                metadata.organization = first_of_list(3);
                metadata.preprocessor_version = string_at(4);
                metadata.originating_system = string_at(5);
            }
            "FILE_SCHEMA" => {
                if let Some(schema) = first_of_list(0) {
                    metadata.schema_version = schema;
                }
            }
            _ => {}
        }
    }

    metadata
}
