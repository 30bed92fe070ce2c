//! PDF cross-reference table implementation
//!
//! Both encodings are handled: the classic `xref` table of 20-byte lines
//! and the binary cross-reference stream (`/Type /XRef`, `/W`, `/Index`).

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{trace, warn};
use crate::error::{PdfError, PdfResult};
use super::parser::Lexer;
use super::registry::MAX_GENERATION;
use super::{names, Array, Dictionary, Value};

/// One cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Unused slot; `generation` is the one the next user of the slot gets
    Free { next: u32, generation: u16 },
    /// Object stored at a byte offset
    InUse { offset: u64, generation: u16 },
    /// Object stored at position `index` of object stream `stream`
    Compressed { stream: u32, index: u32 },
}

impl XrefEntry {
    pub fn generation(&self) -> u16 {
        match self {
            XrefEntry::Free { generation, .. } | XrefEntry::InUse { generation, .. } => *generation,
            XrefEntry::Compressed { .. } => 0,
        }
    }
}

/// Cross-reference entries by object number
#[derive(Debug, Default, Clone, PartialEq)]
pub struct XrefTable {
    entries: BTreeMap<u32, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    pub fn insert(&mut self, number: u32, entry: XrefEntry) {
        self.entries.insert(number, entry);
    }

    /// Add entries of an older section; numbers already present win
    pub fn merge_older(&mut self, older: XrefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, XrefEntry)> + '_ {
        self.entries.iter().map(|(&n, &e)| (n, e))
    }

    /// Parse a classic table. The lexer is positioned right after the
    /// `xref` keyword and is left on the `trailer` keyword.
    pub(crate) fn parse_table(lexer: &mut Lexer<'_>) -> PdfResult<Self> {
        let mut table = Self::new();
        loop {
            lexer.skip_whitespace();
            let saved = lexer.position();
            if lexer.try_keyword(b"trailer") {
                lexer.set_position(saved);
                return Ok(table);
            }

            let start = subsection_field(lexer.read_unsigned()?)?;
            let count = subsection_field(lexer.read_unsigned()?)?;
            trace!("Xref subsection {} {}", start, count);

            for i in 0..count {
                let offset = lexer.read_unsigned()?;
                let generation = lexer.read_unsigned()?.min(MAX_GENERATION as u64) as u16;
                let kind = lexer.read_token();
                let entry = match kind {
                    b"n" => XrefEntry::InUse { offset, generation },
                    b"f" => XrefEntry::Free { next: offset as u32, generation },
                    other => {
                        return Err(PdfError::Xref(format!(
                            "Invalid xref entry type '{}'",
                            String::from_utf8_lossy(other)
                        )))
                    }
                };
                let number = start.checked_add(i).ok_or_else(|| {
                    PdfError::Xref(format!("Xref subsection {} {} overflows object numbers", start, count))
                })?;
                table.entries.entry(number).or_insert(entry);
            }
        }
    }

    /// Decode the binary entries of a cross-reference stream
    pub(crate) fn parse_stream(dict: &Dictionary, data: &[u8]) -> PdfResult<Self> {
        let widths: Vec<usize> = dict
            .get_array(names::W)
            .ok_or_else(|| PdfError::Xref("Missing /W in xref stream".to_string()))?
            .iter()
            .map(|w| w.as_i64().unwrap_or(0).clamp(0, 8) as usize)
            .collect();
        if widths.len() != 3 {
            return Err(PdfError::Xref(format!("Invalid /W of length {}", widths.len())));
        }

        let size = dict.get_i64(names::SIZE).unwrap_or(0).max(0) as u32;
        let index: Vec<u32> = match dict.get_array(names::INDEX) {
            Some(index) => index.iter().map(|v| v.as_i64().unwrap_or(0).max(0) as u32).collect(),
            None => vec![0, size],
        };

        let row_len: usize = widths.iter().sum();
        if row_len == 0 {
            return Err(PdfError::Xref("Xref stream rows have zero width".to_string()));
        }
        let mut cursor = Cursor::new(data);
        let mut table = Self::new();

        for range in index.chunks_exact(2) {
            for number in range[0]..range[0].saturating_add(range[1]) {
                if (cursor.position() as usize) + row_len > data.len() {
                    warn!("Xref stream ends before object {}", number);
                    return Ok(table);
                }
                let kind = read_field(&mut cursor, widths[0], 1)?;
                let second = read_field(&mut cursor, widths[1], 0)?;
                let third = read_field(&mut cursor, widths[2], 0)?;
                let entry = match kind {
                    0 => XrefEntry::Free { next: second as u32, generation: third as u16 },
                    1 => XrefEntry::InUse { offset: second, generation: third as u16 },
                    2 => XrefEntry::Compressed { stream: second as u32, index: third as u32 },
                    other => {
                        trace!("Ignoring xref entry of type {} for object {}", other, number);
                        continue;
                    }
                };
                table.entries.entry(number).or_insert(entry);
            }
        }
        Ok(table)
    }

    /// Write a classic table covering objects `0..size`. Missing numbers
    /// are written as free entries linked into the free list.
    pub(crate) fn write_table(&self, size: u32, out: &mut Vec<u8>) -> PdfResult<()> {
        let free_numbers = self.free_numbers(size);
        let next_free = |number: u32| -> u32 {
            free_numbers.iter().copied().find(|&n| n > number).unwrap_or(0)
        };

        write!(out, "xref\n0 {}\n", size)?;
        for number in 0..size {
            match self.entries.get(&number) {
                Some(XrefEntry::InUse { offset, generation }) => {
                    write!(out, "{:010} {:05} n\r\n", offset, generation)?;
                }
                Some(XrefEntry::Compressed { .. }) => {
                    return Err(PdfError::Xref(format!(
                        "Object {} is compressed and needs an xref stream",
                        number
                    )))
                }
                Some(XrefEntry::Free { generation, .. }) => {
                    write!(out, "{:010} {:05} f\r\n", next_free(number), generation)?;
                }
                None if number == 0 => {
                    write!(out, "{:010} {:05} f\r\n", next_free(0), MAX_GENERATION)?;
                }
                None => write!(out, "{:010} {:05} f\r\n", next_free(number), 0)?,
            }
        }
        Ok(())
    }

    fn free_numbers(&self, size: u32) -> Vec<u32> {
        (1..size)
            .filter(|n| !matches!(
                self.entries.get(n),
                Some(XrefEntry::InUse { .. } | XrefEntry::Compressed { .. })
            ))
            .collect()
    }

    /// Binary rows and `/W` for a cross-reference stream over `0..size`
    pub(crate) fn encode_stream(&self, size: u32) -> PdfResult<(Vec<u8>, Array)> {
        let largest = self
            .entries
            .values()
            .map(|e| match e {
                XrefEntry::InUse { offset, .. } => *offset,
                XrefEntry::Compressed { stream, .. } => *stream as u64,
                XrefEntry::Free { next, .. } => *next as u64,
            })
            .max()
            .unwrap_or(0)
            .max(size as u64);
        let width = bytes_needed(largest);

        let free_numbers = self.free_numbers(size);
        let mut rows = Vec::with_capacity(size as usize * (width + 3));
        for number in 0..size {
            let next = free_numbers.iter().copied().find(|&n| n > number).unwrap_or(0) as u64;
            let (kind, second, third) = match self.entries.get(&number) {
                Some(XrefEntry::InUse { offset, generation }) => (1, *offset, *generation as u64),
                Some(XrefEntry::Compressed { stream, index }) => (2, *stream as u64, *index as u64),
                Some(XrefEntry::Free { generation, .. }) => (0, next, *generation as u64),
                None if number == 0 => (0, next, MAX_GENERATION as u64),
                None => (0, next, 0),
            };
            rows.write_u8(kind)?;
            rows.write_uint::<BigEndian>(second, width)?;
            rows.write_u16::<BigEndian>(third as u16)?;
        }

        let widths = Array::from(vec![Value::from(1), Value::from(width), Value::from(2)]);
        Ok((rows, widths))
    }
}

fn subsection_field(value: u64) -> PdfResult<u32> {
    u32::try_from(value).map_err(|_| PdfError::Xref(format!("Xref subsection value {} out of range", value)))
}

fn read_field(cursor: &mut Cursor<&[u8]>, width: usize, default: u64) -> PdfResult<u64> {
    if width == 0 {
        return Ok(default);
    }
    cursor
        .read_uint::<BigEndian>(width)
        .map_err(|e| PdfError::Xref(format!("Truncated xref stream: {}", e)))
}

fn bytes_needed(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    ((bits + 7) / 8).max(1)
}
