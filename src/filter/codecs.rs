//! Byte codecs for the ASCII and run-length filters

use crate::error::{PdfError, PdfResult};
use super::BoundedBuffer;

/// Run-length end of data marker
pub(crate) const RUN_LENGTH_EOD: u8 = 128;

fn is_white(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

// ASCII85

pub(crate) fn decode_ascii85(data: &[u8], output: &mut BoundedBuffer) -> PdfResult<()> {
    let mut group = [0u8; 5];
    let mut count = 0;

    for &byte in data {
        match byte {
            b'~' => break,
            b'z' if count == 0 => output.try_extend(&[0, 0, 0, 0])?,
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    output.try_extend(&ascii85_value(&group)?.to_be_bytes())?;
                    count = 0;
                }
            }
            b if is_white(b) => continue,
            _ => {
                return Err(PdfError::malformed(format!("Invalid ASCII85 character: 0x{:02X}", byte)))
            }
        }
    }

    if count == 1 {
        return Err(PdfError::malformed("Incomplete ASCII85 group"));
    }
    if count > 1 {
        for digit in group.iter_mut().skip(count) {
            *digit = 84;
        }
        let bytes = ascii85_value(&group)?.to_be_bytes();
        output.try_extend(&bytes[..count - 1])?;
    }
    Ok(())
}

fn ascii85_value(group: &[u8; 5]) -> PdfResult<u32> {
    let value = group.iter().fold(0u64, |acc, &d| acc * 85 + d as u64);
    u32::try_from(value).map_err(|_| PdfError::malformed(format!("ASCII85 group out of range: {}", value)))
}

/// Encode one group of up to four bytes; `z` only for a full zero group
pub(crate) fn encode_ascii85_group(chunk: &[u8], output: &mut Vec<u8>) {
    let mut buffer = [0u8; 4];
    buffer[..chunk.len()].copy_from_slice(chunk);
    let value = u32::from_be_bytes(buffer);

    if value == 0 && chunk.len() == 4 {
        output.push(b'z');
        return;
    }

    let mut digits = [0u8; 5];
    let mut temp = value;
    for digit in digits.iter_mut().rev() {
        *digit = (temp % 85) as u8 + b'!';
        temp /= 85;
    }
    output.extend_from_slice(&digits[..chunk.len() + 1]);
}

// ASCIIHex

pub(crate) fn decode_ascii_hex(data: &[u8], output: &mut BoundedBuffer) -> PdfResult<()> {
    let mut decoded = Vec::with_capacity(data.len() / 2);
    let mut value = 0u8;
    let mut high_digit = true;

    for &byte in data {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'A'..=b'F' => byte - b'A' + 10,
            b'a'..=b'f' => byte - b'a' + 10,
            b'>' => break,
            b if is_white(b) => continue,
            _ => {
                return Err(PdfError::malformed(format!("Invalid hex character: 0x{:02X}", byte)))
            }
        };

        if high_digit {
            value = digit << 4;
        } else {
            decoded.push(value | digit);
        }
        high_digit = !high_digit;
    }

    if !high_digit {
        decoded.push(value);
    }
    output.try_extend(&decoded)
}

// RunLength

pub(crate) fn decode_run_length(data: &[u8], output: &mut BoundedBuffer) -> PdfResult<()> {
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            0..=127 => {
                let count = length as usize + 1;
                let end = (i + count).min(data.len());
                output.try_extend(&data[i..end])?;
                i = end;
            }
            RUN_LENGTH_EOD => break,
            _ => {
                let byte = *data
                    .get(i)
                    .ok_or_else(|| PdfError::malformed("Truncated run length data"))?;
                let count = 257 - length as usize;
                output.try_extend(&vec![byte; count])?;
                i += 1;
            }
        }
    }

    Ok(())
}

/// Run-length encode `data`, terminated by the end of data marker
pub(crate) fn encode_run_length(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + data.len() / 128 + 2);
    let mut i = 0;

    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && run < 128 && data[i + run] == data[i] {
            run += 1;
        }

        if run >= 2 {
            output.push((257 - run) as u8);
            output.push(data[i]);
            i += run;
            continue;
        }

        let start = i;
        let mut literal = 0;
        while i < data.len() && literal < 128 {
            if i + 1 < data.len() && data[i] == data[i + 1] {
                break;
            }
            i += 1;
            literal += 1;
        }
        output.push((literal - 1) as u8);
        output.extend_from_slice(&data[start..start + literal]);
    }

    output.push(RUN_LENGTH_EOD);
    output
}
