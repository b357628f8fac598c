// codec.rs - Manifest text format
//
// Sections are blocks of `Key: Value` lines separated by blank lines. A line
// beginning with a single space continues the previous line. Output lines
// longer than 72 bytes are soft-wrapped with CRLF + space.
//
// Continuation lines are joined as raw bytes before UTF-8 decoding, since a
// wrap point may fall inside a multi-byte character.

use std::io::{self, Write};

use crate::error::{JarError, JarResult};
use crate::manifest::{AttributeName, Attributes, Manifest};

/// Longest physical line accepted by the parser, terminator excluded.
pub const LINE_BUFFER: usize = 512;

/// Longest physical line produced by the writer, terminator excluded.
pub const MAX_LINE_BYTES: usize = 72;

/// Parse manifest (or signature file) bytes.
pub fn parse(bytes: &[u8]) -> JarResult<Manifest> {
    let lines = physical_lines(bytes)?;
    let mut manifest = Manifest::new();
    let mut cursor = 0;

    read_section(&lines, &mut cursor, manifest.main_attributes_mut())?;

    loop {
        while cursor < lines.len() && lines[cursor].text.is_empty() {
            cursor += 1;
        }
        if cursor >= lines.len() {
            break;
        }
        let (line_no, logical) = next_logical(&lines, &mut cursor)?;
        let (key, value) = split_header(line_no, &logical)?;
        if !key.eq_ignore_ascii_case(AttributeName::NAME) {
            return Err(JarError::malformed(
                line_no,
                format!("section must start with a Name line, found {key:?}"),
            ));
        }
        let attrs = manifest.entry_mut(&value);
        read_section(&lines, &mut cursor, attrs)?;
    }

    Ok(manifest)
}

/// Serialize to a byte buffer.
pub fn to_bytes(manifest: &Manifest) -> Vec<u8> {
    let mut out = Vec::new();
    write_main(manifest.main_attributes(), &mut out);
    for (name, attrs) in manifest.entries() {
        write_line(&mut out, AttributeName::NAME, name);
        for (key, value) in attrs.iter() {
            write_line(&mut out, key.as_str(), value);
        }
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Serialize into a writer.
pub fn write<W: Write>(manifest: &Manifest, mut out: W) -> io::Result<()> {
    out.write_all(&to_bytes(manifest))
}

/// Main section: the version attribute goes first, then the rest in order.
fn write_main(main: &Attributes, out: &mut Vec<u8>) {
    let version_key = [AttributeName::MANIFEST_VERSION, AttributeName::SIGNATURE_VERSION]
        .into_iter()
        .find(|k| main.contains(k));

    if let Some(key) = version_key {
        if let Some(value) = main.get(key) {
            write_line(out, key, value);
        }
    }
    for (key, value) in main.iter() {
        if version_key.is_some_and(|v| key.matches(v)) {
            continue;
        }
        write_line(out, key.as_str(), value);
    }
    out.extend_from_slice(b"\r\n");
}

fn write_line(out: &mut Vec<u8>, key: &str, value: &str) {
    let mut line = Vec::with_capacity(key.len() + value.len() + 2);
    line.extend_from_slice(key.as_bytes());
    line.extend_from_slice(b": ");
    line.extend_from_slice(value.as_bytes());
    out.extend_from_slice(&wrap_line(line));
    out.extend_from_slice(b"\r\n");
}

/// Insert `CRLF SP` at byte 70 and every 72 bytes after, re-measuring the
/// lengthened line each time.
pub fn wrap_line(mut line: Vec<u8>) -> Vec<u8> {
    let mut length = line.len();
    if length > MAX_LINE_BYTES {
        let mut index = 70;
        while index < length - 2 {
            let tail = line.split_off(index);
            line.extend_from_slice(b"\r\n ");
            line.extend_from_slice(&tail);
            index += 72;
            length += 3;
        }
    }
    line
}

struct PhysicalLine<'a> {
    number: usize,
    text: &'a [u8],
}

fn physical_lines(bytes: &[u8]) -> JarResult<Vec<PhysicalLine<'_>>> {
    let mut lines = Vec::new();
    let mut pos = 0;
    let mut number = 1;

    while pos < bytes.len() {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .map_or(bytes.len(), |off| pos + off);
        if end - pos > LINE_BUFFER {
            return Err(JarError::malformed(number, "line too long"));
        }
        lines.push(PhysicalLine {
            number,
            text: &bytes[pos..end],
        });

        pos = end;
        if pos < bytes.len() {
            if bytes[pos] == b'\r' && bytes.get(pos + 1) == Some(&b'\n') {
                pos += 2;
            } else {
                pos += 1;
            }
        }
        number += 1;
    }
    Ok(lines)
}

/// Join a header line with its continuation lines.
fn next_logical(lines: &[PhysicalLine<'_>], cursor: &mut usize) -> JarResult<(usize, Vec<u8>)> {
    let first = &lines[*cursor];
    if first.text.first() == Some(&b' ') {
        return Err(JarError::malformed(first.number, "misplaced continuation line"));
    }
    let mut logical = first.text.to_vec();
    *cursor += 1;
    while let Some(next) = lines.get(*cursor) {
        match next.text.split_first() {
            Some((b' ', rest)) => {
                logical.extend_from_slice(rest);
                *cursor += 1;
            }
            _ => break,
        }
    }
    Ok((first.number, logical))
}

fn split_header(line_no: usize, logical: &[u8]) -> JarResult<(String, String)> {
    let colon = logical
        .iter()
        .position(|&b| b == b':')
        .filter(|&i| logical.get(i + 1) == Some(&b' '))
        .ok_or_else(|| JarError::malformed(line_no, "invalid header field"))?;

    let key = std::str::from_utf8(&logical[..colon])
        .map_err(|_| JarError::malformed(line_no, "invalid header field"))?;
    let value = String::from_utf8(logical[colon + 2..].to_vec())
        .map_err(|_| JarError::malformed(line_no, "value is not valid UTF-8"))?;
    Ok((key.to_string(), value))
}

/// Read `Key: Value` lines into `attrs` until a blank line or end of input.
fn read_section(
    lines: &[PhysicalLine<'_>],
    cursor: &mut usize,
    attrs: &mut Attributes,
) -> JarResult<()> {
    while let Some(line) = lines.get(*cursor) {
        if line.text.is_empty() {
            *cursor += 1;
            return Ok(());
        }
        let (line_no, logical) = next_logical(lines, cursor)?;
        let (key, value) = split_header(line_no, &logical)?;
        let name = AttributeName::new(&key)
            .map_err(|_| JarError::malformed(line_no, format!("invalid attribute name {key:?}")))?;
        if attrs.insert(name, value).is_some() {
            tracing::debug!(line = line_no, key = %key, "duplicate manifest attribute, keeping last");
        }
    }
    Ok(())
}
