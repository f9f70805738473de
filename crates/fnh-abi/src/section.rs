//! Custom section access on raw wasm binaries.
//!
//! Only the section framing is walked; section bodies other than custom ones
//! are skipped untouched and left for the compiler to validate.

use thiserror::Error;

const WASM_MAGIC: [u8; 4] = *b"\0asm";
const WASM_VERSION: [u8; 4] = [1, 0, 0, 0];
const CUSTOM_SECTION_ID: u8 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SectionError {
    #[error("not a wasm module (bad magic or version)")]
    BadHeader,
    #[error("section truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("malformed LEB128 integer at offset {offset}")]
    BadLeb { offset: usize },
    #[error("custom section name at offset {offset} is not UTF-8")]
    BadName { offset: usize },
    #[error("custom section of {len} bytes exceeds wasm limits")]
    TooLarge { len: usize },
}

/// Return the payload of every custom section called `name`, in module order.
pub fn read_custom_sections<'a>(wasm: &'a [u8], name: &str) -> Result<Vec<&'a [u8]>, SectionError> {
    if wasm.len() < 8 || wasm[..4] != WASM_MAGIC || wasm[4..8] != WASM_VERSION {
        return Err(SectionError::BadHeader);
    }
    let mut found = Vec::new();
    let mut offset = 8;
    while offset < wasm.len() {
        let id = wasm[offset];
        let (size, body_start) = read_u32(wasm, offset + 1)?;
        let body_end = body_start
            .checked_add(size as usize)
            .filter(|end| *end <= wasm.len())
            .ok_or(SectionError::Truncated { offset })?;
        if id == CUSTOM_SECTION_ID {
            let body = &wasm[..body_end];
            let (name_len, name_start) = read_u32(body, body_start)?;
            let name_end = name_start
                .checked_add(name_len as usize)
                .filter(|end| *end <= body_end)
                .ok_or(SectionError::Truncated { offset: body_start })?;
            let section_name = std::str::from_utf8(&wasm[name_start..name_end])
                .map_err(|_| SectionError::BadName { offset: name_start })?;
            if section_name == name {
                found.push(&wasm[name_end..body_end]);
            }
        }
        offset = body_end;
    }
    Ok(found)
}

/// Append a custom section to an encoded module.
pub fn append_custom_section(
    wasm: &[u8],
    name: &str,
    payload: &[u8],
) -> Result<Vec<u8>, SectionError> {
    if wasm.len() < 8 || wasm[..4] != WASM_MAGIC || wasm[4..8] != WASM_VERSION {
        return Err(SectionError::BadHeader);
    }
    let mut body = Vec::with_capacity(name.len() + payload.len() + 5);
    write_u32(&mut body, name.len())?;
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(payload);

    let mut out = Vec::with_capacity(wasm.len() + body.len() + 6);
    out.extend_from_slice(wasm);
    out.push(CUSTOM_SECTION_ID);
    write_u32(&mut out, body.len())?;
    out.extend_from_slice(&body);
    Ok(out)
}

fn read_u32(bytes: &[u8], start: usize) -> Result<(u32, usize), SectionError> {
    let mut result: u32 = 0;
    let mut offset = start;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(offset)
            .ok_or(SectionError::Truncated { offset: start })?;
        offset += 1;
        // fifth byte may only carry the top four bits
        if shift == 28 && byte & 0xf0 != 0 {
            return Err(SectionError::BadLeb { offset: start });
        }
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, offset));
        }
        shift += 7;
    }
}

fn write_u32(out: &mut Vec<u8>, len: usize) -> Result<(), SectionError> {
    let mut value = u32::try_from(len).map_err(|_| SectionError::TooLarge { len })?;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return Ok(());
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_matching_sections() {
        let wasm = wat::parse_str("(module (func (export \"f\")))").unwrap();
        let wasm = append_custom_section(&wasm, "other", b"x").unwrap();
        let wasm = append_custom_section(&wasm, "wanted", b"payload").unwrap();
        let sections = read_custom_sections(&wasm, "wanted").unwrap();
        assert_eq!(sections, vec![&b"payload"[..]]);
        assert!(read_custom_sections(&wasm, "absent").unwrap().is_empty());
    }

    #[test]
    fn long_payload_uses_multibyte_length() {
        let wasm = wat::parse_str("(module)").unwrap();
        let payload = vec![0xab; 300];
        let wasm = append_custom_section(&wasm, "big", &payload).unwrap();
        let sections = read_custom_sections(&wasm, "big").unwrap();
        assert_eq!(sections[0], payload.as_slice());
    }

    #[test]
    fn rejects_non_wasm() {
        assert_eq!(
            read_custom_sections(b"PK\x03\x04not wasm", "x"),
            Err(SectionError::BadHeader)
        );
        assert_eq!(
            append_custom_section(b"", "x", b""),
            Err(SectionError::BadHeader)
        );
    }

    #[test]
    fn rejects_truncated_section() {
        let mut wasm = wat::parse_str("(module)").unwrap();
        // custom section claiming 16 bytes with only 2 present
        wasm.extend_from_slice(&[0x00, 0x10, 0x01, b'a']);
        assert!(matches!(
            read_custom_sections(&wasm, "a"),
            Err(SectionError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_overlong_leb() {
        let mut wasm = wat::parse_str("(module)").unwrap();
        wasm.extend_from_slice(&[0x00, 0xff, 0xff, 0xff, 0xff, 0x7f]);
        assert!(matches!(
            read_custom_sections(&wasm, "a"),
            Err(SectionError::BadLeb { .. })
        ));
    }
}
