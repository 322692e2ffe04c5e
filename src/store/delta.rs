//! Git delta instructions
//!
//! A delta starts with two varints, the base length and the result length,
//! followed by copy (`1xxxxxxx`) and insert (`0nnnnnnn`) instructions.

use crate::error::{Error, Result};

/// Largest run a single copy instruction may carry
const MAX_COPY: usize = 0xffff;
/// Largest run a single insert instruction may carry
const MAX_INSERT: usize = 0x7f;
/// Cap on the output reserved up front from the declared result length
const MAX_PREALLOCATED: usize = 1 << 20;

fn malformed(what: impl std::fmt::Display) -> Error {
    Error::MalformedObject(format!("delta: {}", what))
}

fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = *data.get(*pos).ok_or_else(|| malformed("header truncated"))?;
        *pos += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(malformed("size overflows"));
        }
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Apply delta instructions to `base`.
///
/// The result length declared by the delta is checked against `max_size`
/// before anything is allocated.
pub fn apply_delta(base: &[u8], delta: &[u8], max_size: u64) -> Result<Vec<u8>> {
    let mut pos = 0;
    let base_len = read_varint(delta, &mut pos)?;
    if base_len != base.len() as u64 {
        return Err(malformed(format!(
            "expects a {} byte base, got {}",
            base_len,
            base.len()
        )));
    }
    let result_len = read_varint(delta, &mut pos)?;
    if result_len > max_size {
        return Err(Error::ObjectTooLarge {
            object: "delta result".to_string(),
            size: result_len,
            limit: max_size,
        });
    }
    let result_len = usize::try_from(result_len).map_err(|_| malformed("result length"))?;
    let mut out = Vec::with_capacity(result_len.min(MAX_PREALLOCATED));

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;
        let run = if cmd & 0x80 != 0 {
            let mut offset = 0usize;
            let mut size = 0usize;
            for (bit, shift) in [(0x01, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
                if cmd & bit != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| malformed("copy truncated"))?;
                    offset |= (byte as usize) << shift;
                    pos += 1;
                }
            }
            for (bit, shift) in [(0x10, 0), (0x20, 8), (0x40, 16)] {
                if cmd & bit != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| malformed("copy truncated"))?;
                    size |= (byte as usize) << shift;
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            offset
                .checked_add(size)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| malformed("copy outside base"))?
        } else if cmd != 0 {
            let n = cmd as usize;
            let run = delta
                .get(pos..pos + n)
                .ok_or_else(|| malformed("insert truncated"))?;
            pos += n;
            run
        } else {
            return Err(malformed("reserved opcode 0"));
        };

        if run.len() > result_len - out.len() {
            return Err(malformed(format!("writes past the declared {} bytes", result_len)));
        }
        out.extend_from_slice(run);
    }

    if out.len() != result_len {
        return Err(malformed(format!(
            "produced {} bytes, expected {}",
            out.len(),
            result_len
        )));
    }
    Ok(out)
}

/// Encode `target` as a delta against `base`: copies of the shared prefix,
/// inserts for the rest
pub(crate) fn encode_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, base.len() as u64);
    write_varint(&mut out, target.len() as u64);

    let shared = base.iter().zip(target).take_while(|(a, b)| a == b).count();
    let mut offset = 0;
    while offset < shared {
        let size = (shared - offset).min(MAX_COPY);
        let mut cmd = 0x80u8;
        let mut args = Vec::with_capacity(6);
        for (i, byte) in (offset as u32).to_le_bytes().into_iter().enumerate() {
            if byte != 0 {
                cmd |= 1 << i;
                args.push(byte);
            }
        }
        for (i, byte) in (size as u16).to_le_bytes().into_iter().enumerate() {
            if byte != 0 {
                cmd |= 0x10 << i;
                args.push(byte);
            }
        }
        out.push(cmd);
        out.extend_from_slice(&args);
        offset += size;
    }

    for chunk in target[shared..].chunks(MAX_INSERT) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}
