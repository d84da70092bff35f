//! pkt-line framing
//!
//! Every line of a smart HTTP exchange is prefixed with its total length
//! (payload plus the 4 length bytes) as 4 lowercase hex digits. `0000` is
//! a flush packet that ends a section.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};

/// Largest payload a single pkt-line may carry
pub const MAX_PKT_PAYLOAD: usize = 65516;

pub const FLUSH_PKT: &[u8] = b"0000";

const LENGTH_PREFIX: usize = 4;

/// One decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Bytes),
    Flush,
}

/// Encode a payload as one pkt-line
pub fn encode(payload: &[u8]) -> anyhow::Result<Bytes> {
    if payload.len() > MAX_PKT_PAYLOAD {
        anyhow::bail!(
            "pkt-line payload of {} bytes exceeds {MAX_PKT_PAYLOAD}",
            payload.len()
        );
    }

    let mut line = BytesMut::with_capacity(payload.len() + LENGTH_PREFIX);
    line.put(format!("{:04x}", payload.len() + LENGTH_PREFIX).as_bytes());
    line.put(payload);

    Ok(line.freeze())
}

/// Decode the packet at the start of `input`
///
/// Returns the packet and the number of bytes it occupied.
pub fn decode(input: &[u8]) -> anyhow::Result<(PktLine, usize)> {
    let prefix = input
        .get(..LENGTH_PREFIX)
        .context("truncated pkt-line length")?;
    let prefix = std::str::from_utf8(prefix).context("pkt-line length is not ASCII")?;
    let length = usize::from_str_radix(prefix, 16)
        .with_context(|| format!("invalid pkt-line length {prefix:?}"))?;

    match length {
        0 => Ok((PktLine::Flush, LENGTH_PREFIX)),
        1..=3 => anyhow::bail!("invalid pkt-line length {length}"),
        _ => {
            let payload = input
                .get(LENGTH_PREFIX..length)
                .with_context(|| format!("truncated pkt-line: expected {length} bytes"))?;

            Ok((PktLine::Data(Bytes::copy_from_slice(payload)), length))
        }
    }
}

/// Decode packets up to and including the first flush
///
/// Returns the data lines and the offset right after the flush packet.
pub fn decode_until_flush(input: &[u8]) -> anyhow::Result<(Vec<Bytes>, usize)> {
    let mut lines = Vec::new();
    let mut offset = 0;

    loop {
        let (line, consumed) = decode(&input[offset..])?;
        offset += consumed;

        match line {
            PktLine::Data(payload) => lines.push(payload),
            PktLine::Flush => return Ok((lines, offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn length_prefix_counts_itself() {
        let line = encode(b"hello\n").unwrap();

        assert_eq!(&line[..], b"000ahello\n");
    }

    #[test]
    fn decodes_a_section_and_stops_at_flush() {
        let mut input = Vec::new();
        input.extend_from_slice(&encode(b"one").unwrap());
        input.extend_from_slice(&encode(b"two").unwrap());
        input.extend_from_slice(FLUSH_PKT);
        input.extend_from_slice(b"PACK");

        let (lines, offset) = decode_until_flush(&input).unwrap();

        assert_eq!(lines, vec![Bytes::from("one"), Bytes::from("two")]);
        assert_eq!(&input[offset..], b"PACK");
    }

    #[test]
    fn rejects_malformed_lengths() {
        assert!(decode(b"00").is_err());
        assert!(decode(b"zzzz").is_err());
        assert!(decode(b"0002").is_err());
        assert!(decode(b"0010short").is_err());
    }

    #[test]
    fn rejects_oversized_payloads() {
        assert!(encode(&vec![b'x'; MAX_PKT_PAYLOAD + 1]).is_err());
    }
}
