//! WAL frame format (spec.md §3, §4.2, §6.3 — bit-exact for compatibility).
//!
//! ```text
//! length: u64 big-endian
//! format: u8 ∈ { 0x00 RAW, 0x01 JSON_UTF8, 0x02 MSGPACK }
//! payload: `length` bytes
//! ```
//!
//! Legacy reader rule: if the byte immediately after `length` is not a
//! recognized format code, treat it as the first payload byte and assume
//! `JSON_UTF8` — this is how pre-framing-era WAL segments decode without a
//! migration step.

use protobase_core::atom::Atom;
use protobase_core::error::{Error, Result};
use std::io::Read;

/// Payload encoding recorded in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Opaque bytes, no further decoding.
    Raw,
    /// UTF-8 JSON.
    JsonUtf8,
    /// MessagePack.
    MsgPack,
}

impl Format {
    /// The on-disk tag byte for a recognized format, or `None` for a legacy
    /// frame (no tag byte present at all).
    fn tag(self) -> u8 {
        match self {
            Format::Raw => 0x00,
            Format::JsonUtf8 => 0x01,
            Format::MsgPack => 0x02,
        }
    }

    fn from_tag(tag: u8) -> Option<Format> {
        match tag {
            0x00 => Some(Format::Raw),
            0x01 => Some(Format::JsonUtf8),
            0x02 => Some(Format::MsgPack),
            _ => None,
        }
    }
}

/// Encode `payload` as a single frame: `[len u64 BE][format u8][payload]`.
pub fn encode_frame(format: Format, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + payload.len());
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.push(format.tag());
    buf.extend_from_slice(payload);
    buf
}

/// A decoded frame: its format and raw payload bytes (post-frame, pre any
/// format-specific parsing such as JSON/MessagePack decoding).
pub struct DecodedFrame {
    /// The payload's encoding.
    pub format: Format,
    /// Raw payload bytes.
    pub bytes: Vec<u8>,
    /// Total bytes consumed from the reader, including the header.
    pub consumed: u64,
}

/// Read one frame from `reader`, applying the legacy-compat rule in §4.2:
///
/// 1. Read 8 bytes as big-endian length `L`.
/// 2. Peek one byte `F`. If `F` is a recognized format code, consume it and
///    read `L` payload bytes. Otherwise treat that byte as the first payload
///    byte and assume `JSON_UTF8`, reading `L` payload bytes total (the byte
///    already read counts as the first of the `L`).
pub fn read_frame<R: Read>(reader: &mut R) -> Result<DecodedFrame> {
    let mut len_buf = [0u8; 8];
    reader
        .read_exact(&mut len_buf)
        .map_err(|e| Error::io(format!("reading frame length: {e}")))?;
    let len = u64::from_be_bytes(len_buf);

    let mut probe = [0u8; 1];
    reader
        .read_exact(&mut probe)
        .map_err(|e| Error::io(format!("reading frame format byte: {e}")))?;

    match Format::from_tag(probe[0]) {
        Some(format) => {
            let mut payload = vec![0u8; len as usize];
            reader
                .read_exact(&mut payload)
                .map_err(|e| Error::corruption(format!("truncated frame payload: {e}")))?;
            Ok(DecodedFrame {
                format,
                bytes: payload,
                consumed: 8 + 1 + len,
            })
        }
        None => {
            // Legacy frame: `probe[0]` is the first payload byte.
            if len == 0 {
                return Err(Error::corruption(
                    "legacy frame claims zero length but a probe byte was read",
                ));
            }
            let mut payload = vec![0u8; len as usize];
            payload[0] = probe[0];
            if len > 1 {
                reader
                    .read_exact(&mut payload[1..])
                    .map_err(|e| Error::corruption(format!("truncated legacy frame: {e}")))?;
            }
            Ok(DecodedFrame {
                format: Format::JsonUtf8,
                bytes: payload,
                consumed: 8 + len,
            })
        }
    }
}

/// Serialize an atom's fields per `format`, ready to hand to [`encode_frame`].
pub fn encode_atom_payload(atom: &Atom, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Raw => Err(Error::validation("atoms cannot be encoded as RAW payload")),
        Format::JsonUtf8 => Ok(serde_json::to_vec(atom)?),
        Format::MsgPack => {
            rmp_serde::to_vec(atom).map_err(|e| Error::corruption(format!("msgpack encode: {e}")))
        }
    }
}

/// Deserialize an atom's fields from a frame payload of the given format.
pub fn decode_atom_payload(format: Format, bytes: &[u8]) -> Result<Atom> {
    match format {
        Format::Raw => Err(Error::corruption(
            "cannot decode a RAW frame as a structured atom",
        )),
        Format::JsonUtf8 => Ok(serde_json::from_slice(bytes)?),
        Format::MsgPack => rmp_serde::from_slice(bytes)
            .map_err(|e| Error::corruption(format!("msgpack decode: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_all_formats() {
        for (format, payload) in [
            (Format::Raw, b"opaque".to_vec()),
            (Format::JsonUtf8, br#"{"x":1}"#.to_vec()),
            (Format::MsgPack, vec![0x81, 0xa1, b'x', 0x01]),
        ] {
            let encoded = encode_frame(format, &payload);
            let mut cursor = Cursor::new(encoded);
            let decoded = read_frame(&mut cursor).unwrap();
            assert_eq!(decoded.format, format);
            assert_eq!(decoded.bytes, payload);
        }
    }

    #[test]
    fn legacy_frame_without_format_byte_decodes_as_json() {
        let payload = br#"{"x":1}"#;
        let mut buf = Vec::new();
        buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        buf.extend_from_slice(payload);
        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).unwrap();
        assert_eq!(decoded.format, Format::JsonUtf8);
        assert_eq!(decoded.bytes, payload);
    }
}
