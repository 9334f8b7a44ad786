//! Root-pointer on-disk record (spec.md §6.4): a small fixed-layout record,
//! `transaction_uuid: 16 bytes big-endian` followed by `offset: u64 big-endian`.
//! An absent file means an empty space.

use protobase_core::error::{Error, Result};
use protobase_core::pointer::AtomPointer;

/// Fixed on-disk size of an encoded root pointer.
pub const ENCODED_LEN: usize = 24;

/// Encode a root pointer into its fixed 24-byte layout.
pub fn encode(ptr: &AtomPointer) -> [u8; ENCODED_LEN] {
    let mut buf = [0u8; ENCODED_LEN];
    buf[0..16].copy_from_slice(ptr.transaction_id.as_bytes());
    buf[16..24].copy_from_slice(&ptr.offset.to_be_bytes());
    buf
}

/// Decode a root pointer from its fixed 24-byte layout.
pub fn decode(buf: &[u8]) -> Result<AtomPointer> {
    if buf.len() != ENCODED_LEN {
        return Err(Error::corruption(format!(
            "root pointer record has {} bytes, expected {}",
            buf.len(),
            ENCODED_LEN
        )));
    }
    let transaction_id = uuid::Uuid::from_slice(&buf[0..16])
        .map_err(|e| Error::corruption(format!("invalid root pointer uuid: {e}")))?;
    let offset = u64::from_be_bytes(buf[16..24].try_into().unwrap());
    Ok(AtomPointer {
        transaction_id,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ptr = AtomPointer::new(uuid::Uuid::new_v4(), 12345);
        let encoded = encode(&ptr);
        assert_eq!(decode(&encoded).unwrap(), ptr);
    }
}
