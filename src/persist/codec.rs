//! Little-endian binary framing.
//!
//! Every binary record is a fixed header followed by the payload:
//!
//! | bytes | field                                   |
//! |-------|-----------------------------------------|
//! | 4     | magic `AEVO`                            |
//! | 2     | format version                          |
//! | 1     | record kind                             |
//! | 1     | flags (reserved, zero)                  |
//! | 8     | write time, ms since the Unix epoch     |
//! | 8     | payload length                          |
//! | 4     | CRC-32 of the payload                   |
//!
//! The payload itself is bincode over the record's serde form.
use crate::error::{EvoError, Result};
use chrono::Utc;

pub const MAGIC: [u8; 4] = *b"AEVO";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Genome = 1,
    Population = 2,
    MetaPopulation = 3,
    Checkpoint = 4,
}

impl RecordKind {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordKind::Genome),
            2 => Ok(RecordKind::Population),
            3 => Ok(RecordKind::MetaPopulation),
            4 => Ok(RecordKind::Checkpoint),
            other => Err(EvoError::Corrupt(format!("unknown record kind {}", other))),
        }
    }
}

/// CRC-32 (IEEE 802.3, reflected).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}

fn le_bytes<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

pub fn encode_frame(kind: RecordKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(kind as u8);
    out.push(0);
    out.extend_from_slice(&Utc::now().timestamp_millis().to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&crc32(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Checks the header and checksum, returning the payload.
pub fn decode_frame(bytes: &[u8], expected: RecordKind) -> Result<&[u8]> {
    if bytes.len() < HEADER_LEN {
        return Err(EvoError::Corrupt(format!(
            "{} bytes is shorter than the {}-byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }
    if bytes[..4] != MAGIC {
        return Err(EvoError::Corrupt("bad magic".to_string()));
    }
    let version = u16::from_le_bytes(le_bytes(bytes, 4));
    if version == 0 || version > FORMAT_VERSION {
        return Err(EvoError::Corrupt(format!("unsupported format version {}", version)));
    }
    let kind = RecordKind::from_u8(bytes[6])?;
    if kind != expected {
        return Err(EvoError::Corrupt(format!("expected a {:?} record, found {:?}", expected, kind)));
    }
    // bytes[7] holds the flags, bytes[8..16] the write time
    let len = u64::from_le_bytes(le_bytes(bytes, 16));
    let checksum = u32::from_le_bytes(le_bytes(bytes, 24));

    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != len {
        return Err(EvoError::Corrupt(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            len
        )));
    }
    if crc32(payload) != checksum {
        return Err(EvoError::Corrupt("checksum mismatch".to_string()));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_frame_detects_damage() {
        let framed = encode_frame(RecordKind::Genome, b"payload");
        assert_eq!(&framed[..4], b"AEVO");
        assert_eq!(decode_frame(&framed, RecordKind::Genome).unwrap(), b"payload");

        let mut flipped = framed.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0x01;
        assert!(matches!(decode_frame(&flipped, RecordKind::Genome), Err(EvoError::Corrupt(_))));

        assert!(matches!(
            decode_frame(&framed[..framed.len() - 2], RecordKind::Genome),
            Err(EvoError::Corrupt(_))
        ));
        assert!(matches!(
            decode_frame(&framed, RecordKind::Population),
            Err(EvoError::Corrupt(_))
        ));
        assert!(matches!(decode_frame(b"AEVO", RecordKind::Genome), Err(EvoError::Corrupt(_))));
    }
}
