//! Wire format of the id/sequence application header.
//!
//! ```text
//! IdSeqHeader (16 bytes)
//! ┌──────────────┬──────────────┐
//! │ id  u64 BE   │ seq u64 BE   │
//! └──────────────┴──────────────┘
//!
//! IdSeqBierHeader (32 bytes)
//! ┌──────────────┬──────────────┬────────┬────────┬────────┬────────┐
//! │ id  u64 BE   │ seq u64 BE   │ w0 LE  │ w1 LE  │ w2 LE  │ w3 LE  │
//! └──────────────┴──────────────┴────────┴────────┴────────┴────────┘
//! ```

use crate::{Bitstring, BITSTRING_WORDS};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

fn ensure(buf: &impl Buf, needed: usize) -> Result<(), HeaderError> {
    if buf.remaining() < needed {
        return Err(HeaderError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

/// Request id and per-request sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdSeqHeader {
    pub id: u64,
    pub seq: u64,
}

impl IdSeqHeader {
    pub const SIZE: usize = 16;

    pub fn new(id: u64, seq: u64) -> Self {
        Self { id, seq }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.id);
        buf.put_u64(self.seq);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, HeaderError> {
        ensure(buf, Self::SIZE)?;
        Ok(Self {
            id: buf.get_u64(),
            seq: buf.get_u64(),
        })
    }
}

/// [`IdSeqHeader`] followed by the BIER bitstring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdSeqBierHeader {
    pub id: u64,
    pub seq: u64,
    pub bitstring: Bitstring,
}

impl IdSeqBierHeader {
    pub const SIZE: usize = IdSeqHeader::SIZE + 4 * BITSTRING_WORDS;

    pub fn new(id: u64, seq: u64, bitstring: Bitstring) -> Self {
        Self { id, seq, bitstring }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.id);
        buf.put_u64(self.seq);
        for word in self.bitstring.words() {
            buf.put_u32_le(word);
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, HeaderError> {
        ensure(buf, Self::SIZE)?;
        let id = buf.get_u64();
        let seq = buf.get_u64();
        let mut words = [0u32; BITSTRING_WORDS];
        for word in &mut words {
            *word = buf.get_u32_le();
        }
        Ok(Self {
            id,
            seq,
            bitstring: Bitstring::from_words(words),
        })
    }

    /// Same header carrying a different bitstring.
    pub fn with_bitstring(self, bitstring: Bitstring) -> Self {
        Self { bitstring, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_seq_layout() {
        let bytes = IdSeqHeader::new(1, 0x0203).to_bytes();
        assert_eq!(
            &bytes[..],
            &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0x02, 0x03]
        );
    }

    #[test]
    fn test_bier_words_are_little_endian() {
        let header = IdSeqBierHeader::new(0, 0, Bitstring::from_words([0x0102_0304, 0, 0, 1]));
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), IdSeqBierHeader::SIZE);
        assert_eq!(&bytes[16..20], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[28..32], &[1, 0, 0, 0]);

        let decoded = IdSeqBierHeader::decode(&mut bytes.clone()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_truncated_input() {
        let mut short = Bytes::from_static(&[0u8; 20]);
        assert_eq!(
            IdSeqBierHeader::decode(&mut short),
            Err(HeaderError::Truncated {
                needed: 32,
                available: 20
            })
        );
        let mut empty = Bytes::new();
        assert!(IdSeqHeader::decode(&mut empty).is_err());
    }
}
