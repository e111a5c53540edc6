//! Wire codec for the 10-byte RDP header.
//!
//! Layout, in wire order, each multi-byte field little-endian:
//! `type(1) sequence_number(2) ack_number(2) payload_size(2) window_size(2) 0x0A(1)`.
//! The final byte is a framing marker only; it carries no information and
//! is ignored on decode.

use crate::err::{Error, Result};

pub const HEADER_LEN: usize = 10;

pub const TYPE_DAT: u8 = 1;
pub const TYPE_ACK: u8 = 2;
pub const TYPE_SYN: u8 = 4;
pub const TYPE_FIN: u8 = 8;
pub const TYPE_RST: u8 = 16;

const FRAMING_BYTE: u8 = 0x0A;

/// Mutually coherent combinations of header flags.
const VALID_COMBINATIONS: [u8; 7] = [
    TYPE_SYN,
    TYPE_SYN | TYPE_ACK,
    TYPE_ACK,
    TYPE_DAT,
    TYPE_DAT | TYPE_ACK,
    TYPE_FIN,
    TYPE_FIN | TYPE_ACK,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: u8,
    pub sequence_number: u16,
    pub ack_number: u16,
    pub payload_size: u16,
    pub window_size: u16,
}

impl Header {
    pub fn is_dat(&self) -> bool {
        self.kind & TYPE_DAT != 0
    }

    pub fn is_ack(&self) -> bool {
        self.kind & TYPE_ACK != 0
    }

    pub fn is_syn(&self) -> bool {
        self.kind & TYPE_SYN != 0
    }

    pub fn is_fin(&self) -> bool {
        self.kind & TYPE_FIN != 0
    }

    pub fn is_rst(&self) -> bool {
        self.kind & TYPE_RST != 0
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            TYPE_ACK => "ACK",
            k if k == TYPE_SYN | TYPE_ACK => "SYN/ACK",
            TYPE_SYN => "SYN",
            TYPE_DAT => "DAT",
            k if k == TYPE_DAT | TYPE_ACK => "DAT/ACK",
            TYPE_FIN => "FIN",
            k if k == TYPE_FIN | TYPE_ACK => "FIN/ACK",
            _ => "UNK",
        }
    }

    fn validate(&self) -> Result<()> {
        if !VALID_COMBINATIONS.contains(&self.kind) {
            return Err(Error::InvalidFlags(self.kind));
        }
        // Invariant: payload_size > 0 iff the DAT flag is set.
        if self.is_dat() != (self.payload_size > 0) {
            return Err(Error::InvalidFlags(self.kind));
        }
        Ok(())
    }
}

/// Serialize `header` followed by `payload` into a fresh buffer.
///
/// Byte 9 of the header is always overwritten with the newline framing
/// marker, regardless of what is passed in `header`.
pub fn encode(header: &Header, payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(header.payload_size as usize, payload.len());

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(header.kind);
    buf.extend_from_slice(&header.sequence_number.to_le_bytes());
    buf.extend_from_slice(&header.ack_number.to_le_bytes());
    buf.extend_from_slice(&header.payload_size.to_le_bytes());
    buf.extend_from_slice(&header.window_size.to_le_bytes());
    buf.push(FRAMING_BYTE);
    buf.extend_from_slice(payload);
    buf
}

/// Decode one packet from the front of `buf`.
///
/// Returns the header, a slice of the payload, and the number of bytes
/// consumed from `buf` (`HEADER_LEN + payload_size`). Fails with
/// `ShortBuffer` when `buf` holds fewer bytes than the packet it claims
/// to contain; the caller should retain `buf` and retry once more bytes
/// arrive.
pub fn decode(buf: &[u8]) -> Result<(Header, &[u8], usize)> {
    if buf.len() < HEADER_LEN {
        return Err(Error::ShortBuffer);
    }

    let kind = buf[0];
    let sequence_number = u16::from_le_bytes([buf[1], buf[2]]);
    let ack_number = u16::from_le_bytes([buf[3], buf[4]]);
    let payload_size = u16::from_le_bytes([buf[5], buf[6]]);
    let window_size = u16::from_le_bytes([buf[7], buf[8]]);

    let consumed = HEADER_LEN + payload_size as usize;
    if buf.len() < consumed {
        return Err(Error::ShortBuffer);
    }

    let header = Header {
        kind,
        sequence_number,
        ack_number,
        payload_size,
        window_size,
    };
    header.validate()?;

    Ok((header, &buf[HEADER_LEN..consumed], consumed))
}
