//! Minimal STUN (RFC 5389) binding codec
//!
//! Only what a public-address lookup needs: encode a Binding Request with no
//! attributes, decode a Binding response and pull out the mapped address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// STUN magic cookie (0x2112A442)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// STUN message header size (20 bytes)
const HEADER_SIZE: usize = 20;

const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS: u16 = 0x0101;
const BINDING_ERROR: u16 = 0x0111;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_ERROR_CODE: u16 = 0x0009;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// 96-bit transaction identifier
pub type TransactionId = [u8; 12];

/// STUN decoding failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("message too short ({0} bytes)")]
    TooShort(usize),

    #[error("invalid magic cookie {0:#010x}")]
    InvalidMagicCookie(u32),

    #[error("transaction id mismatch")]
    TransactionMismatch,

    #[error("unexpected message type {0:#06x}")]
    UnexpectedType(u16),

    #[error("server returned error {0}")]
    ErrorResponse(u16),

    #[error("malformed attribute {0:#06x}")]
    MalformedAttribute(u16),

    #[error("response carries no mapped address")]
    MissingMappedAddress,
}

/// Fresh random transaction id
pub fn transaction_id() -> TransactionId {
    use rand::RngCore;

    let mut id = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut id);
    id
}

/// Encode a Binding Request without attributes
pub fn encode_binding_request(transaction_id: &TransactionId) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE);
    bytes.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    bytes.extend_from_slice(transaction_id);
    bytes
}

/// Decode a Binding response to `transaction_id`
///
/// XOR-MAPPED-ADDRESS wins over MAPPED-ADDRESS when both are present.
pub fn decode_binding_response(
    bytes: &[u8],
    transaction_id: &TransactionId,
) -> Result<IpAddr, CodecError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::TooShort(bytes.len()));
    }

    let message_type = u16::from_be_bytes([bytes[0], bytes[1]]);
    let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let cookie = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    if cookie != MAGIC_COOKIE {
        return Err(CodecError::InvalidMagicCookie(cookie));
    }
    if bytes[8..HEADER_SIZE] != transaction_id[..] {
        return Err(CodecError::TransactionMismatch);
    }

    let end = HEADER_SIZE.saturating_add(length).min(bytes.len());
    let attributes = &bytes[HEADER_SIZE..end];

    match message_type {
        BINDING_SUCCESS => {}
        BINDING_ERROR => {
            let code = find_attribute(attributes, ATTR_ERROR_CODE)
                .and_then(error_code)
                .unwrap_or(0);
            return Err(CodecError::ErrorResponse(code));
        }
        other => return Err(CodecError::UnexpectedType(other)),
    }

    if let Some(value) = find_attribute(attributes, ATTR_XOR_MAPPED_ADDRESS) {
        return decode_address(value, Some(transaction_id))
            .ok_or(CodecError::MalformedAttribute(ATTR_XOR_MAPPED_ADDRESS));
    }
    if let Some(value) = find_attribute(attributes, ATTR_MAPPED_ADDRESS) {
        return decode_address(value, None)
            .ok_or(CodecError::MalformedAttribute(ATTR_MAPPED_ADDRESS));
    }
    Err(CodecError::MissingMappedAddress)
}

/// First attribute of `kind`, walking TLVs padded to 4 bytes
fn find_attribute(mut attributes: &[u8], kind: u16) -> Option<&[u8]> {
    while attributes.len() >= 4 {
        let attr_type = u16::from_be_bytes([attributes[0], attributes[1]]);
        let attr_length = u16::from_be_bytes([attributes[2], attributes[3]]) as usize;
        let value = attributes.get(4..4 + attr_length)?;

        if attr_type == kind {
            return Some(value);
        }

        let padded = (attr_length + 3) & !3;
        attributes = attributes.get(4 + padded..).unwrap_or(&[]);
    }
    None
}

/// Decode a (XOR-)MAPPED-ADDRESS value; the port is ignored
fn decode_address(value: &[u8], xor_with: Option<&TransactionId>) -> Option<IpAddr> {
    let family = *value.get(1)?;
    let cookie = MAGIC_COOKIE.to_be_bytes();

    match family {
        FAMILY_IPV4 => {
            let mut octets: [u8; 4] = value.get(4..8)?.try_into().ok()?;
            if xor_with.is_some() {
                for (byte, key) in octets.iter_mut().zip(cookie) {
                    *byte ^= key;
                }
            }
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        FAMILY_IPV6 => {
            let mut octets: [u8; 16] = value.get(4..20)?.try_into().ok()?;
            if let Some(transaction_id) = xor_with {
                let key = cookie.iter().chain(transaction_id.iter());
                for (byte, key) in octets.iter_mut().zip(key) {
                    *byte ^= key;
                }
            }
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

fn error_code(value: &[u8]) -> Option<u16> {
    let class = u16::from(*value.get(2)? & 0x07);
    let number = u16::from(*value.get(3)?);
    Some(class * 100 + number)
}
