//! Compact lnd payment request codec.
//!
//! Layout after z-base-32 decoding:
//!
//! | bytes  | field                                  |
//! |--------|----------------------------------------|
//! | 0..33  | destination node public key            |
//! | 33..65 | payment hash                           |
//! | 65..73 | amount, big-endian u64 (satoshis)      |
//! | 73..77 | CRC32C of bytes 0..73, big-endian      |
//!
//! Bytes past the checksum are ignored.

use lnsettle_core::types::{NodePubKey, PaymentHash};

use crate::error::CodecError;
use crate::zbase32;

pub const DESTINATION_LEN: usize = 33;
pub const PAYMENT_HASH_LEN: usize = 32;
pub const AMOUNT_LEN: usize = 8;
pub const CRC_LEN: usize = 4;
/// Length of the checksummed part.
pub const INVOICE_LEN: usize = DESTINATION_LEN + PAYMENT_HASH_LEN + AMOUNT_LEN;
/// Minimum decoded length of a valid request.
pub const TOTAL_LEN: usize = INVOICE_LEN + CRC_LEN;

/// The fields of a decoded payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentRequest {
    pub destination: NodePubKey,
    pub payment_hash: PaymentHash,
    /// Amount in satoshis.
    pub amount: u64,
}

impl PaymentRequest {
    /// Decode and validate an encoded payment request.
    ///
    /// The length is checked from the symbol count before any symbol is
    /// inspected, so short input always fails with [`CodecError::TooShort`].
    pub fn decode(request: &str) -> Result<Self, CodecError> {
        if request.is_empty() {
            return Err(CodecError::Empty);
        }
        let available = zbase32::decoded_len_exact(request.chars().count());
        if available < TOTAL_LEN {
            return Err(CodecError::TooShort {
                actual: available,
                required: TOTAL_LEN,
            });
        }

        let decoded = zbase32::decode(request)?;
        let invoice = &decoded[..INVOICE_LEN];
        let crc = &decoded[INVOICE_LEN..TOTAL_LEN];

        let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let computed = crc32c::crc32c(invoice);
        if expected != computed {
            tracing::debug!(expected, computed, "payment request checksum mismatch");
            return Err(CodecError::Checksum { expected, computed });
        }

        let mut destination = [0u8; DESTINATION_LEN];
        destination.copy_from_slice(&invoice[..DESTINATION_LEN]);
        let mut payment_hash = [0u8; PAYMENT_HASH_LEN];
        payment_hash.copy_from_slice(&invoice[DESTINATION_LEN..DESTINATION_LEN + PAYMENT_HASH_LEN]);
        let mut amount = [0u8; AMOUNT_LEN];
        amount.copy_from_slice(&invoice[DESTINATION_LEN + PAYMENT_HASH_LEN..]);

        Ok(Self {
            destination: NodePubKey(destination),
            payment_hash: PaymentHash(payment_hash),
            amount: u64::from_be_bytes(amount),
        })
    }

    /// Raw bytes including the trailing checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(TOTAL_LEN);
        bytes.extend_from_slice(self.destination.as_bytes());
        bytes.extend_from_slice(self.payment_hash.as_bytes());
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        let crc = crc32c::crc32c(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        bytes
    }

    /// Encode into the z-base-32 wire form.
    pub fn encode(&self) -> String {
        zbase32::encode(&self.to_bytes())
    }
}
