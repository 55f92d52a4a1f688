use lnsettle_core::types::{ExecutionCondition, Fulfillment, PaymentHash, Preimage};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// SHA-256 hash (32 bytes).
pub type Hash = [u8; 32];

/// Hash arbitrary data using single SHA-256.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// The payment hash a preimage commits to.
pub fn payment_hash_of(preimage: &Preimage) -> PaymentHash {
    PaymentHash(sha256(preimage.as_bytes()))
}

/// The execution condition a fulfillment unlocks.
pub fn condition_of(fulfillment: &Fulfillment) -> ExecutionCondition {
    ExecutionCondition(sha256(fulfillment.as_bytes()))
}

pub fn fulfillment_matches(fulfillment: &Fulfillment, condition: &ExecutionCondition) -> bool {
    condition_of(fulfillment) == *condition
}

/// Fresh random preimage from OS entropy.
pub fn random_preimage() -> Preimage {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Preimage(bytes)
}

/// Fresh random fulfillment from OS entropy.
pub fn random_fulfillment() -> Fulfillment {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Fulfillment(bytes)
}
