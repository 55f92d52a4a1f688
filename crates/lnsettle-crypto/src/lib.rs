pub mod error;
pub mod hashing;
pub mod zbase32;
pub mod payreq;

pub use error::CodecError;
pub use hashing::{
    condition_of, fulfillment_matches, payment_hash_of, random_fulfillment, random_preimage,
    sha256,
};
pub use payreq::PaymentRequest;
