/// Payment request decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("payment request is empty")]
    Empty,

    #[error("payment request is too short: decodes to {actual} bytes, need at least {required}")]
    TooShort { actual: usize, required: usize },

    #[error("payment request is corrupted at position {position}: invalid symbol {symbol:?}")]
    InvalidSymbol { symbol: char, position: usize },

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    Checksum { expected: u32, computed: u32 },
}

impl CodecError {
    /// Whether the input was structurally malformed (as opposed to carrying
    /// a bad checksum).
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Checksum { .. })
    }
}
