pub mod loopback;
pub mod memory;

pub use loopback::{LoopbackPair, LoopbackTransport};
pub use memory::{MemoryLightningNetwork, MemoryLightningNode};
