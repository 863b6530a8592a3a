//! End-to-end fixtures for whole-grid scenarios: a simulated wire
//! transport, a memory-backed deployment SPI, and the wiring that
//! composes the cluster core with the deployment store the way a real
//! node does.

pub mod fixtures;

pub use fixtures::{GridFixture, MemoryLoader, MemorySpi, SimTransport, TopologyAdapter};
