//! Built-in provider implementations

pub mod memory;

pub use memory::{InMemoryProvider, MemoryProviderFactory};
