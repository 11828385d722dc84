//! Database adapters.
//!
//! Adapters implement [`nestql_core::Database`], the collaborator behind the
//! terminal stage of every command pipeline.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryDatabase;
