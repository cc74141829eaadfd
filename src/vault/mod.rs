//! Vault module: the durable, integrity-protected metadata store.
//!
//! This module provides:
//! - `FileEntry` and `Listing` types (`entry`)
//! - The on-disk header and index formats with atomic writes (`format`)
//! - Name sanitizing and the collision suffix policy (`naming`)
//! - `VaultStore`, the authenticated session on a vault (`store`)

pub mod entry;
pub mod format;
pub mod naming;
pub mod store;

// Re-export the most commonly used items.
pub use entry::{FileEntry, Listing};
pub use format::VaultHeader;
pub use store::VaultStore;
