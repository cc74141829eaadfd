//! Configuration loaded from `.chronovault.toml`.

pub mod settings;

pub use settings::{ProviderConfig, Settings};
