//! Shared value types used across the pathtracer engine crates.

mod types;

pub use types::{AssetName, EntityId, Transform};
