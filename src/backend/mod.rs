//! Device abstraction: descriptor value types, the [`RenderDevice`]
//! trait the pools and executor drive, and a headless recording device.

pub mod null;
pub mod traits;
pub mod types;

pub use null::{NullDevice, ObjectKind};
pub use traits::*;
pub use types::*;
