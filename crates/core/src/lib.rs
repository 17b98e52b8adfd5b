//! Core types, visitor identity, and device context for the experimentation engine.

pub mod clock;
pub mod device;
pub mod error;
pub mod events;
pub mod experiment;
pub mod hash;
pub mod page;
pub mod session;
pub mod storage;

pub use clock::*;
pub use device::*;
pub use error::{Error, Result};
pub use events::*;
pub use experiment::*;
pub use page::*;
pub use session::*;
pub use storage::*;
