//! On-disk building blocks for the file-backed brook store.
//!
//! - `frame`: checksummed record envelope
//! - `layout`: where each brook's records live
//! - `fs`: create-if-absent / atomic replace primitives with fsync

pub mod error;
pub mod frame;
pub mod layout;
pub mod fs;

pub use error::{PersistenceError, Result};
pub use frame::{Frame, RecordKind};
pub use layout::BrookLayout;
