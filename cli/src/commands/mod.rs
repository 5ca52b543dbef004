//! Command implementations

pub mod deploy;
pub mod list;
pub mod verify;
pub mod version;
