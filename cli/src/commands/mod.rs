//! Command implementations

pub mod build;
pub mod deploy;
pub mod down;
pub mod up;
