//! Subcommand implementations.

pub mod clear;
pub mod index;
pub mod list;
pub mod show;
pub mod status;
pub mod touch;
