//! Request handlers for the public operations.

pub mod batch;
pub mod check;
pub mod debug;
pub mod read;
pub mod write;
