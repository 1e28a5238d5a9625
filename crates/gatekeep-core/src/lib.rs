//! # Gatekeep Core - Permission Evaluation Engine
//!
//! Answers "may subject S perform relation R on object O?" by walking the
//! tuple graph: direct grants, the static permission hierarchy, and userset
//! expansion, with cycle and depth protection.

pub mod checker;
pub mod hierarchy;

pub use checker::{Checker, CheckerConfig};
pub use hierarchy::PermissionHierarchy;
