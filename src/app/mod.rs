//! Application core: command handlers and the main-loop body.
//!
//! Interaction with hardware happens only through the **port traits** in
//! [`ports`], so this layer runs unchanged on the host under test.

pub mod commands;
pub mod ports;
pub mod service;
