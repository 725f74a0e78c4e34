//! Application-level orchestration.
//!
//! The controller owns process supervision and the query client. UI layers send
//! it commands and render the events it emits, so no UI code touches a child
//! process or an HTTP connection directly.

mod chat;
mod controller;

pub(crate) use chat::reply_messages;
pub(crate) use controller::{run_controller, ControllerSetup, UiCommand};
