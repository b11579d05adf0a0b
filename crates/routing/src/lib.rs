//! Routing controller: every cross-agent handoff
//!
//! Tool calls arrive from the active agent's model as loose name/argument
//! payloads; they are reified into the sealed [`RoutingTool`] set and
//! dispatched in one step. In-session transitions return a
//! `(new agent, transition sentence)` tuple; the English route dispatches
//! the realtime worker out-of-process and drains the pipeline session on a
//! timer instead.

pub mod controller;
pub mod tools;

pub use controller::RoutingController;
pub use tools::RoutingTool;
