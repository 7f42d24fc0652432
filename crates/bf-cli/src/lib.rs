//! botfleet: Operator CLI for the botfleet orchestrator
//!
//! Talks to a running orchestrator over its HTTP API to show fleet
//! status and to create, update and delete bots.

pub mod client;
pub mod commands;
pub mod output;
