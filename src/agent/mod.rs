//! Client and server agents (§4.4, §4.5): the layer between the transaction state
//! machines and the core's dialog/event dispatch.

pub mod client_agent;
pub mod server_agent;

pub use client_agent::ClientAgent;
pub use server_agent::{Reception, ServerAgent};
