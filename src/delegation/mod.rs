mod client;
mod config;
mod error;
mod service;

pub use client::LocalAgentClient;
pub use config::DelegationConfig;
pub use service::{forward_pass_summaries, DelegationService};
