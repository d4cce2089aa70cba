//! Client for the downstream analysis agent.
//!
//! The agent exposes two endpoints: `POST /createSession` to open a new
//! analysis session and `POST /chat` to continue one. [`AgentProvider`]
//! abstracts that surface; [`RestAgentClient`] is the real HTTP
//! implementation and [`AgentSessionRouter`] maps correlation keys to the
//! agent's own session handles so each logical conversation is created
//! downstream exactly once and continued thereafter.

mod provider;
mod rest;
mod router;
mod transcript;
mod types;

pub use provider::AgentProvider;
pub use rest::RestAgentClient;
pub use router::{AgentSessionRouter, ForwardReply};
pub use transcript::format_transcript;
pub use types::{ChatRequest, CreateSessionRequest, CreateSessionResponse};
