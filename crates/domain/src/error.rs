/// Shared error type used across all ConvMonitor crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// Unparseable or incomplete bus payload — drop, log, continue.
    #[error("malformed segment: {0}")]
    Malformed(String),

    /// Segment store persistence failure.
    #[error("store: {0}")]
    Store(String),

    /// Transport-level failure talking to the analysis agent.
    #[error("agent unreachable: {0}")]
    AgentUnreachable(String),

    /// Non-2xx response from the analysis agent.
    #[error("agent rejected ({status}): {body}")]
    AgentRejected { status: u16, body: String },

    #[error("bus: {0}")]
    Bus(String),

    /// Unparseable configuration document. The load path downgrades
    /// this to a warning and falls back to defaults.
    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
