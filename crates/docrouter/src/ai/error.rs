use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Invalid AI endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Could not connect to AI service at {0}")]
    Connection(String),

    #[error("AI request timed out after {0}s")]
    Timeout(u64),

    #[error("AI request failed: {0}")]
    Http(String),

    #[error("AI service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),
}
