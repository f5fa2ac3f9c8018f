#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session stopped: {0}")]
    SessionStopped(String),

    #[error("Coordination failure: {0}")]
    Coordination(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing stream session.
    pub fn session_not_found(id: &str) -> Self {
        CoreError::NotFound {
            entity: "StreamSession",
            id: id.to_string(),
        }
    }
}
