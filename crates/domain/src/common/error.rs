use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("entry not found: {0}")]
    RuleNotFound(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("engine error: {0}")]
    EngineError(String),
}
