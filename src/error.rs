use sea_orm::DbErr;

pub type SimResult<T> = Result<T, SimError>;

#[derive(thiserror::Error, Debug)]
pub enum SimError {
    /// Malformed recipe, range or sweep config. Raised before any job exists.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Predictor or scorer failed while a backtest was running.
    #[error("execution failed: {message}")]
    Execution { message: String, detail: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] DbErr),

    #[error("simulation cancelled")]
    Cancelled,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn execution(err: &anyhow::Error) -> Self {
        Self::Execution {
            message: format!("{err:#}"),
            detail: format!("{err:?}"),
        }
    }

    pub fn not_found(entity: &'static str, id: i32) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Text stored on a failed job: (message, detail).
    pub fn failure_text(&self) -> (String, String) {
        match self {
            Self::Execution { message, detail } => (message.clone(), detail.clone()),
            other => (other.to_string(), format!("{other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_keeps_cause_chain() {
        let err = anyhow::anyhow!("window empty").context("predictor failed at contest 7");
        let sim = SimError::execution(&err);
        let (message, detail) = sim.failure_text();
        assert_eq!(message, "predictor failed at contest 7: window empty");
        assert!(detail.contains("window empty"));
        assert!(!sim.is_cancelled());
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(SimError::Cancelled.is_cancelled());
        assert!(!SimError::validation("x").is_cancelled());
    }
}
