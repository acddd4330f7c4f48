use crate::repository::StoreError;

/// Domain error taxonomy. Authorization and precondition failures name the
/// unmet condition with a machine-checkable string; referential absence is
/// reported distinctly; store failures carry the underlying message.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("precondition failed: {condition}")]
    Precondition { condition: &'static str },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("store failure: {0}")]
    Store(String),
}

impl DomainError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized { reason: reason.into() }
    }

    pub fn precondition(condition: &'static str) -> Self {
        Self::Precondition { condition }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable code string surfaced in the response envelope.
    pub fn code(&self) -> String {
        match self {
            DomainError::Unauthorized { .. } => "unauthorized".to_string(),
            DomainError::Precondition { condition } => format!("precondition:{condition}"),
            DomainError::NotFound { entity, .. } => format!("not_found:{entity}"),
            DomainError::Store(_) => "store_failure".to_string(),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        DomainError::Store(e.to_string())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Operation payload plus non-fatal warnings accumulated by best-effort side
/// effects (audit-log appends, notification intents). Warnings never fail
/// the operation; they surface in the response envelope.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}
