use thiserror::Error;

use crate::domain::purchase::UserId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Fewer dated purchases than an interval needs. Estimators absorb this by
    /// omitting the pair.
    #[error("insufficient purchase history for {user_id} / `{product_name}`: {purchases} purchase(s)")]
    InsufficientHistory { user_id: UserId, product_name: String, purchases: usize },
    #[error("could not resolve a product category from `{query}`")]
    AmbiguousQuery { query: String, candidates: Vec<String> },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn clarification(&self) -> Option<String> {
        match self {
            Self::AmbiguousQuery { candidates, .. } if candidates.is_empty() => Some(
                "Please specify what product you're looking for. Try: 'Suggest brands for cola'"
                    .to_string(),
            ),
            Self::AmbiguousQuery { candidates, .. } => Some(format!(
                "Your request matches several categories: {}. Which one did you mean?",
                candidates.join(", ")
            )),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("data load failure: {0}")]
    DataLoad(String),
    #[error("ai capability unavailable: {0}")]
    AiUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                let message = error.clarification().unwrap_or_else(|| error.to_string());
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::AiUnavailable(message) | ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::DataLoad(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
