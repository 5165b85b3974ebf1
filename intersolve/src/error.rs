use thiserror::Error;

use crate::data_objects::ApiError;

#[derive(Debug, Clone, Error)]
pub enum IntersolveError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Provider configuration is incomplete: {0}")]
    Configuration(String),
    /// The provider explicitly rejected the request. The code and description are carried verbatim
    /// so operators can diagnose the rejection.
    #[error("{code}: {description}")]
    Validation { code: String, description: String },
    /// Network error, timeout, or a 5xx response. Eligible for automatic retry.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    /// The provider reported success but the response was missing an expected field. Treated as a
    /// bug signal rather than a provider rejection.
    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),
}

impl IntersolveError {
    pub fn from_errors(errors: &[ApiError], status: u16, status_text: &str) -> Self {
        if errors.is_empty() {
            IntersolveError::Validation {
                code: status.to_string(),
                description: status_text.to_string(),
            }
        } else {
            IntersolveError::Validation {
                code: errors[0].code.clone(),
                description: errors_to_message(errors),
            }
        }
    }

    /// True for errors worth retrying automatically (the provider may recover on its own).
    pub fn is_retryable(&self) -> bool {
        matches!(self, IntersolveError::Unavailable(_))
    }
}

/// Formats a provider error list into a single operator-facing message, one error per line.
pub fn errors_to_message(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(|e| match &e.field {
            Some(field) => format!("{}: {} Field: {field}", e.code, e.description),
            None => format!("{}: {}", e.code, e.description),
        })
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_list_formatting() {
        let errors = vec![
            ApiError {
                code: "NOT_FOUND".to_string(),
                field: Some("lastName".to_string()),
                description: "Customer could not be found".to_string(),
            },
            ApiError { code: "INVALID".to_string(), field: None, description: "Bad request".to_string() },
        ];
        let msg = errors_to_message(&errors);
        assert_eq!(msg, "NOT_FOUND: Customer could not be found Field: lastName\nINVALID: Bad request");
    }

    #[test]
    fn fallback_to_status_when_no_errors() {
        let e = IntersolveError::from_errors(&[], 404, "NOT_FOUND");
        assert_eq!(e.to_string(), "404: NOT_FOUND");
    }
}
