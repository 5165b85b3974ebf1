use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use disbursement_engine::OrchestrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Could not render voucher image. {0}")]
    ImageRenderError(String),
    #[error("{0}")]
    OrchestrationError(#[from] OrchestrationError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ImageRenderError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::OrchestrationError(e) => match e {
                OrchestrationError::RegistrationNotFound(_)
                | OrchestrationError::NoCustomerYet(_)
                | OrchestrationError::NoWalletAvailable(_)
                | OrchestrationError::VoucherNotFound => StatusCode::NOT_FOUND,
                OrchestrationError::WrongProvider(_, _) | OrchestrationError::Attribute(_) => {
                    StatusCode::BAD_REQUEST
                },
                OrchestrationError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
                OrchestrationError::Storage(e) => match e {
                    disbursement_engine::traits::StorageError::WalletNotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                },
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use disbursement_engine::db_types::ReferenceId;

    #[test]
    fn orchestration_errors_map_to_sensible_statuses() {
        let e = ServerError::from(OrchestrationError::RegistrationNotFound(ReferenceId::from("R1")));
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        let e = ServerError::from(OrchestrationError::ProviderUnavailable("LOAD BALANCE ERROR".to_string()));
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
        let e = ServerError::from(OrchestrationError::ReissueUnloadFailed);
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
