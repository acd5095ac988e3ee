use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;
use viewing_payment_engine::PaymentGatewayError;

use crate::providers::ProviderError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Webhook signature invalid or not provided")]
    InvalidSignature,
    #[error("Could not read webhook payload: {0}")]
    InvalidPayload(String),
    #[error("Unsupported payment provider: {0}")]
    UnsupportedProvider(String),
    #[error("Upstream provider call failed. {0}")]
    ProviderError(#[from] ProviderError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
            Self::ProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::TransactionNotFound(_)
            | PaymentGatewayError::ProviderTxIdNotFound(_)
            | PaymentGatewayError::ReservationNotFound(_) => Self::NoRecordFound(e.to_string()),
            PaymentGatewayError::DatabaseError(_)
            | PaymentGatewayError::InvalidStateTransition { .. }
            | PaymentGatewayError::CreditInvariantViolation(_) => Self::BackendError(e.to_string()),
        }
    }
}
