use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use spend_goals_core::gateway::GatewayError;

use crate::sync::SyncError;

/// `{success, data | error}` body shared by every goal endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orphaned_discount_ref: Option<String>,
}

impl ErrorBody {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            orphaned_discount_ref: None,
        }
    }
}

impl From<&SyncError> for ErrorBody {
    fn from(err: &SyncError) -> Self {
        let mut body = Self::new(err.kind(), err.to_string());
        match err {
            SyncError::Validation { field } => body.field = Some((*field).to_string()),
            SyncError::Gateway(GatewayError::ValidationRejected { field, .. }) => {
                body.field = field.clone();
            }
            SyncError::Persistence {
                orphaned_discount, ..
            } => body.orphaned_discount_ref = orphaned_discount.clone(),
            _ => {}
        }
        body
    }
}

/// Error half of a single-goal handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::new("bad_request", message),
        }
    }

    pub fn invalid_field(field: &str) -> Self {
        let mut body = ErrorBody::new("validation", format!("invalid value for {field}"));
        body.field = Some(field.to_string());
        Self {
            status: StatusCode::BAD_REQUEST,
            body,
        }
    }

    /// Clears the orphaned reference once the discount has been removed.
    pub fn without_orphan(mut self) -> Self {
        self.body.orphaned_discount_ref = None;
        self
    }

    pub fn into_body(self) -> ErrorBody {
        self.body
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::Validation { .. } => StatusCode::BAD_REQUEST,
            SyncError::Conflict { .. } => StatusCode::CONFLICT,
            SyncError::NotFound { .. } => StatusCode::NOT_FOUND,
            SyncError::Gateway(_) => StatusCode::BAD_GATEWAY,
            SyncError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorBody::from(&err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = Json(Envelope::<()>::failed(self.body)).into_response();
        *response.status_mut() = self.status;
        response
    }
}
