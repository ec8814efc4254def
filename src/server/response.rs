//! JSON envelope shared by every API route.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ServiceError;

/// `{error?, response?, data?}`; absent parts are omitted from the body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<R: Serialize, D: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<D>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub text: String,
}

/// Outcome summary, e.g. `{"login": ...}` or `{"success": true}`.
pub fn respond<R: Serialize>(response: R) -> Response {
    Json(ApiResponse::<R, ()> {
        error: None,
        response: Some(response),
        data: None,
    })
    .into_response()
}

/// Payload, e.g. a document or a list of them.
pub fn data<D: Serialize>(data: D) -> Response {
    Json(ApiResponse::<(), D> {
        error: None,
        response: None,
        data: Some(data),
    })
    .into_response()
}

fn status_of(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        let body = ApiResponse::<(), ()> {
            error: Some(ErrorBody {
                code: status.as_u16(),
                text: self.message().to_string(),
            }),
            response: None,
            data: None,
        };
        (status, Json(body)).into_response()
    }
}
