//! HTTP handlers.
//!
//! Request parameters ride in `x-` headers rather than paths, so exchange
//! ids and credentials never land in access logs or proxy caches. Part
//! bodies are raw bytes. Every error renders as `{error, code}` JSON with
//! one of the stable reason strings.

use crate::access::{AccessError, AccessMachine};
use crate::config::Config;
use crate::models::*;
use crate::store::StateRef;
use crate::transfer::{TransferError, TransferService};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use tracing::error;

// Header names, lowercase as they arrive over the wire.
const H_EXCHANGE_ID: &str = "x-exchange-id";
const H_RESPONSE_ID: &str = "x-response-id";
const H_PART_NUMBER: &str = "x-part-number";
const H_TOTAL_PARTS: &str = "x-total-parts";
const H_PARTS_PASSWORD: &str = "x-parts-password";
const H_PASSWORD: &str = "x-password";
const H_VIEW_ID: &str = "x-view-id";
const H_VIEW_PASSWORD: &str = "x-view-password";
const H_LAST_VIEW_ID: &str = "x-last-view-id";
const H_LAST_VIEW_PASSWORD: &str = "x-last-view-password";
const H_CONFIRMATION_CODE: &str = "x-confirmation-code";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub transfer: TransferService,
    pub access: AccessMachine,
    pub config: Config,
}

/// Error surface of every handler.
#[derive(Debug)]
pub enum ApiError {
    MissingHeader(&'static str),
    InvalidHeader(&'static str),
    Transfer(TransferError),
    Access(AccessError),
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        ApiError::Transfer(err)
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        ApiError::Access(err)
    }
}

fn transfer_code(err: &TransferError) -> (StatusCode, &'static str) {
    match err {
        TransferError::ExchangeNotFound => (StatusCode::NOT_FOUND, "EXCHANGE_NOT_FOUND"),
        TransferError::InvalidPartsPassword => (StatusCode::FORBIDDEN, "INVALID_PARTS_PASSWORD"),
        TransferError::AlreadyInitiated => (StatusCode::BAD_REQUEST, "ALREADY_INITIATED"),
        TransferError::UploadWindowElapsed => (StatusCode::BAD_REQUEST, "UPLOAD_WINDOW_ELAPSED"),
        TransferError::TooManyParts => (StatusCode::BAD_REQUEST, "TOO_MANY_PARTS"),
        TransferError::InvalidPartNumber => (StatusCode::BAD_REQUEST, "INVALID_PART_NUMBER"),
        TransferError::DataDeleted => (StatusCode::BAD_REQUEST, "DATA_DELETED"),
        TransferError::NotReady => (StatusCode::BAD_REQUEST, "NOT_READY"),
        TransferError::InvalidPassword => (StatusCode::FORBIDDEN, "INVALID_PASSWORD"),
        TransferError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

fn access_code(err: &AccessError) -> (StatusCode, &'static str) {
    match err {
        AccessError::ExchangeNotFound => (StatusCode::NOT_FOUND, "EXCHANGE_NOT_FOUND"),
        AccessError::NotReady => (StatusCode::BAD_REQUEST, "NOT_READY"),
        AccessError::ExchangeExpired => (StatusCode::BAD_REQUEST, "EXPIRED"),
        AccessError::DataDeleted => (StatusCode::BAD_REQUEST, "DATA_DELETED"),
        AccessError::NoViewsRemaining => (StatusCode::BAD_REQUEST, "NO_VIEWS_REMAINING"),
        AccessError::InvalidPassword => (StatusCode::FORBIDDEN, "INVALID_PASSWORD"),
        AccessError::ViewNotFound => (StatusCode::NOT_FOUND, "VIEW_NOT_FOUND"),
        AccessError::ViewClosed => (StatusCode::BAD_REQUEST, "VIEW_CLOSED"),
        AccessError::ViewExpired => (StatusCode::BAD_REQUEST, "VIEW_EXPIRED"),
        AccessError::ViewNotReady => (StatusCode::BAD_REQUEST, "VIEW_NOT_READY"),
        AccessError::InvalidViewPassword => (StatusCode::FORBIDDEN, "INVALID_VIEW_PASSWORD"),
        AccessError::InvalidPartNumber => (StatusCode::BAD_REQUEST, "INVALID_PART_NUMBER"),
        AccessError::InvalidConfirmationCode => {
            (StatusCode::FORBIDDEN, "INVALID_CONFIRMATION_CODE")
        }
        AccessError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::MissingHeader(name) => (
                StatusCode::BAD_REQUEST,
                "MISSING_HEADER",
                format!("Missing required header: {name}."),
            ),
            ApiError::InvalidHeader(name) => (
                StatusCode::BAD_REQUEST,
                "INVALID_HEADER",
                format!("Invalid header value: {name}."),
            ),
            ApiError::Transfer(err) => {
                let (status, code) = transfer_code(err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %err, "Transfer operation failed");
                    (status, code, "Internal server error.".to_string())
                } else {
                    (status, code, err.to_string())
                }
            }
            ApiError::Access(err) => {
                let (status, code) = access_code(err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %err, "Access operation failed");
                    (status, code, "Internal server error.".to_string())
                } else {
                    (status, code, err.to_string())
                }
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

fn optional<'h>(headers: &'h HeaderMap, name: &'static str) -> Result<Option<&'h str>, ApiError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::InvalidHeader(name)),
        None => Ok(None),
    }
}

fn require<'h>(headers: &'h HeaderMap, name: &'static str) -> Result<&'h str, ApiError> {
    optional(headers, name)?.ok_or(ApiError::MissingHeader(name))
}

fn require_u32(headers: &HeaderMap, name: &'static str) -> Result<u32, ApiError> {
    require(headers, name)?
        .parse()
        .map_err(|_| ApiError::InvalidHeader(name))
}

/// Client-persisted checkpoint, present only when both halves arrived.
fn checkpoint(headers: &HeaderMap) -> Result<Option<Checkpoint>, ApiError> {
    let view_id = optional(headers, H_LAST_VIEW_ID)?;
    let view_password = optional(headers, H_LAST_VIEW_PASSWORD)?;
    Ok(match (view_id, view_password) {
        (Some(id), Some(password)) => Some(Checkpoint {
            view_id: id.to_string(),
            view_password: password.to_string(),
        }),
        _ => None,
    })
}

fn binary(bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Bytes::from(bytes),
    )
        .into_response()
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/{kind}
pub async fn create_exchange(
    State(state): State<AppState>,
    Path(kind): Path<ExchangeKind>,
    Json(req): Json<CreateExchangeRequest>,
) -> Result<(StatusCode, Json<CreateExchangeResponse>), ApiError> {
    let config = state.transfer.create_exchange(kind, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateExchangeResponse {
            exchange_id: config.id,
        }),
    ))
}

/// POST /api/{kind}/transfers
pub async fn initiate_transfer(
    State(state): State<AppState>,
    Path(kind): Path<ExchangeKind>,
    headers: HeaderMap,
) -> Result<Json<InitiateTransferResponse>, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let ticket = state.transfer.initiate(kind, exchange_id).await?;
    Ok(Json(ticket))
}

/// POST /api/{kind}/parts — body is one raw encrypted part.
pub async fn upload_part(
    State(state): State<AppState>,
    Path(kind): Path<ExchangeKind>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let parts_password = require(&headers, H_PARTS_PASSWORD)?;
    let part_number = require_u32(&headers, H_PART_NUMBER)?;
    let total_parts = require_u32(&headers, H_TOTAL_PARTS)?;

    let target = match kind {
        ExchangeKind::Send => StateRef::exchange(kind, exchange_id),
        ExchangeKind::Receive => {
            let response_id = require(&headers, H_RESPONSE_ID)?;
            StateRef::response(exchange_id, response_id)
        }
    };
    state
        .transfer
        .upload_part(&target, parts_password, part_number, total_parts, body.to_vec())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/{kind}/parts — view download for push, response download for pull.
pub async fn download_part(
    State(state): State<AppState>,
    Path(kind): Path<ExchangeKind>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let part_number = require_u32(&headers, H_PART_NUMBER)?;

    let bytes = match kind {
        ExchangeKind::Send => {
            let view_id = require(&headers, H_VIEW_ID)?;
            let view_password = require(&headers, H_VIEW_PASSWORD)?;
            state
                .access
                .download_part(exchange_id, view_id, view_password, part_number)
                .await?
        }
        ExchangeKind::Receive => {
            let response_id = require(&headers, H_RESPONSE_ID)?;
            let password = optional(&headers, H_PASSWORD)?;
            state
                .transfer
                .download_response_part(exchange_id, response_id, password, part_number)
                .await?
        }
    };
    Ok(binary(bytes))
}

/// GET /api/send/access
pub async fn load_access_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccessStatus>, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let checkpoint = checkpoint(&headers)?;
    let status = state
        .access
        .load_status(exchange_id, checkpoint.as_ref())
        .await?;
    Ok(Json(status))
}

/// PUT /api/send/views
pub async fn initiate_view(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccessStatus>, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let password = optional(&headers, H_PASSWORD)?;
    let status = state.access.initiate_view(exchange_id, password).await?;
    Ok(Json(status))
}

/// PUT /api/send/views/confirm
pub async fn confirm_view(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccessStatus>, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let view_id = require(&headers, H_VIEW_ID)?;
    let code = require(&headers, H_CONFIRMATION_CODE)?;
    let status = state.access.confirm_view(exchange_id, view_id, code).await?;
    Ok(Json(status))
}

/// POST /api/send/views/complete
pub async fn complete_view(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let view_id = require(&headers, H_VIEW_ID)?;
    let view_password = require(&headers, H_VIEW_PASSWORD)?;
    state
        .access
        .complete_view(exchange_id, view_id, view_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/receive/responses
pub async fn list_responses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListResponsesResponse>, ApiError> {
    let exchange_id = require(&headers, H_EXCHANGE_ID)?;
    let password = optional(&headers, H_PASSWORD)?;
    let responses = state.transfer.list_responses(exchange_id, password).await?;
    Ok(Json(ListResponsesResponse { responses }))
}
