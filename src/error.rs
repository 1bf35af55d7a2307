use std::any::Any;

use axum::{
    Json,
    extract::{
        Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

const GENERIC_MESSAGE: &str = "Something went wrong!";

/// Debug rendering of a failure, carried in the response extensions of every error
/// response until `render_error_stack` decides whether the client may see it.
#[derive(Debug, Clone)]
pub struct ErrorStack {
    envelope: ErrorResponse,
    stack: String,
}

/// ErrorEntry
///
/// One field-level problem inside an error envelope. `path` names the offending field
/// (`items[0].quantity`, `email`, a constraint name) or is empty when the failure is not
/// tied to a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorEntry {
    pub path: String,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// ErrorResponse
///
/// The uniform JSON envelope produced for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error_messages: Vec<ErrorEntry>,
    pub stack: Option<String>,
}

/// ApiError
///
/// Every failure a handler, extractor or middleware can surface. The variant records
/// where the error came from; `normalize` turns it into status, message and entries.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request payload failed validation or could not be parsed.
    #[error("Validation Error")]
    Validation(Vec<ErrorEntry>),
    /// Raised by the store: constraint violations, missing rows, connection trouble.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Raised deliberately by application code with an explicit status.
    #[error("{message}")]
    App {
        status: StatusCode,
        message: String,
        path: String,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Normalized
///
/// The classification result shared by the response builder and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub status: StatusCode,
    pub message: String,
    pub error_messages: Vec<ErrorEntry>,
}

impl Normalized {
    fn single(status: StatusCode, message: &str, path: &str, detail: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            error_messages: vec![ErrorEntry::new(path, detail)],
        }
    }

    fn generic() -> Self {
        Self::single(
            StatusCode::INTERNAL_SERVER_ERROR,
            GENERIC_MESSAGE,
            "",
            GENERIC_MESSAGE,
        )
    }
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::App {
            status,
            message: message.into(),
            path: String::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// A single-field validation failure raised from handler logic.
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![ErrorEntry::new(path, message)])
    }

    /// Attaches the field path to an application error. Other variants are unchanged.
    pub fn at(self, field: impl Into<String>) -> Self {
        match self {
            ApiError::App {
                status, message, ..
            } => ApiError::App {
                status,
                message,
                path: field.into(),
            },
            other => other,
        }
    }

    pub fn normalize(&self) -> Normalized {
        match self {
            ApiError::Validation(entries) => Normalized {
                status: StatusCode::BAD_REQUEST,
                message: "Validation Error".to_string(),
                error_messages: entries.clone(),
            },
            ApiError::Database(err) => classify_database_error(err),
            ApiError::App {
                status,
                message,
                path,
            } => Normalized::single(*status, message, path, message),
            ApiError::Internal(_) => Normalized::generic(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.normalize().status
    }

    /// Builds the JSON envelope. `expose_stack` decides whether `stack` is filled in.
    pub fn to_envelope(&self, expose_stack: bool) -> ErrorResponse {
        let normalized = self.normalize();
        ErrorResponse {
            success: false,
            message: normalized.message,
            error_messages: normalized.error_messages,
            stack: expose_stack.then(|| format!("{self:?}")),
        }
    }
}

/// Maps store failures onto the envelope classification.
pub fn classify_database_error(err: &sqlx::Error) -> Normalized {
    match err {
        sqlx::Error::RowNotFound => Normalized::single(
            StatusCode::NOT_FOUND,
            "Record not found",
            "",
            "Record not found",
        ),
        sqlx::Error::Database(db) => {
            classify_constraint(db.code().as_deref(), db.constraint(), db.message())
        }
        _ => Normalized::generic(),
    }
}

/// Classifies a Postgres error by SQLSTATE code.
pub fn classify_constraint(code: Option<&str>, constraint: Option<&str>, message: &str) -> Normalized {
    let path = constraint.unwrap_or("");
    match code {
        Some("23505") => Normalized::single(StatusCode::CONFLICT, "Duplicate entry", path, message),
        // Postgres words the delete-side FK failure as "update or delete on table ...".
        Some("23503") if message.starts_with("update or delete") => Normalized::single(
            StatusCode::CONFLICT,
            "Record is still referenced",
            path,
            message,
        ),
        Some("23503") => Normalized::single(
            StatusCode::BAD_REQUEST,
            "Related record does not exist",
            path,
            message,
        ),
        Some("23502") | Some("23514") | Some("22P02") => {
            Normalized::single(StatusCode::BAD_REQUEST, "Invalid data", path, message)
        }
        _ => Normalized::generic(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = self.to_envelope(false);
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, %status, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }

        let mut response = (status, Json(envelope.clone())).into_response();
        response.extensions_mut().insert(ErrorStack {
            envelope,
            stack: format!("{self:?}"),
        });
        response
    }
}

/// render_error_stack
///
/// Response-mapping middleware. When `exposes_stack` is set (local environment) error
/// envelopes are re-rendered with their `stack` filled in; otherwise they pass through
/// with `stack: null`.
pub async fn render_error_stack(
    State(exposes_stack): State<bool>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(ErrorStack { mut envelope, stack }) = response.extensions_mut().remove::<ErrorStack>()
    else {
        return response;
    };
    if !exposes_stack {
        return response;
    }

    envelope.stack = Some(stack);
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let rendered = Json(envelope).into_response();
    let (rendered_parts, body) = rendered.into_parts();
    parts.headers.extend(rendered_parts.headers);
    Response::from_parts(parts, body)
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut entries = Vec::new();
        flatten_validation("", &errors, &mut entries);
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        ApiError::Validation(entries)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            return ApiError::new(rejection.status(), rejection.body_text());
        }
        ApiError::invalid("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid("query", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid("path", rejection.body_text())
    }
}

fn flatten_validation(prefix: &str, errors: &ValidationErrors, out: &mut Vec<ErrorEntry>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                out.extend(list.iter().map(|e| ErrorEntry::new(&path, describe(e))));
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_validation(&format!("{path}[{index}]"), inner, out);
                }
            }
        }
    }
}

fn describe(error: &ValidationError) -> String {
    match &error.message {
        Some(message) => message.to_string(),
        None => format!("Invalid value ({})", error.code),
    }
}

/// Fallback for unmatched routes.
pub async fn handler_404(uri: Uri) -> ApiError {
    ApiError::not_found("API Not Found").at(uri.path())
}

/// Panic hook for `CatchPanicLayer`: answers with the generic 500 envelope.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
