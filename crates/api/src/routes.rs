//! HTTP route handlers for the API.
//!
//! Handlers only signal and query: none of them waits for an investigation
//! to process what it was sent.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ein_common::{Alert, EinError, Finding, FindingFilter, MessagePage, Role, SpecialistKind};
use ein_coordinator::{CorrelationReport, RouteDecision};
use ein_session::{BatchView, InvestigationView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub route_table_version: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        route_table_version: state.sessions.router().table().version.clone(),
    })
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: &'static str,
}

impl ErrorResponse {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            code: "BAD_REQUEST",
        }
    }

    fn not_found(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: error.into(),
            code,
        }
    }
}

impl From<EinError> for ErrorResponse {
    fn from(err: EinError) -> Self {
        let status = match err {
            EinError::InvestigationNotFound(_) => StatusCode::NOT_FOUND,
            EinError::Archived(_) => StatusCode::GONE,
            EinError::InvestigationFailed(_)
            | EinError::ConcurrentHandoff { .. }
            | EinError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EinError::QueueOverflow { .. } | EinError::Durability(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, code = err.code(), "Request failed");
        }
        Self {
            status,
            error: err.to_string(),
            code: err.code(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ErrorResponse>;

/// Body for creating an investigation.
///
/// `alerts` are Alertmanager v2 alert objects. An investigation with no
/// alerts and no message greets the operator.
#[derive(Debug, Default, Deserialize)]
pub struct CreateInvestigationRequest {
    #[serde(default)]
    pub alerts: Vec<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

fn parse_alerts(raw: Vec<serde_json::Value>) -> ApiResult<Vec<Alert>> {
    raw.into_iter()
        .enumerate()
        .map(|(i, value)| {
            Alert::from_alertmanager_json(value)
                .map_err(|e| ErrorResponse::bad_request(format!("alert {}: {}", i, e)))
        })
        .collect()
}

/// Start an investigation.
pub async fn create_investigation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateInvestigationRequest>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let alerts = parse_alerts(request.alerts)?;
    info!(alerts = alerts.len(), "Creating investigation");

    let id = state
        .sessions
        .create_investigation(alerts, request.message)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// List investigation ids.
pub async fn list_investigations(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.sessions.list()?))
}

/// Acknowledgement of an enqueued signal.
#[derive(Debug, Serialize)]
pub struct SignalResponse {
    pub seq: u64,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Send an operator message. Returns once the event is journaled and queued.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<(StatusCode, Json<SignalResponse>)> {
    debug!(
        investigation_id = %id,
        preview = %request.text.chars().take(50).collect::<String>(),
        "Operator message"
    );
    let seq = state.sessions.send_message(&id, request.text)?;
    Ok((StatusCode::ACCEPTED, Json(SignalResponse { seq })))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationRequest {
    pub confirmed: bool,
    /// Choose this specialist instead of the one proposed
    #[serde(default)]
    pub specialist: Option<SpecialistKind>,
}

/// Answer a pending handoff proposal.
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ConfirmationRequest>,
) -> ApiResult<(StatusCode, Json<SignalResponse>)> {
    let seq = state
        .sessions
        .provide_confirmation(&id, request.confirmed, request.specialist)?;
    Ok((StatusCode::ACCEPTED, Json(SignalResponse { seq })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Cancel the active handoff.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SignalResponse>)> {
    // The body is optional; an empty one cancels without a reason.
    let reason = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<CancelRequest>(&body)
            .map_err(|e| ErrorResponse::bad_request(e.to_string()))?
            .reason
    };
    let seq = state.sessions.cancel(&id, reason)?;
    Ok((StatusCode::ACCEPTED, Json(SignalResponse { seq })))
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub since: u64,
}

/// Read messages after `since`. Repeating a read with the same cursor
/// returns the same page.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagePage>> {
    Ok(Json(state.sessions.get_messages(&id, query.since)?))
}

/// Investigation status.
pub async fn get_investigation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<InvestigationView>> {
    Ok(Json(state.sessions.status(&id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct FindingsQuery {
    #[serde(default)]
    pub subject: Option<String>,
    /// `orchestrator` or a specialist name
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub min_confidence: Option<f32>,
    /// Alert fingerprint
    #[serde(default)]
    pub alert: Option<String>,
}

impl FindingsQuery {
    fn into_filter(self) -> ApiResult<FindingFilter> {
        let author = match self.author.as_deref() {
            None => None,
            Some(a) if a.eq_ignore_ascii_case("orchestrator") => Some(Role::Orchestrator),
            Some(a) => Some(Role::Specialist(
                a.parse::<SpecialistKind>()
                    .map_err(ErrorResponse::bad_request)?,
            )),
        };
        Ok(FindingFilter {
            subject: self.subject,
            author,
            min_confidence: self.min_confidence,
            alert: self.alert,
        })
    }
}

/// Findings recorded on the investigation's blackboard.
pub async fn get_findings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<FindingsQuery>,
) -> ApiResult<Json<Vec<Finding>>> {
    let filter = query.into_filter()?;
    Ok(Json(state.sessions.findings(&id, &filter)?))
}

/// The correlation report, once produced.
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CorrelationReport>> {
    state
        .sessions
        .report(&id)?
        .map(Json)
        .ok_or_else(|| {
            ErrorResponse::not_found(format!("No report yet for {}", id), "REPORT_NOT_READY")
        })
}

/// Archive an investigation. Later signals are rejected; queries still work.
pub async fn archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.sessions.archive(&id).await?;
    info!(investigation_id = %id, "Investigation archived");
    Ok(StatusCode::NO_CONTENT)
}

/// Reload an investigation from the store after a restart.
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<InvestigationView>> {
    Ok(Json(state.sessions.resume(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub text: String,
}

/// Preview routing for a text without starting anything.
pub async fn preview_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteRequest>,
) -> Json<RouteDecision> {
    Json(state.sessions.router().route(&request.text))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub alerts: Vec<serde_json::Value>,
}

/// Start one investigation per alert with a correlation barrier across them.
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let alerts = parse_alerts(request.alerts)?;
    if alerts.is_empty() {
        return Err(ErrorResponse::bad_request("a batch needs at least one alert"));
    }
    let id = state.sessions.start_batch(alerts).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<BatchView>> {
    Ok(Json(state.sessions.batch_status(&id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            uptime_seconds: 100,
            route_table_version: "builtin-1".into(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("builtin-1"));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (EinError::InvestigationNotFound("x".into()), StatusCode::NOT_FOUND),
            (EinError::Archived("x".into()), StatusCode::GONE),
            (EinError::InvestigationFailed("x".into()), StatusCode::CONFLICT),
            (
                EinError::InvalidTransition {
                    state: "idle".into(),
                    action: "confirm".into(),
                },
                StatusCode::CONFLICT,
            ),
            (EinError::QueueOverflow { capacity: 2 }, StatusCode::SERVICE_UNAVAILABLE),
            (EinError::Durability("disk".into()), StatusCode::SERVICE_UNAVAILABLE),
            (EinError::Specialist("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let code = err.code();
            let response = ErrorResponse::from(err);
            assert_eq!(response.status, expected);
            assert_eq!(response.code, code);
        }
    }

    #[test]
    fn test_error_body_omits_status() {
        let json = serde_json::to_value(ErrorResponse::bad_request("nope")).unwrap();
        assert_eq!(json["code"], "BAD_REQUEST");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_findings_query_author_parsing() {
        let query = FindingsQuery {
            author: Some("ceph".into()),
            min_confidence: Some(0.5),
            ..Default::default()
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.author, Some(Role::Specialist(SpecialistKind::Storage)));
        assert_eq!(filter.min_confidence, Some(0.5));

        let query = FindingsQuery {
            author: Some("Orchestrator".into()),
            ..Default::default()
        };
        assert_eq!(query.into_filter().unwrap().author, Some(Role::Orchestrator));

        let query = FindingsQuery {
            author: Some("plumber".into()),
            ..Default::default()
        };
        assert_eq!(query.into_filter().unwrap_err().status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_alerts_reports_index() {
        let err = parse_alerts(vec![
            serde_json::json!({"fingerprint": "a", "labels": {"alertname": "X"}}),
            serde_json::json!({"labels": {}}),
        ])
        .unwrap_err();
        assert!(err.error.starts_with("alert 1:"));
    }
}
