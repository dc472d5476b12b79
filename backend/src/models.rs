//! Data models for the Sealbox backend.
//!
//! Three record families are persisted as JSON documents in the object
//! store: immutable exchange configs, mutable exchange/response states,
//! and the views nested inside a push exchange's state. No secret values
//! and no decryption passwords ever appear in any of them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque exchange identifier; doubles as the public link token.
pub type ExchangeId = String;

/// The two exchange flavors.
///
/// A push exchange ("send") is created by a sender with data already
/// attached. A pull exchange ("receive") is an empty template a requester
/// creates for others to fill in; each response gets its own nested id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Send,
    Receive,
}

impl ExchangeKind {
    /// Store key-space root for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeKind::Send => "send",
            ExchangeKind::Receive => "receive",
        }
    }

    /// Identifier prefix for exchanges of this kind.
    pub fn id_prefix(self) -> &'static str {
        match self {
            ExchangeKind::Send => "sx",
            ExchangeKind::Receive => "rx",
        }
    }
}

/// Kind of one declared field in the exchange template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    SingleLineText,
    MultiLineText,
    File,
}

/// One field of the exchange template (titles are not secret).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub title: String,
    pub kind: FieldKind,
}

/// Immutable exchange description, written once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeConfig {
    pub id: ExchangeId,
    pub kind: ExchangeKind,
    pub created_at: DateTime<Utc>,
    /// Ordered field schema shown to viewers/responders.
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_views: Option<u32>,
    /// Viewer-facing password gate; not a decryption key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// When set, every view must pass an emailed-code challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_email: Option<String>,
    /// Optional webhook notified on readiness and unlock events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl ExchangeConfig {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Why an exchange's data was reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteReason {
    Expired,
    Viewed,
}

/// Mutable state, one per push exchange or per pull response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeState {
    pub id: String,
    /// Authenticates part uploads; never disclosed to viewers.
    pub parts_password: String,
    pub created_at: DateTime<Utc>,
    /// Set once an authoritative part listing matches the declared total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_encrypted_parts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_deleted_reason: Option<DeleteReason>,
    /// Push exchanges only; pull responses never carry views.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
}

impl ExchangeState {
    pub fn new(id: String, parts_password: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            parts_password,
            created_at,
            ready_at: None,
            total_encrypted_parts: None,
            data_deleted_at: None,
            data_deleted_reason: None,
            views: Vec::new(),
        }
    }

    pub fn view(&self, view_id: &str) -> Option<&View> {
        self.views.iter().find(|v| v.id == view_id)
    }

    pub fn view_mut(&mut self, view_id: &str) -> Option<&mut View> {
        self.views.iter_mut().find(|v| v.id == view_id)
    }
}

/// Why a view was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewCloseReason {
    Expired,
    TooManyConfirmationAttempts,
    ClientCompleted,
}

/// One confirmation code issued for a view. Only the most recently sent
/// code is live for comparison; older ones are kept for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationAttempt {
    pub code: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// One code the viewer typed, recorded for audit and lockout counting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationSubmission {
    pub code: String,
    pub submitted_at: DateTime<Utc>,
}

/// One authorized read attempt against a push exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: String,
    pub initiated_at: DateTime<Utc>,
    /// Per-view random password; disclosed only once `ready_at` is set.
    pub password: String,
    /// Null while a confirmation challenge is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_reason: Option<ViewCloseReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmation_attempts: Vec<ConfirmationAttempt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmation_submissions: Vec<ConfirmationSubmission>,
}

impl View {
    /// Open means not closed and inside the credential-lifetime ceiling.
    pub fn is_open(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.closed_at.is_none() && now - self.initiated_at < ttl
    }

    /// The latest issued code, the only one live for comparison.
    pub fn live_attempt_mut(&mut self) -> Option<&mut ConfirmationAttempt> {
        self.confirmation_attempts.last_mut()
    }
}

/// Viewer-side checkpoint persisted by the client between requests.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub view_id: String,
    pub view_password: String,
}

/// Why an exchange cannot be viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotViewableReason {
    NotFound,
    NotReady,
    Expired,
    Deleted,
    NoViewsRemaining,
}

/// Discriminated union returned by the access state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum AccessStatus {
    /// Caller holds no live view and no password gate stands in the way;
    /// it must initiate a view to proceed.
    NeedsToInitiateView,
    /// A password must accompany view initiation.
    NeedsPassword,
    /// A confirmation code was sent and must be submitted.
    #[serde(rename_all = "camelCase")]
    NeedsConfirmation { view_id: String },
    /// Unlocked credential; everything the download path needs.
    #[serde(rename_all = "camelCase")]
    Viewable {
        view_id: String,
        view_password: String,
        fields: Vec<FieldSpec>,
        total_encrypted_parts: u32,
    },
    /// Terminal; carries no secrets.
    #[serde(rename_all = "camelCase")]
    NotViewable { reason: NotViewableReason },
}

// === API Request/Response Models ===

/// Create exchange request. Carries the template and security settings,
/// never secret values; the exchange kind rides in the request path.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExchangeRequest {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_views: Option<u32>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub confirmation_email: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExchangeResponse {
    pub exchange_id: ExchangeId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateTransferResponse {
    pub exchange_id: ExchangeId,
    /// Allocated for pull exchanges; each response uploads separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    pub parts_password: String,
}

/// Summary of one ready response to a pull exchange.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub response_id: String,
    pub ready_at: DateTime<Utc>,
    pub total_encrypted_parts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponsesResponse {
    pub responses: Vec<ResponseSummary>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_status_stage_tags() {
        let json = serde_json::to_value(AccessStatus::NeedsToInitiateView).unwrap();
        assert_eq!(json["stage"], "needs-to-initiate-view");

        let json = serde_json::to_value(AccessStatus::NotViewable {
            reason: NotViewableReason::NoViewsRemaining,
        })
        .unwrap();
        assert_eq!(json["stage"], "not-viewable");
        assert_eq!(json["reason"], "no-views-remaining");

        let json = serde_json::to_value(AccessStatus::Viewable {
            view_id: "vw1".into(),
            view_password: "p".into(),
            fields: vec![FieldSpec {
                title: "Note".into(),
                kind: FieldKind::MultiLineText,
            }],
            total_encrypted_parts: 2,
        })
        .unwrap();
        assert_eq!(json["stage"], "viewable");
        assert_eq!(json["totalEncryptedParts"], 2);
        assert_eq!(json["fields"][0]["kind"], "multi-line-text");
    }

    #[test]
    fn view_open_window() {
        let now = Utc::now();
        let view = View {
            id: "vw1".into(),
            initiated_at: now - Duration::minutes(30),
            password: "p".into(),
            ready_at: Some(now),
            closed_at: None,
            closed_reason: None,
            confirmation_attempts: vec![],
            confirmation_submissions: vec![],
        };
        assert!(view.is_open(now, Duration::hours(1)));
        assert!(!view.is_open(now + Duration::minutes(31), Duration::hours(1)));

        let closed = View {
            closed_at: Some(now),
            closed_reason: Some(ViewCloseReason::ClientCompleted),
            ..view
        };
        assert!(!closed.is_open(now, Duration::hours(1)));
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = ExchangeState::new("sx1".into(), "PartsPassword1234567".into(), Utc::now());
        let json = serde_json::to_string(&state).unwrap();
        let parsed: ExchangeState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, state.id);
        assert!(parsed.views.is_empty());
        assert!(parsed.ready_at.is_none());
    }
}
