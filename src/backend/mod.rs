//! The remote identity/data backend, reduced to the operations the gateway
//! needs.
//!
//! The backend owns all durable data (profiles, voice profiles and
//! preferences, community voices, pattern requests, ads) and the identity
//! service. This module names that interface as a trait so the gateway can
//! be exercised against an in-memory double; `HttpBackend` is the production
//! implementation.
//!
//! Two authority levels exist. Caller-scoped operations carry the caller's
//! bearer credential (or run anonymously) and are subject to the backend's
//! per-row policy. Service-authority operations bypass per-row policy and
//! are reachable only from three narrow writes: the profile row created
//! after signup, the voice-profile upsert, and the pattern-request insert.

mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user as reported by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_confirmed_at: Option<String>,
    /// Any further fields the identity service reports, passed through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthUser {
    /// The local part of the user's email address.
    pub fn email_local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// An issued session as reported by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a sign-in, sign-up, or refresh operation.
///
/// Sign-up with email confirmation pending yields a user and no session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub session: Option<AuthSession>,
}

impl AuthResponse {
    /// Normalize the identity service's wire shapes.
    ///
    /// A token grant comes back flat (`access_token` alongside an embedded
    /// `user`), a confirmation-pending signup comes back as a bare user
    /// object, and some endpoints already use the `{user, session}` shape.
    pub fn from_backend(mut value: Value) -> Self {
        if value.get("access_token").is_some() {
            let user = value
                .as_object_mut()
                .and_then(|obj| obj.remove("user"))
                .and_then(|u| serde_json::from_value(u).ok());
            let session = serde_json::from_value(value).ok();
            return Self { user, session };
        }
        if value.get("id").is_some() {
            return Self {
                user: serde_json::from_value(value).ok(),
                session: None,
            };
        }
        serde_json::from_value(value).unwrap_or_default()
    }
}

/// Profile row columns the gateway reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub display_name: Option<String>,
    pub email: String,
    pub role: String,
}

/// Profile row written (with service authority) after a signup.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpsert {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

/// Voice profile row written (with service authority) by `createVoiceProfile`.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceProfileUpsert {
    pub user_email: String,
    pub display_name: Option<String>,
    pub voice_sample_url: Option<String>,
    pub status: String,
}

/// Community voice membership row, keyed by owner email.
#[derive(Debug, Clone, Serialize)]
pub struct CommunityVoiceUpsert {
    pub owner_email: String,
    pub display_name: String,
    pub description: String,
}

/// Pattern request row inserted (with service authority) by
/// `submitPatternRequest`.
#[derive(Debug, Clone, Serialize)]
pub struct PatternRequestInsert {
    pub name: String,
    pub email: Option<String>,
    pub pattern_request: String,
    pub status: String,
}

/// Errors reported by the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A single-row lookup matched nothing. Tolerated for voice profile and
    /// preference reads, an ordinary failure everywhere else.
    #[error("{0}")]
    NotFound(String),
    /// The backend rejected the operation; the message is user-facing and
    /// passed through by the gateway.
    #[error("{0}")]
    Rejected(String),
    /// The backend could not be reached or returned an unreadable response.
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The backend operations the gateway dispatches to.
///
/// Methods taking `bearer` run caller-scoped: the credential, when present,
/// accompanies the request so the backend applies its per-row policy to the
/// caller. Methods without a `bearer` parameter run with service authority.
#[async_trait]
pub trait Backend: Send + Sync {
    // Identity
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError>;
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
        redirect_to: &str,
    ) -> Result<AuthResponse, BackendError>;
    async fn sign_out(&self, bearer: Option<&str>) -> Result<(), BackendError>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthResponse, BackendError>;
    /// Exchange a bearer credential for the user it belongs to. This is the
    /// authoritative validity check; local expiry inspection never replaces
    /// it.
    async fn resolve_user(&self, bearer: &str) -> Result<AuthUser, BackendError>;

    // Profiles
    async fn profile(&self, bearer: Option<&str>, user_id: &str)
    -> Result<Profile, BackendError>;
    async fn upsert_profile(&self, row: &ProfileUpsert) -> Result<(), BackendError>;

    // Voice profiles
    async fn voice_profile(
        &self,
        bearer: Option<&str>,
        email: &str,
    ) -> Result<Option<Value>, BackendError>;
    async fn create_voice_profile(&self, row: &VoiceProfileUpsert)
    -> Result<Value, BackendError>;
    async fn update_voice_profile(
        &self,
        bearer: Option<&str>,
        email: &str,
        updates: &Value,
    ) -> Result<Value, BackendError>;

    // Voice preferences
    async fn voice_preferences(
        &self,
        bearer: Option<&str>,
        email: &str,
    ) -> Result<Option<Value>, BackendError>;
    async fn upsert_voice_preferences(
        &self,
        bearer: Option<&str>,
        email: &str,
        updates: &Value,
    ) -> Result<Value, BackendError>;

    // Community voices
    async fn community_voices(&self, bearer: Option<&str>) -> Result<Vec<Value>, BackendError>;
    async fn join_community_voices(
        &self,
        bearer: Option<&str>,
        row: &CommunityVoiceUpsert,
    ) -> Result<Value, BackendError>;
    async fn leave_community_voices(
        &self,
        bearer: Option<&str>,
        email: &str,
    ) -> Result<(), BackendError>;

    // Pattern requests
    async fn submit_pattern_request(
        &self,
        row: &PatternRequestInsert,
    ) -> Result<Value, BackendError>;
    async fn approved_pattern_requests(
        &self,
        bearer: Option<&str>,
    ) -> Result<Vec<Value>, BackendError>;

    // Ads
    async fn ads(
        &self,
        bearer: Option<&str>,
        zone: Option<&str>,
    ) -> Result<Vec<Value>, BackendError>;
}
