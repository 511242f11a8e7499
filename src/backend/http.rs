//! HTTP implementation of the backend interface.
//!
//! Speaks the remote platform's two surfaces: the identity service under
//! `/auth/v1/` and the table API under `/rest/v1/` (PostgREST conventions:
//! `eq.`/`cs.` filters, `select`, `on_conflict`, `Prefer` headers).
//!
//! Every request carries an api key. Caller-scoped requests send the anon
//! key plus the caller's bearer credential when one is present; service
//! requests send the service key as both api key and bearer. No retries are
//! attempted; a failed call surfaces immediately.

use async_trait::async_trait;
use reqwest::{
    Method, RequestBuilder,
    header::{ACCEPT, AUTHORIZATION},
};
use serde_json::Value;
use url::Url;

use super::{
    AuthResponse, AuthUser, Backend, BackendError, CommunityVoiceUpsert, PatternRequestInsert,
    Profile, ProfileUpsert, VoiceProfileUpsert,
};

/// Single-object responses; a miss comes back with this PostgREST code.
const NO_ROWS_CODE: &str = "PGRST116";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";
const RETURN_PREFER: &str = "return=representation";

pub struct HttpBackend {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    service_key: String,
}

impl HttpBackend {
    /// Create a backend client for the service at `base`.
    pub fn new(mut base: Url, anon_key: String, service_key: String) -> Self {
        // Url::join treats the last path segment as a file without this.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Self {
            http: reqwest::Client::new(),
            base,
            anon_key,
            service_key,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        self.base
            .join(path)
            .expect("backend endpoint path is valid")
    }

    /// Caller-scoped request: anon key, plus the caller's credential when
    /// present.
    fn caller(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        let token = bearer.unwrap_or(&self.anon_key);
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Service-authority request: bypasses per-row policy. Keep reachable
    /// only from the narrow elevated writes.
    fn service(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        let message = error_message(&body, status.as_u16());
        if body.get("code").and_then(Value::as_str) == Some(NO_ROWS_CODE) {
            return Err(BackendError::NotFound(message));
        }
        Err(BackendError::Rejected(message))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let resp = Self::check(request.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn send_auth(&self, request: RequestBuilder) -> Result<AuthResponse, BackendError> {
        let value: Value = Self::send_json(request).await?;
        Ok(AuthResponse::from_backend(value))
    }

    /// Single-row read, with a miss mapped to `None`.
    async fn fetch_optional(&self, request: RequestBuilder) -> Result<Option<Value>, BackendError> {
        match Self::send_json(request.header(ACCEPT, SINGLE_OBJECT)).await {
            Ok(value) => Ok(Some(value)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Pull a human-readable message out of a backend error body.
fn error_message(body: &Value, status: u16) -> String {
    for key in ["message", "msg", "error_description", "error"] {
        if let Some(message) = body.get(key).and_then(Value::as_str) {
            return message.to_string();
        }
    }
    format!("backend returned status {status}")
}

#[async_trait]
impl Backend for HttpBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError> {
        let request = self
            .caller(Method::POST, "auth/v1/token", None)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        self.send_auth(request).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
        redirect_to: &str,
    ) -> Result<AuthResponse, BackendError> {
        let request = self
            .caller(Method::POST, "auth/v1/signup", None)
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": { "display_name": display_name },
            }));
        self.send_auth(request).await
    }

    async fn sign_out(&self, bearer: Option<&str>) -> Result<(), BackendError> {
        // Nothing to invalidate without a credential.
        let Some(bearer) = bearer else { return Ok(()) };
        let request = self.caller(Method::POST, "auth/v1/logout", Some(bearer));
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthResponse, BackendError> {
        let request = self
            .caller(Method::POST, "auth/v1/token", None)
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        self.send_auth(request).await
    }

    async fn resolve_user(&self, bearer: &str) -> Result<AuthUser, BackendError> {
        let request = self.caller(Method::GET, "auth/v1/user", Some(bearer));
        Self::send_json(request).await
    }

    async fn profile(
        &self,
        bearer: Option<&str>,
        user_id: &str,
    ) -> Result<Profile, BackendError> {
        let request = self
            .caller(Method::GET, "rest/v1/profiles", bearer)
            .query(&[("select", "display_name,email,role")])
            .query(&[("id", &format!("eq.{user_id}"))])
            .header(ACCEPT, SINGLE_OBJECT);
        Self::send_json(request).await
    }

    async fn upsert_profile(&self, row: &ProfileUpsert) -> Result<(), BackendError> {
        let request = self
            .service(Method::POST, "rest/v1/profiles")
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(row);
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn voice_profile(
        &self,
        bearer: Option<&str>,
        email: &str,
    ) -> Result<Option<Value>, BackendError> {
        let request = self
            .caller(Method::GET, "rest/v1/voice_profiles", bearer)
            .query(&[("select", "*")])
            .query(&[("user_email", &format!("eq.{email}"))]);
        self.fetch_optional(request).await
    }

    async fn create_voice_profile(
        &self,
        row: &VoiceProfileUpsert,
    ) -> Result<Value, BackendError> {
        let request = self
            .service(Method::POST, "rest/v1/voice_profiles")
            .query(&[("on_conflict", "user_email")])
            .header("Prefer", UPSERT_PREFER)
            .header(ACCEPT, SINGLE_OBJECT)
            .json(row);
        Self::send_json(request).await
    }

    async fn update_voice_profile(
        &self,
        bearer: Option<&str>,
        email: &str,
        updates: &Value,
    ) -> Result<Value, BackendError> {
        let request = self
            .caller(Method::PATCH, "rest/v1/voice_profiles", bearer)
            .query(&[("user_email", &format!("eq.{email}"))])
            .header("Prefer", RETURN_PREFER)
            .header(ACCEPT, SINGLE_OBJECT)
            .json(updates);
        Self::send_json(request).await
    }

    async fn voice_preferences(
        &self,
        bearer: Option<&str>,
        email: &str,
    ) -> Result<Option<Value>, BackendError> {
        let request = self
            .caller(Method::GET, "rest/v1/voice_preferences", bearer)
            .query(&[("select", "*")])
            .query(&[("user_email", &format!("eq.{email}"))]);
        self.fetch_optional(request).await
    }

    async fn upsert_voice_preferences(
        &self,
        bearer: Option<&str>,
        email: &str,
        updates: &Value,
    ) -> Result<Value, BackendError> {
        let mut row = match updates {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        row.insert("user_email".into(), Value::String(email.to_string()));
        let request = self
            .caller(Method::POST, "rest/v1/voice_preferences", bearer)
            .query(&[("on_conflict", "user_email")])
            .header("Prefer", UPSERT_PREFER)
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&Value::Object(row));
        Self::send_json(request).await
    }

    async fn community_voices(&self, bearer: Option<&str>) -> Result<Vec<Value>, BackendError> {
        let request = self
            .caller(Method::GET, "rest/v1/community_voices", bearer)
            .query(&[("select", "owner_email,display_name,description")]);
        Self::send_json(request).await
    }

    async fn join_community_voices(
        &self,
        bearer: Option<&str>,
        row: &CommunityVoiceUpsert,
    ) -> Result<Value, BackendError> {
        let request = self
            .caller(Method::POST, "rest/v1/community_voices", bearer)
            .query(&[("on_conflict", "owner_email")])
            .header("Prefer", UPSERT_PREFER)
            .header(ACCEPT, SINGLE_OBJECT)
            .json(row);
        Self::send_json(request).await
    }

    async fn leave_community_voices(
        &self,
        bearer: Option<&str>,
        email: &str,
    ) -> Result<(), BackendError> {
        let request = self
            .caller(Method::DELETE, "rest/v1/community_voices", bearer)
            .query(&[("owner_email", &format!("eq.{email}"))]);
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn submit_pattern_request(
        &self,
        row: &PatternRequestInsert,
    ) -> Result<Value, BackendError> {
        let request = self
            .service(Method::POST, "rest/v1/pattern_requests")
            .header("Prefer", RETURN_PREFER)
            .header(ACCEPT, SINGLE_OBJECT)
            .json(row);
        Self::send_json(request).await
    }

    async fn approved_pattern_requests(
        &self,
        bearer: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        let request = self
            .caller(Method::GET, "rest/v1/pattern_requests", bearer)
            .query(&[
                ("select", "id,name,pattern_request,status,created_at"),
                ("status", "eq.approved"),
                ("order", "created_at.desc"),
            ]);
        Self::send_json(request).await
    }

    async fn ads(
        &self,
        bearer: Option<&str>,
        zone: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        let mut request = self
            .caller(Method::GET, "rest/v1/ads", bearer)
            .query(&[("select", "*"), ("active", "eq.true")]);
        if let Some(zone) = zone {
            request = request.query(&[("zones", &format!("cs.{{{zone}}}"))]);
        }
        Self::send_json(request).await
    }
}
