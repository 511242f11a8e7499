#![allow(dead_code)]

//! In-memory backend double shared by the integration suites.
//!
//! Issues unsigned three-part credentials whose payload carries the user's
//! email and an expiry derived from `token_ttl`, and honors them on
//! `resolve_user` the way the real identity service would (expired or
//! unknown credentials are rejected). Every trait call bumps a counter so
//! tests can assert the gateway never touched the backend.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use stitchgate::backend::{
    AuthResponse, AuthSession, AuthUser, Backend, BackendError, CommunityVoiceUpsert,
    PatternRequestInsert, Profile, ProfileUpsert, VoiceProfileUpsert,
};
use stitchgate::token;

pub struct MockUser {
    pub id: String,
    pub password: String,
    pub confirmed: bool,
}

#[derive(Default)]
pub struct MockBackend {
    /// Lifetime of issued credentials, in seconds relative to now.
    token_ttl: i64,
    users: Mutex<HashMap<String, MockUser>>,
    profiles: Mutex<HashMap<String, Profile>>,
    /// Service-authority profile writes, recorded for assertions.
    pub profile_upserts: Mutex<Vec<Value>>,
    voice_profiles: Mutex<HashMap<String, Value>>,
    voice_preferences: Mutex<HashMap<String, Value>>,
    community_voices: Mutex<HashMap<String, Value>>,
    pattern_requests: Mutex<Vec<Value>>,
    ads_rows: Mutex<Vec<Value>>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            token_ttl: 3600,
            ..Self::default()
        }
    }

    pub fn with_token_ttl(mut self, ttl: i64) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Register a user; returns the assigned id.
    pub fn add_user(&self, email: &str, password: &str, confirmed: bool) -> String {
        let id = format!("user-{}", email.split('@').next().unwrap_or(email));
        self.users.lock().unwrap().insert(
            email.to_string(),
            MockUser {
                id: id.clone(),
                password: password.to_string(),
                confirmed,
            },
        );
        id
    }

    pub fn add_profile(&self, user_id: &str, display_name: &str, email: &str, role: &str) {
        self.profiles.lock().unwrap().insert(
            user_id.to_string(),
            Profile {
                display_name: Some(display_name.to_string()),
                email: email.to_string(),
                role: role.to_string(),
            },
        );
    }

    pub fn add_ad(&self, ad: Value) {
        self.ads_rows.lock().unwrap().push(ad);
    }

    pub fn add_pattern_request(&self, row: Value) {
        self.pattern_requests.lock().unwrap().push(row);
    }

    /// Total number of backend calls made through the trait.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Issue an unsigned credential for the user, expiring `token_ttl`
    /// seconds from now.
    pub fn issue_credential(&self, id: &str, email: &str) -> String {
        let exp = (token::unix_now() as i64 + self.token_ttl).max(0) as u64;
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            json!({ "sub": id, "email": email, "exp": exp }).to_string(),
        );
        format!("{header}.{payload}.mock-signature")
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn auth_user(&self, email: &str) -> Option<AuthUser> {
        let users = self.users.lock().unwrap();
        let user = users.get(email)?;
        Some(AuthUser {
            id: user.id.clone(),
            email: email.to_string(),
            email_confirmed_at: user
                .confirmed
                .then(|| "2026-01-01T00:00:00Z".to_string()),
            extra: Map::new(),
        })
    }

    fn session_for(&self, id: &str, email: &str) -> AuthSession {
        AuthSession {
            access_token: self.issue_credential(id, email),
            refresh_token: Some(format!("refresh-{email}")),
            extra: Map::new(),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, BackendError> {
        self.tick();
        let id = {
            let users = self.users.lock().unwrap();
            match users.get(email) {
                Some(user) if user.password == password => user.id.clone(),
                _ => {
                    return Err(BackendError::Rejected(
                        "Invalid login credentials".to_string(),
                    ));
                }
            }
        };
        Ok(AuthResponse {
            user: self.auth_user(email),
            session: Some(self.session_for(&id, email)),
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _display_name: Option<&str>,
        _redirect_to: &str,
    ) -> Result<AuthResponse, BackendError> {
        self.tick();
        if self.users.lock().unwrap().contains_key(email) {
            return Err(BackendError::Rejected("User already registered".to_string()));
        }
        self.add_user(email, password, false);
        Ok(AuthResponse {
            user: self.auth_user(email),
            session: None,
        })
    }

    async fn sign_out(&self, _bearer: Option<&str>) -> Result<(), BackendError> {
        self.tick();
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthResponse, BackendError> {
        self.tick();
        let email = refresh_token
            .strip_prefix("refresh-")
            .ok_or_else(|| BackendError::Rejected("Invalid Refresh Token".to_string()))?;
        let id = {
            let users = self.users.lock().unwrap();
            users
                .get(email)
                .map(|u| u.id.clone())
                .ok_or_else(|| BackendError::Rejected("Invalid Refresh Token".to_string()))?
        };
        Ok(AuthResponse {
            user: self.auth_user(email),
            session: Some(self.session_for(&id, email)),
        })
    }

    async fn resolve_user(&self, bearer: &str) -> Result<AuthUser, BackendError> {
        self.tick();
        if token::expired(bearer) {
            return Err(BackendError::Rejected("invalid JWT".to_string()));
        }
        let claims =
            token::decode(bearer).map_err(|_| BackendError::Rejected("invalid JWT".to_string()))?;
        let email = claims
            .extra
            .get("email")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Rejected("invalid JWT".to_string()))?;
        self.auth_user(email)
            .ok_or_else(|| BackendError::Rejected("User not found".to_string()))
    }

    async fn profile(
        &self,
        _bearer: Option<&str>,
        user_id: &str,
    ) -> Result<Profile, BackendError> {
        self.tick();
        self.profiles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| {
                BackendError::NotFound(
                    "JSON object requested, multiple (or no) rows returned".to_string(),
                )
            })
    }

    async fn upsert_profile(&self, row: &ProfileUpsert) -> Result<(), BackendError> {
        self.tick();
        self.profiles.lock().unwrap().insert(
            row.id.clone(),
            Profile {
                display_name: Some(row.display_name.clone()),
                email: row.email.clone(),
                role: row.role.clone(),
            },
        );
        self.profile_upserts
            .lock()
            .unwrap()
            .push(serde_json::to_value(row).unwrap());
        Ok(())
    }

    async fn voice_profile(
        &self,
        _bearer: Option<&str>,
        email: &str,
    ) -> Result<Option<Value>, BackendError> {
        self.tick();
        Ok(self.voice_profiles.lock().unwrap().get(email).cloned())
    }

    async fn create_voice_profile(
        &self,
        row: &VoiceProfileUpsert,
    ) -> Result<Value, BackendError> {
        self.tick();
        let value = serde_json::to_value(row).unwrap();
        self.voice_profiles
            .lock()
            .unwrap()
            .insert(row.user_email.clone(), value.clone());
        Ok(value)
    }

    async fn update_voice_profile(
        &self,
        _bearer: Option<&str>,
        email: &str,
        updates: &Value,
    ) -> Result<Value, BackendError> {
        self.tick();
        let mut rows = self.voice_profiles.lock().unwrap();
        let row = rows.get_mut(email).ok_or_else(|| {
            BackendError::NotFound(
                "JSON object requested, multiple (or no) rows returned".to_string(),
            )
        })?;
        if let (Some(row), Some(updates)) = (row.as_object_mut(), updates.as_object()) {
            for (key, value) in updates {
                row.insert(key.clone(), value.clone());
            }
        }
        Ok(row.clone())
    }

    async fn voice_preferences(
        &self,
        _bearer: Option<&str>,
        email: &str,
    ) -> Result<Option<Value>, BackendError> {
        self.tick();
        Ok(self.voice_preferences.lock().unwrap().get(email).cloned())
    }

    async fn upsert_voice_preferences(
        &self,
        _bearer: Option<&str>,
        email: &str,
        updates: &Value,
    ) -> Result<Value, BackendError> {
        self.tick();
        let mut rows = self.voice_preferences.lock().unwrap();
        let row = rows
            .entry(email.to_string())
            .or_insert_with(|| json!({ "user_email": email }));
        if let (Some(row), Some(updates)) = (row.as_object_mut(), updates.as_object()) {
            for (key, value) in updates {
                row.insert(key.clone(), value.clone());
            }
        }
        Ok(row.clone())
    }

    async fn community_voices(
        &self,
        _bearer: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        self.tick();
        Ok(self
            .community_voices
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect())
    }

    async fn join_community_voices(
        &self,
        _bearer: Option<&str>,
        row: &CommunityVoiceUpsert,
    ) -> Result<Value, BackendError> {
        self.tick();
        let value = serde_json::to_value(row).unwrap();
        self.community_voices
            .lock()
            .unwrap()
            .insert(row.owner_email.clone(), value.clone());
        Ok(value)
    }

    async fn leave_community_voices(
        &self,
        _bearer: Option<&str>,
        email: &str,
    ) -> Result<(), BackendError> {
        self.tick();
        self.community_voices.lock().unwrap().remove(email);
        Ok(())
    }

    async fn submit_pattern_request(
        &self,
        row: &PatternRequestInsert,
    ) -> Result<Value, BackendError> {
        self.tick();
        let mut rows = self.pattern_requests.lock().unwrap();
        let mut value = serde_json::to_value(row).unwrap();
        value["id"] = json!(rows.len() as i64 + 1);
        rows.push(value.clone());
        Ok(value)
    }

    async fn approved_pattern_requests(
        &self,
        _bearer: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        self.tick();
        Ok(self
            .pattern_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row["status"] == "approved")
            .cloned()
            .collect())
    }

    async fn ads(
        &self,
        _bearer: Option<&str>,
        zone: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        self.tick();
        Ok(self
            .ads_rows
            .lock()
            .unwrap()
            .iter()
            .filter(|ad| ad["active"] == true)
            .filter(|ad| {
                zone.is_none_or(|zone| {
                    ad["zones"]
                        .as_array()
                        .is_some_and(|zones| zones.iter().any(|z| z == zone))
                })
            })
            .cloned()
            .collect())
    }
}
