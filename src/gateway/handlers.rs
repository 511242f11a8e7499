//! Per-action handlers.
//!
//! Each handler owns its payload shape and authorization requirement. The
//! resolved identity, when one exists, arrives from the dispatcher; handlers
//! that need it fail with `NotAuthenticated` rather than touching the
//! backend. The three service-authority writes (post-signup profile row,
//! voice-profile upsert, pattern-request insert) are the only paths that
//! reach the backend without caller scoping.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::GatewayState;
use super::actions::Action;
use super::error::GatewayError;
use crate::backend::{
    AuthUser, BackendError, CommunityVoiceUpsert, PatternRequestInsert, ProfileUpsert,
    VoiceProfileUpsert,
};

pub async fn run(
    state: &GatewayState,
    action: Action,
    payload: Value,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    match action {
        Action::SignIn => sign_in(state, payload).await,
        Action::SignUp => sign_up(state, payload).await,
        Action::SignOut => sign_out(state, bearer).await,
        Action::RefreshSession => refresh_session(state, payload).await,
        Action::GetProfile => get_profile(state, bearer, user).await,
        Action::GetUserRole => get_user_role(state, bearer, user).await,
        Action::GetVoiceProfile => get_voice_profile(state, payload, bearer).await,
        Action::CreateVoiceProfile => create_voice_profile(state, payload).await,
        Action::UpdateVoiceProfile => update_voice_profile(state, payload, bearer, user).await,
        Action::GetVoicePreferences => get_voice_preferences(state, bearer, user).await,
        Action::UpdateVoicePreferences => {
            update_voice_preferences(state, payload, bearer, user).await
        }
        Action::GetCommunityVoices => get_community_voices(state, bearer).await,
        Action::JoinCommunityVoices => join_community_voices(state, payload, bearer, user).await,
        Action::LeaveCommunityVoices => leave_community_voices(state, bearer, user).await,
        Action::SubmitPatternRequest => submit_pattern_request(state, payload).await,
        Action::GetPatternRequests => get_pattern_requests(state, bearer).await,
        Action::GetAds => get_ads(state, payload, bearer).await,
    }
}

/// Deserialize an action payload. An absent payload is treated as empty.
fn parse_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, GatewayError> {
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid payload: {e}")))
}

fn require_user<'a>(user: Option<&'a AuthUser>) -> Result<&'a AuthUser, GatewayError> {
    user.ok_or(GatewayError::NotAuthenticated)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SignInPayload {
    email: String,
    password: String,
}

async fn sign_in(state: &GatewayState, payload: Value) -> Result<Value, GatewayError> {
    let p: SignInPayload = parse_payload(payload)?;
    let data = state.backend.sign_in(&p.email, &p.password).await?;
    Ok(serde_json::to_value(data)?)
}

#[derive(Deserialize)]
struct SignUpPayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default, rename = "redirectTo")]
    redirect_to: Option<String>,
}

async fn sign_up(state: &GatewayState, payload: Value) -> Result<Value, GatewayError> {
    let p: SignUpPayload = parse_payload(payload)?;
    let (Some(email), Some(password)) = (non_empty(p.email), non_empty(p.password)) else {
        return Err(GatewayError::BadRequest(
            "Missing email or password".to_string(),
        ));
    };
    let redirect = p.redirect_to.unwrap_or_else(|| state.site_url.clone());

    let data = state
        .backend
        .sign_up(&email, &password, p.display_name.as_deref(), &redirect)
        .await?;

    // Seed the public profile row for the fresh account. The account
    // already exists at this point, so a failed upsert is logged rather
    // than surfaced.
    if let (Some(user), Some(display_name)) = (&data.user, non_empty(p.display_name)) {
        let row = ProfileUpsert {
            id: user.id.clone(),
            email: email.clone(),
            display_name: display_name.trim().to_string(),
            role: "USER".to_string(),
        };
        if let Err(e) = state.backend.upsert_profile(&row).await {
            warn!(error = %e, email = %email, "profile upsert after signup failed");
        }
    }

    Ok(serde_json::to_value(data)?)
}

async fn sign_out(state: &GatewayState, bearer: Option<&str>) -> Result<Value, GatewayError> {
    state.backend.sign_out(bearer).await?;
    Ok(json!({ "success": true }))
}

#[derive(Deserialize)]
struct RefreshPayload {
    #[serde(default)]
    refresh_token: Option<String>,
}

async fn refresh_session(state: &GatewayState, payload: Value) -> Result<Value, GatewayError> {
    let p: RefreshPayload = parse_payload(payload)?;
    let Some(refresh_token) = non_empty(p.refresh_token) else {
        return Err(GatewayError::BadRequest("Missing refresh_token".to_string()));
    };
    let data = state
        .backend
        .refresh_session(&refresh_token)
        .await
        .map_err(|e| match e {
            BackendError::Transport(e) => GatewayError::Internal(e.to_string()),
            other => GatewayError::RefreshFailed(other.to_string()),
        })?;
    Ok(serde_json::to_value(data)?)
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

async fn get_profile(
    state: &GatewayState,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    let user = require_user(user)?;
    let profile = state.backend.profile(bearer, &user.id).await?;
    Ok(serde_json::to_value(profile)?)
}

async fn get_user_role(
    state: &GatewayState,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    let user = require_user(user)?;
    let profile = state.backend.profile(bearer, &user.id).await?;
    Ok(json!({ "role": profile.role }))
}

// ---------------------------------------------------------------------------
// Voice profiles
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct VoiceProfileLookup {
    #[serde(default)]
    email: Option<String>,
}

async fn get_voice_profile(
    state: &GatewayState,
    payload: Value,
    bearer: Option<&str>,
) -> Result<Value, GatewayError> {
    let p: VoiceProfileLookup = parse_payload(payload)?;
    let Some(email) = non_empty(p.email) else {
        return Err(GatewayError::BadRequest("Missing email".to_string()));
    };
    let row = state.backend.voice_profile(bearer, &email).await?;
    Ok(row.unwrap_or(Value::Null))
}

#[derive(Deserialize)]
struct CreateVoiceProfilePayload {
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    voice_sample_url: Option<String>,
}

async fn create_voice_profile(
    state: &GatewayState,
    payload: Value,
) -> Result<Value, GatewayError> {
    let p: CreateVoiceProfilePayload = parse_payload(payload)?;
    let Some(user_email) = non_empty(p.user_email) else {
        return Err(GatewayError::BadRequest("Missing user_email".to_string()));
    };
    let row = VoiceProfileUpsert {
        user_email,
        display_name: p.display_name,
        voice_sample_url: p.voice_sample_url,
        status: "pending".to_string(),
    };
    Ok(state.backend.create_voice_profile(&row).await?)
}

#[derive(Deserialize)]
struct UpdatesPayload {
    #[serde(default)]
    updates: Option<Value>,
}

async fn update_voice_profile(
    state: &GatewayState,
    payload: Value,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    let user = require_user(user)?;
    let p: UpdatesPayload = parse_payload(payload)?;
    let Some(updates) = p.updates else {
        return Err(GatewayError::BadRequest("Missing updates".to_string()));
    };
    Ok(state
        .backend
        .update_voice_profile(bearer, &user.email, &updates)
        .await?)
}

// ---------------------------------------------------------------------------
// Voice preferences
// ---------------------------------------------------------------------------

async fn get_voice_preferences(
    state: &GatewayState,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    let user = require_user(user)?;
    let row = state.backend.voice_preferences(bearer, &user.email).await?;
    Ok(row.unwrap_or(Value::Null))
}

async fn update_voice_preferences(
    state: &GatewayState,
    payload: Value,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    let user = require_user(user)?;
    let p: UpdatesPayload = parse_payload(payload)?;
    let Some(updates) = p.updates else {
        return Err(GatewayError::BadRequest("Missing updates".to_string()));
    };
    Ok(state
        .backend
        .upsert_voice_preferences(bearer, &user.email, &updates)
        .await?)
}

// ---------------------------------------------------------------------------
// Community voices
// ---------------------------------------------------------------------------

async fn get_community_voices(
    state: &GatewayState,
    bearer: Option<&str>,
) -> Result<Value, GatewayError> {
    let rows = state.backend.community_voices(bearer).await?;
    Ok(Value::Array(rows))
}

#[derive(Deserialize)]
struct JoinCommunityPayload {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

async fn join_community_voices(
    state: &GatewayState,
    payload: Value,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    let user = require_user(user)?;
    let p: JoinCommunityPayload = parse_payload(payload)?;
    let row = CommunityVoiceUpsert {
        owner_email: user.email.clone(),
        display_name: non_empty(p.display_name)
            .unwrap_or_else(|| user.email_local_part().to_string()),
        description: non_empty(p.description).unwrap_or_else(|| "Community voice".to_string()),
    };
    Ok(state.backend.join_community_voices(bearer, &row).await?)
}

async fn leave_community_voices(
    state: &GatewayState,
    bearer: Option<&str>,
    user: Option<&AuthUser>,
) -> Result<Value, GatewayError> {
    let user = require_user(user)?;
    state
        .backend
        .leave_community_voices(bearer, &user.email)
        .await?;
    Ok(json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// Pattern requests
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PatternRequestPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    pattern_request: Option<String>,
}

async fn submit_pattern_request(
    state: &GatewayState,
    payload: Value,
) -> Result<Value, GatewayError> {
    let p: PatternRequestPayload = parse_payload(payload)?;
    let (Some(name), Some(pattern_request)) = (non_empty(p.name), non_empty(p.pattern_request))
    else {
        return Err(GatewayError::BadRequest(
            "Missing name or pattern_request".to_string(),
        ));
    };
    let row = PatternRequestInsert {
        name,
        email: non_empty(p.email),
        pattern_request,
        status: "pending".to_string(),
    };
    Ok(state.backend.submit_pattern_request(&row).await?)
}

async fn get_pattern_requests(
    state: &GatewayState,
    bearer: Option<&str>,
) -> Result<Value, GatewayError> {
    let rows = state.backend.approved_pattern_requests(bearer).await?;
    Ok(Value::Array(rows))
}

// ---------------------------------------------------------------------------
// Ads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AdsPayload {
    #[serde(default)]
    zone: Option<String>,
}

async fn get_ads(
    state: &GatewayState,
    payload: Value,
    bearer: Option<&str>,
) -> Result<Value, GatewayError> {
    let p: AdsPayload = parse_payload(payload)?;
    let rows = state.backend.ads(bearer, p.zone.as_deref()).await?;
    Ok(Value::Array(rows))
}
