//! Identity endpoints.
//!
//! `POST /identity/set` drives the identity swapper: it takes the write
//! side of the services lock (excluding all space operations for the
//! duration) and replaces the runtime on success. A second swap arriving
//! while one runs is rejected with `busy` rather than queued, identical
//! mnemonic or not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use matou_core::events::{Event, EventType};
use matou_core::{Error, SwapRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /identity/set
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetIdentityRequest {
    pub aid: String,
    pub mnemonic: String,
    #[serde(default)]
    pub org_aid: Option<String>,
    #[serde(default)]
    pub community_space_id: Option<String>,
    #[serde(default)]
    pub read_only_space_id: Option<String>,
    #[serde(default)]
    pub admin_space_id: Option<String>,
    #[serde(default)]
    pub credential_said: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetIdentityResponse {
    pub success: bool,
    pub peer_id: String,
    pub private_space_id: String,
}

/// Releases the busy gate when the swap handler returns, on every path.
struct GateGuard<'a>(&'a AtomicBool);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// POST /identity/set — re-key the running service.
pub async fn set_identity(
    State(state): State<AppState>,
    Json(req): Json<SetIdentityRequest>,
) -> ApiResult<Json<SetIdentityResponse>> {
    if req.aid.is_empty() {
        return Err(Error::InvalidIdentifier("aid is required".into()).into());
    }
    if req.mnemonic.trim().is_empty() {
        return Err(Error::InvalidMnemonic("mnemonic is required".into()).into());
    }

    if state
        .swap_gate()
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(Error::SwapInProgress.into());
    }
    let _gate = GateGuard(state.swap_gate());

    // Write side: no space operation proceeds while the swap runs
    let mut services = state.services().write().await;
    let old_runtime = services.as_ref().map(|s| Arc::clone(&s.runtime));

    let result = state
        .swapper()
        .swap(
            old_runtime,
            SwapRequest {
                aid: req.aid.clone(),
                mnemonic: req.mnemonic,
                org_aid: req.org_aid,
                community_space_id: req.community_space_id,
                readonly_space_id: req.read_only_space_id,
                admin_space_id: req.admin_space_id,
                credential_said: req.credential_said,
            },
        )
        .await?;

    *services = Some(state.build_services(Arc::clone(&result.runtime)));
    drop(services);

    state.events().broadcast(Event::new(
        EventType::Registration,
        json!({
            "aid": req.aid,
            "peerId": result.peer_id.to_string(),
            "privateSpaceId": result.private_space_id,
        }),
    ));

    Ok(Json(SetIdentityResponse {
        success: true,
        peer_id: result.peer_id.to_string(),
        private_space_id: result.private_space_id,
    }))
}

/// GET /identity — current identity, if configured.
pub async fn get_identity(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.identity().get() {
        Some(rec) => Json(json!({
            "configured": true,
            "aid": rec.aid,
            "peerId": rec.peer_id,
            "orgAid": rec.org_aid,
            "privateSpaceId": rec.private_space_id,
            "communitySpaceId": rec.community_space_id,
            "readOnlySpaceId": rec.readonly_space_id,
            "adminSpaceId": rec.admin_space_id,
            "credentialSaid": rec.credential_said,
        })),
        None => Json(json!({ "configured": false })),
    }
}

/// DELETE /identity — clear the identity store and drop the runtime.
pub async fn delete_identity(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let mut services = state.services().write().await;
    if let Some(s) = services.take() {
        if let Err(e) = s.runtime.close().await {
            tracing::warn!(error = %e, "Runtime close on identity delete failed");
        }
    }
    drop(services);

    state.identity().clear()?;
    Ok(Json(json!({ "success": true })))
}
