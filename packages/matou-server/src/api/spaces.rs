//! Space lifecycle endpoints.

use axum::extract::{Query, State};
use axum::Json;
use base64::Engine;
use matou_core::spaces::AclPolicy;
use matou_core::sync::Permissions;
use matou_core::{Error, SpaceStore};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /spaces/community
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommunityRequest {
    pub org_aid: String,
    pub org_name: String,
}

/// POST /spaces/private
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrivateRequest {
    pub aid: String,
}

/// POST /spaces/community/invite
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub aid: String,
    pub credential_said: String,
}

/// POST /spaces/community/join
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub space_id: String,
    pub invite_key: String,
    /// Optional opaque member metadata, base64
    #[serde(default)]
    pub metadata: Option<String>,
}

/// GET query naming a user
#[derive(Debug, Deserialize)]
pub struct AidQuery {
    pub aid: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpaceView {
    space_id: String,
    owner_id: String,
    space_type: String,
    created_at: i64,
}

/// POST /spaces/community — create (or recover) the org community space.
pub async fn create_community(
    State(state): State<AppState>,
    Json(req): Json<CreateCommunityRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = state.manager().await?;
    let space_id = manager
        .create_community_space(&req.org_aid, &req.org_name)
        .await?;

    state.identity().update(|rec| {
        rec.org_aid = Some(req.org_aid.clone());
        rec.community_space_id = Some(space_id.clone());
    })?;

    Ok(Json(json!({ "success": true, "spaceId": space_id })))
}

/// POST /spaces/private — create (or recover) the user's private space.
pub async fn create_private(
    State(state): State<AppState>,
    Json(req): Json<CreatePrivateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = state.manager().await?;
    let space_id = manager.get_or_create_private_space(&req.aid).await?;

    state
        .identity()
        .update(|rec| rec.private_space_id = Some(space_id.clone()))?;

    Ok(Json(json!({ "success": true, "spaceId": space_id })))
}

/// POST /spaces/community/invite — mint an open invite for a member.
pub async fn invite(
    State(state): State<AppState>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = state.manager().await?;
    let invite_key = manager
        .invite_to_community(&req.aid, &req.credential_said)
        .await?;

    // The caller transports the key via a KERI exchange message
    Ok(Json(json!({ "success": true, "inviteKey": invite_key })))
}

/// POST /spaces/community/join — join a space with an invite key.
pub async fn join(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let metadata = match &req.metadata {
        Some(b64) => base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| Error::InvalidInvite(format!("Bad metadata encoding: {}", e)))?,
        None => Vec::new(),
    };

    let manager = state.manager().await?;
    manager
        .join_community(&req.space_id, &req.invite_key, &metadata)
        .await?;

    Ok(Json(json!({ "success": true, "spaceId": req.space_id })))
}

/// GET /spaces/community/verify-access — advisory membership check.
pub async fn verify_access(
    State(state): State<AppState>,
    Query(query): Query<AidQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = state.manager().await?;
    let has_credential = manager.verify_community_access(&query.aid)?;

    let permissions: Permissions =
        matou_core::spaces::AclManager::validate_access(AclPolicy::Community, false, has_credential);

    Ok(Json(json!({
        "aid": query.aid,
        "hasAccess": has_credential,
        "permissions": permissions,
    })))
}

/// GET /spaces/user?aid=… — spaces recorded for an owner.
pub async fn user_spaces(
    State(state): State<AppState>,
    Query(query): Query<AidQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = SpaceStore::new(state.db().clone());
    let spaces: Vec<SpaceView> = store
        .all()?
        .into_iter()
        .filter(|rec| rec.owner_id == query.aid)
        .map(|rec| SpaceView {
            space_id: rec.space_id,
            owner_id: rec.owner_id,
            space_type: rec.space_type.as_str().to_string(),
            created_at: rec.created_at,
        })
        .collect();

    Ok(Json(json!({ "aid": query.aid, "spaces": spaces })))
}
