//! Endorsement endpoints.
//!
//! Endorsements are credentials under the endorsement schema with their
//! claim fields lifted out. They land in two places: the endorsement
//! cache (for the received/issued views and revocation bookkeeping) and
//! the credential cache (so the trust graph grows an endorsement edge).
//! Revocation is recorded as a new credential, never enforced
//! cryptographically.

use axum::extract::{Path, State};
use axum::Json;
use matou_core::credentials::schema::said as schema_said;
use matou_core::{Credential, Endorsement, Error};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// One endorsement in a sync batch
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndorsementBody {
    pub said: String,
    pub endorser_id: String,
    pub endorsee_id: String,
    pub claim: String,
    pub confidence: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// POST /endorsements/sync
#[derive(Debug, Deserialize)]
pub struct SyncEndorsementsRequest {
    pub endorsements: Vec<EndorsementBody>,
}

/// POST /endorsements/revoke
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    /// SAID of the endorsement being revoked
    pub said: String,
    /// SAID of the revocation credential
    pub revocation_said: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /endorsements/sync — ingest endorsements from the client.
pub async fn sync(
    State(state): State<AppState>,
    Json(req): Json<SyncEndorsementsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut stored = 0usize;
    for body in req.endorsements {
        if !(0.0..=1.0).contains(&body.confidence) {
            return Err(Error::InvalidCredential(format!(
                "Endorsement {} confidence {} outside [0, 1]",
                body.said, body.confidence
            ))
            .into());
        }

        let timestamp = body
            .timestamp
            .unwrap_or_else(matou_core::time::now_timestamp);

        state.db().upsert_endorsement(&Endorsement {
            said: body.said.clone(),
            endorser_id: body.endorser_id.clone(),
            endorsee_id: body.endorsee_id.clone(),
            claim: body.claim.clone(),
            confidence: body.confidence,
            timestamp,
            revoked: false,
            revoked_at: None,
            revocation_said: None,
            revocation_reason: None,
        })?;

        // Mirror into the credential cache so the graph grows an edge
        state.db().insert_credential(&Credential {
            said: body.said,
            issuer_id: body.endorser_id,
            recipient_id: body.endorsee_id,
            schema_id: schema_said::ENDORSEMENT.to_string(),
            data: json!({ "claim": body.claim, "confidence": body.confidence }),
            timestamp,
            signature: None,
            expires_at: None,
        })?;
        stored += 1;
    }

    state.trust().invalidate();
    Ok(Json(json!({ "success": true, "stored": stored })))
}

/// POST /endorsements/revoke — record a revocation.
pub async fn revoke(
    State(state): State<AppState>,
    Json(req): Json<RevokeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let endorsement = state
        .db()
        .get_endorsement(&req.said)?
        .ok_or(Error::EndorsementNotFound(req.said.clone()))?;

    let now = matou_core::time::now_timestamp();
    state.db().mark_endorsement_revoked(
        &req.said,
        &req.revocation_said,
        req.reason.as_deref(),
        now,
    )?;

    // The revocation is itself a credential in the cache
    state.db().insert_credential(&Credential {
        said: req.revocation_said.clone(),
        issuer_id: endorsement.endorser_id,
        recipient_id: endorsement.endorsee_id,
        schema_id: schema_said::REVOCATION.to_string(),
        data: json!({
            "revokes": req.said,
            "reason": req.reason,
        }),
        timestamp: now,
        signature: None,
        expires_at: None,
    })?;

    state.trust().invalidate();
    Ok(Json(json!({ "success": true, "said": req.said })))
}

/// GET /endorsements/:aid — endorsements received by an identifier.
pub async fn received(
    State(state): State<AppState>,
    Path(aid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let endorsements = state.db().endorsements_for(&aid)?;
    Ok(Json(json!({ "aid": aid, "endorsements": endorsements })))
}

/// GET /endorsements/issued/:aid — endorsements issued by an identifier.
pub async fn issued(
    State(state): State<AppState>,
    Path(aid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let endorsements = state.db().endorsements_issued_by(&aid)?;
    Ok(Json(json!({ "aid": aid, "endorsements": endorsements })))
}
