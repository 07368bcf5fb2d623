//! Credential endpoints: cache reads, single-credential ingest, bulk sync
//! from KERI exchanges, structural validation, role extraction, and the
//! key-event-log cache.

use axum::extract::{Path, Query, State};
use axum::Json;
use matou_core::credentials::CredentialSchema;
use matou_core::{Credential, Error};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// Wire form of a credential as the client sends it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBody {
    pub said: String,
    pub issuer: String,
    pub recipient: String,
    pub schema: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl CredentialBody {
    fn into_credential(self) -> Credential {
        Credential {
            said: self.said,
            issuer_id: self.issuer,
            recipient_id: self.recipient,
            schema_id: self.schema,
            data: self.data,
            timestamp: self.timestamp.unwrap_or_else(matou_core::time::now_timestamp),
            signature: self.signature,
            expires_at: self.expires_at,
        }
    }
}

/// POST /sync/credentials
#[derive(Debug, Deserialize)]
pub struct SyncCredentialsRequest {
    pub credentials: Vec<CredentialBody>,
}

/// POST /sync/kel
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncKelRequest {
    pub aid: String,
    pub events: Vec<KelEventBody>,
}

/// One key event in a sync batch
#[derive(Debug, Deserialize)]
pub struct KelEventBody {
    pub sequence: i64,
    pub event: serde_json::Value,
}

/// Optional recipient filter on credential listing
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub aid: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CredentialView {
    said: String,
    issuer: String,
    recipient: String,
    schema: String,
    data: serde_json::Value,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

impl From<Credential> for CredentialView {
    fn from(cred: Credential) -> Self {
        Self {
            said: cred.said,
            issuer: cred.issuer_id,
            recipient: cred.recipient_id,
            schema: cred.schema_id,
            data: cred.data,
            timestamp: cred.timestamp,
            expires_at: cred.expires_at,
        }
    }
}

/// GET /credentials — cached credentials, optionally for one recipient.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let credentials = match &query.aid {
        Some(aid) => state.db().get_credentials_for(aid)?,
        None => state.db().get_all_credentials()?,
    };

    let views: Vec<CredentialView> = credentials.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "credentials": views })))
}

/// GET /credentials/:said — one cached credential.
pub async fn get(
    State(state): State<AppState>,
    Path(said): Path<String>,
) -> ApiResult<Json<CredentialView>> {
    let cred = state
        .db()
        .get_credential(&said)?
        .ok_or(Error::CredentialNotFound(said))?;
    Ok(Json(cred.into()))
}

/// POST /credentials — ingest a single credential and route it.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CredentialBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let cred = body.into_credential();
    cred.validate_structure()?;

    let manager = state.manager().await?;
    let recipient = cred.recipient_id.clone();
    let outcome = manager.route_credential(&cred, &recipient).await?;

    Ok(Json(json!({
        "success": true,
        "said": cred.said,
        "synced": outcome.synced.len(),
        "failed": outcome.failed.len(),
        "errors": outcome.failed,
    })))
}

/// POST /credentials/validate — structural check only.
pub async fn validate(Json(body): Json<CredentialBody>) -> Json<serde_json::Value> {
    let cred = body.into_credential();
    match cred.validate_structure() {
        Ok(()) => Json(json!({ "valid": true, "schema": cred.schema().name() })),
        Err(e) => Json(json!({ "valid": false, "error": e.to_string() })),
    }
}

/// GET /credentials/roles — roles the local user holds.
///
/// Derived from cached membership and steward credentials; the `role`
/// field of the opaque data map is honoured when present.
pub async fn roles(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let record = state.identity().require()?;
    let credentials = state.db().get_credentials_for(&record.aid)?;

    let mut roles: Vec<String> = Vec::new();
    for cred in &credentials {
        let role = match cred.schema() {
            CredentialSchema::Steward => Some("steward".to_string()),
            CredentialSchema::Membership => Some(
                cred.data_field("role")
                    .unwrap_or("member")
                    .to_string(),
            ),
            _ => None,
        };
        if let Some(role) = role {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
    }

    Ok(Json(json!({ "aid": record.aid, "roles": roles })))
}

/// POST /sync/credentials — bulk ingest after a KERI exchange.
///
/// Every credential is routed independently; one failing destination
/// neither stops the remaining destinations nor the remaining
/// credentials. The batch reports per-credential counts.
pub async fn sync_credentials(
    State(state): State<AppState>,
    Json(req): Json<SyncCredentialsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = state.manager().await?;

    let mut synced = 0usize;
    let mut failed = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for body in req.credentials {
        let cred = body.into_credential();
        if let Err(e) = cred.validate_structure() {
            failed += 1;
            errors.push(format!("{}: {}", cred.said, e));
            continue;
        }

        let recipient = cred.recipient_id.clone();
        match manager.route_credential(&cred, &recipient).await {
            Ok(outcome) => {
                // Partial failures are surfaced without failing the
                // credential, as long as something was reached
                if outcome.synced.is_empty() && !outcome.failed.is_empty() {
                    failed += 1;
                } else {
                    synced += 1;
                }
                for f in outcome.failed {
                    errors.push(format!("{}: {} ({})", cred.said, f.error, f.space_id));
                }
            }
            Err(e) => {
                failed += 1;
                errors.push(format!("{}: {}", cred.said, e));
            }
        }
    }

    Ok(Json(json!({
        "success": true,
        "synced": synced,
        "failed": failed,
        "errors": errors,
    })))
}

/// POST /sync/kel — store key events, idempotent per (aid, sequence).
pub async fn sync_kel(
    State(state): State<AppState>,
    Json(req): Json<SyncKelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.aid.is_empty() {
        return Err(Error::InvalidIdentifier("aid is required".into()).into());
    }

    let mut stored = 0usize;
    let mut duplicates = 0usize;
    for event in &req.events {
        let raw = serde_json::to_string(&event.event)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if state.db().insert_kel_event(&req.aid, event.sequence, &raw)? {
            stored += 1;
        } else {
            duplicates += 1;
        }
    }

    Ok(Json(json!({
        "success": true,
        "stored": stored,
        "duplicates": duplicates,
    })))
}

/// GET /sync/kel/:aid — the stored key event log, in sequence order.
pub async fn get_kel(
    State(state): State<AppState>,
    Path(aid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let events = state.db().kel_for(&aid)?;
    Ok(Json(json!({ "aid": aid, "events": events })))
}
