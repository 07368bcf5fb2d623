//! Org configuration endpoints.
//!
//! The organisation document (`org-config.yaml`) names the org, its
//! admins, the credential registry, and the org-owned space ids. Posting
//! it also refreshes the org fields of the identity record so routing
//! picks the space ids up immediately.

use std::fs;

use axum::extract::State;
use axum::Json;
use matou_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// One identified party (the org itself, or an admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgParty {
    pub aid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oobi: Option<String>,
}

/// Credential registry reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgRegistry {
    pub id: String,
    pub name: String,
}

/// The persisted org configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgConfig {
    pub organization: OrgParty,
    #[serde(default)]
    pub admins: Vec<OrgParty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<OrgRegistry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_space_id: Option<String>,
}

/// GET /org/config
pub async fn get_config(State(state): State<AppState>) -> ApiResult<Json<OrgConfig>> {
    let path = state.org_config_path();
    if !path.exists() {
        return Err(Error::OrgNotConfigured.into());
    }

    let raw = fs::read_to_string(&path)
        .map_err(|e| Error::StorageRead(format!("{}: {}", path.display(), e)))?;
    let config: OrgConfig = serde_yaml::from_str(&raw)
        .map_err(|e| Error::Corrupted(format!("{}: {}", path.display(), e)))?;
    Ok(Json(config))
}

/// POST /org/config
pub async fn set_config(
    State(state): State<AppState>,
    Json(config): Json<OrgConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    if config.organization.aid.is_empty() {
        return Err(Error::InvalidIdentifier("organization.aid is required".into()).into());
    }

    let yaml = serde_yaml::to_string(&config)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    let path = state.org_config_path();
    fs::write(&path, yaml)
        .map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;

    // Routing reads the org space ids off the identity record
    if state.identity().is_configured() {
        state.identity().update(|rec| {
            rec.org_aid = Some(config.organization.aid.clone());
            if config.community_space_id.is_some() {
                rec.community_space_id = config.community_space_id.clone();
            }
            if config.read_only_space_id.is_some() {
                rec.readonly_space_id = config.read_only_space_id.clone();
            }
            if config.admin_space_id.is_some() {
                rec.admin_space_id = config.admin_space_id.clone();
            }
        })?;
    }

    tracing::info!(org = config.organization.aid.as_str(), "Org configuration saved");
    Ok(Json(json!({ "success": true })))
}

/// DELETE /org/config
pub async fn delete_config(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let path = state.org_config_path();
    if path.exists() {
        fs::remove_file(&path)
            .map_err(|e| Error::StorageWrite(format!("{}: {}", path.display(), e)))?;
    }
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_config_yaml_round_trip() {
        let config = OrgConfig {
            organization: OrgParty {
                aid: "EORG123".into(),
                name: "Example Org".into(),
                oobi: Some("http://keri.example/oobi/EORG123".into()),
            },
            admins: vec![OrgParty {
                aid: "EADMIN1".into(),
                name: "Admin One".into(),
                oobi: None,
            }],
            registry: Some(OrgRegistry {
                id: "EREGISTRY".into(),
                name: "main".into(),
            }),
            community_space_id: Some("ECOMMUNITY".into()),
            read_only_space_id: Some("EREADONLY".into()),
            admin_space_id: None,
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: OrgConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(back.organization.aid, "EORG123");
        assert_eq!(back.admins.len(), 1);
        assert_eq!(back.community_space_id.as_deref(), Some("ECOMMUNITY"));
        assert!(back.admin_space_id.is_none());
    }
}
