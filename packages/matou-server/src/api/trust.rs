//! Trust graph endpoints.
//!
//! All reads anchor on the configured org identifier and are served from
//! the short-TTL graph cache; routing invalidates it on every append.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /trust/graph query
#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    /// Subgraph anchor; full graph when absent
    #[serde(default)]
    pub aid: Option<String>,
    /// BFS hop bound; negative or absent means unbounded
    #[serde(default)]
    pub depth: Option<i64>,
    /// Attach the summary block
    #[serde(default)]
    pub summary: Option<bool>,
}

/// GET /trust/scores query
#[derive(Debug, Deserialize)]
pub struct ScoresQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /trust/graph — full graph or BFS subgraph, with optional summary.
pub async fn graph(
    State(state): State<AppState>,
    Query(query): Query<GraphQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let org_id = state.org_id()?;
    let full = state.trust().graph(&org_id)?;

    let graph = match &query.aid {
        Some(aid) => full.subgraph(aid, query.depth.unwrap_or(-1))?,
        None => (*full).clone(),
    };

    let mut response = json!({
        "orgId": graph.org_id,
        "nodes": graph.nodes,
        "edges": graph.edges,
    });
    if query.summary.unwrap_or(false) {
        response["summary"] = serde_json::to_value(graph.summary(state.trust().weights()))
            .unwrap_or(serde_json::Value::Null);
    }

    Ok(Json(response))
}

/// GET /trust/score/:aid — one node's score with its factor breakdown.
pub async fn score(
    State(state): State<AppState>,
    Path(aid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let org_id = state.org_id()?;
    let score = state.trust().score(&org_id, &aid)?;
    Ok(Json(json!(score)))
}

/// GET /trust/scores?limit=… — all scores, highest first.
pub async fn scores(
    State(state): State<AppState>,
    Query(query): Query<ScoresQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let org_id = state.org_id()?;
    let scores = state.trust().top_scores(&org_id, query.limit)?;
    Ok(Json(json!({ "scores": scores })))
}

/// GET /trust/summary — aggregate graph statistics.
pub async fn summary(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let org_id = state.org_id()?;
    let summary = state.trust().summary(&org_id)?;
    Ok(Json(json!(summary)))
}
