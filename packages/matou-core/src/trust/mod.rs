//! # Trust Graph
//!
//! The derived trust graph over the organisation: nodes are identifiers,
//! edges are credentials, weights come from a configurable scoring
//! formula.
//!
//! The graph is never mutated in place. Every build reads the credential
//! cache once and produces a fresh immutable [`TrustGraph`]; a short TTL
//! cache (≤ 5 s) absorbs request bursts, and routing invalidates it after
//! every append. That keeps reads snapshot-consistent and invalidation a
//! one-liner.

mod graph;
mod score;

pub use graph::{TrustEdge, TrustGraph, TrustNode};
pub use score::{ScoreWeights, TrustScore, TrustSummary};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::storage::Database;

/// Upper bound on the graph cache TTL
const MAX_TTL: Duration = Duration::from_secs(5);

struct CachedGraph {
    built_at: Instant,
    org_id: String,
    graph: Arc<TrustGraph>,
}

/// Cached access to the trust graph and its scores
pub struct TrustService {
    db: Database,
    weights: ScoreWeights,
    ttl: Duration,
    cache: Mutex<Option<CachedGraph>>,
}

impl TrustService {
    /// Serve graphs built from the given credential cache
    pub fn new(db: Database, weights: ScoreWeights, ttl: Duration) -> Self {
        Self {
            db,
            weights,
            ttl: ttl.min(MAX_TTL),
            cache: Mutex::new(None),
        }
    }

    /// The scoring weights in effect
    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Get the current graph, rebuilding if the cache is stale.
    pub fn graph(&self, org_id: &str) -> Result<Arc<TrustGraph>> {
        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.org_id == org_id && cached.built_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&cached.graph));
                }
            }
        }

        let credentials = self.db.get_all_credentials()?;
        let graph = Arc::new(TrustGraph::build(org_id, &credentials));

        *self.cache.lock() = Some(CachedGraph {
            built_at: Instant::now(),
            org_id: org_id.to_string(),
            graph: Arc::clone(&graph),
        });
        Ok(graph)
    }

    /// Drop the cached graph; the next read rebuilds.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    /// Score one node
    pub fn score(&self, org_id: &str, aid: &str) -> Result<TrustScore> {
        self.graph(org_id)?
            .score(aid, &self.weights)
            .ok_or_else(|| Error::CredentialNotFound(format!("Identifier {} not in trust graph", aid)))
    }

    /// All scores, highest first
    pub fn top_scores(&self, org_id: &str, limit: Option<usize>) -> Result<Vec<TrustScore>> {
        Ok(self.graph(org_id)?.top_scores(limit, &self.weights))
    }

    /// Aggregate summary
    pub fn summary(&self, org_id: &str) -> Result<TrustSummary> {
        Ok(self.graph(org_id)?.summary(&self.weights))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;

    fn service_with_membership() -> TrustService {
        let db = Database::open(None).unwrap();
        db.insert_credential(&Credential {
            said: "ESAID001".into(),
            issuer_id: "EORG123".into(),
            recipient_id: "EUSER1".into(),
            schema_id: "membership".into(),
            data: serde_json::Value::Null,
            timestamp: 1_700_000_000,
            signature: None,
            expires_at: None,
        })
        .unwrap();
        TrustService::new(db, ScoreWeights::default(), Duration::from_secs(5))
    }

    #[test]
    fn test_graph_reads_credential_cache() {
        let service = service_with_membership();
        let graph = service.graph("EORG123").unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_cache_reused_until_invalidated() {
        let service = service_with_membership();

        let g1 = service.graph("EORG123").unwrap();
        let g2 = service.graph("EORG123").unwrap();
        assert!(Arc::ptr_eq(&g1, &g2));

        service.invalidate();
        let g3 = service.graph("EORG123").unwrap();
        assert!(!Arc::ptr_eq(&g1, &g3));
    }

    #[test]
    fn test_cache_keyed_by_org() {
        let service = service_with_membership();

        let g1 = service.graph("EORG123").unwrap();
        let g2 = service.graph("EOTHERORG").unwrap();
        assert!(!Arc::ptr_eq(&g1, &g2));
        assert_eq!(g2.org_id, "EOTHERORG");
    }

    #[test]
    fn test_score_unknown_aid() {
        let service = service_with_membership();
        assert!(service.score("EORG123", "ENOBODY").is_err());
    }
}
