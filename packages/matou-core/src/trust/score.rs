//! Trust scoring over the built graph.
//!
//! ```text
//! score(v) = I(v)·w_I + U(v)·w_U + B(v)·w_B + O(v)·w_O − max(0, D(v))·w_D
//!
//!   I(v)  incoming edges
//!   U(v)  distinct issuers into v
//!   B(v)  bidirectional neighbours
//!   O(v)  incoming edges issued by the org
//!   D(v)  depth from the org (−1 unreachable ⇒ no penalty)
//! ```
//!
//! Scores clamp at zero. Top-N ordering breaks ties by node id so results
//! are deterministic.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::graph::TrustGraph;

/// Configurable scoring weights
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of incoming edges
    pub incoming: f64,
    /// Weight of distinct issuers
    pub distinct_issuers: f64,
    /// Weight of bidirectional neighbours
    pub bidirectional: f64,
    /// Weight of org-issued edges
    pub org_issued: f64,
    /// Per-hop depth penalty
    pub depth_penalty: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            incoming: 1.0,
            distinct_issuers: 2.0,
            bidirectional: 3.0,
            org_issued: 2.0,
            depth_penalty: 0.1,
        }
    }
}

/// Score of one node with its factor breakdown
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustScore {
    /// The scored identifier
    pub id: String,
    /// Final clamped score
    pub score: f64,
    /// `I(v)`
    pub incoming: usize,
    /// `U(v)`
    pub distinct_issuers: usize,
    /// `B(v)`
    pub bidirectional_neighbors: usize,
    /// `O(v)`
    pub org_issued: usize,
    /// `D(v)`; `-1` if unreachable from the org
    pub depth: i64,
}

/// Aggregate graph statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustSummary {
    /// Node count
    pub total_nodes: usize,
    /// Edge count
    pub total_edges: usize,
    /// Mean node score
    pub mean_score: f64,
    /// Highest node score
    pub max: f64,
    /// Lowest node score
    pub min: f64,
    /// Median depth over reachable nodes
    pub median_depth: f64,
    /// Mutual relations, each counted once
    pub bidirectional_pairs: usize,
}

impl TrustGraph {
    /// Score a single node; `None` if the id is not in the graph.
    pub fn score(&self, aid: &str, weights: &ScoreWeights) -> Option<TrustScore> {
        let node = self.nodes.get(aid)?;

        let mut incoming = 0usize;
        let mut issuers = HashSet::new();
        let mut org_issued = 0usize;
        let mut mutual_neighbors = HashSet::new();

        for edge in &self.edges {
            if edge.to == aid {
                incoming += 1;
                issuers.insert(edge.from.as_str());
                if edge.from == self.org_id {
                    org_issued += 1;
                }
            }
            if edge.bidirectional {
                if edge.to == aid {
                    mutual_neighbors.insert(edge.from.as_str());
                } else if edge.from == aid {
                    mutual_neighbors.insert(edge.to.as_str());
                }
            }
        }

        let depth = node.depth;
        let penalty = if depth > 0 { depth as f64 } else { 0.0 };

        let raw = incoming as f64 * weights.incoming
            + issuers.len() as f64 * weights.distinct_issuers
            + mutual_neighbors.len() as f64 * weights.bidirectional
            + org_issued as f64 * weights.org_issued
            - penalty * weights.depth_penalty;

        Some(TrustScore {
            id: aid.to_string(),
            score: raw.max(0.0),
            incoming,
            distinct_issuers: issuers.len(),
            bidirectional_neighbors: mutual_neighbors.len(),
            org_issued,
            depth,
        })
    }

    /// All node scores, highest first, ties stable by node id.
    pub fn top_scores(&self, limit: Option<usize>, weights: &ScoreWeights) -> Vec<TrustScore> {
        let mut scores: Vec<TrustScore> = self
            .nodes
            .keys()
            .filter_map(|id| self.score(id, weights))
            .collect();

        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(n) = limit {
            scores.truncate(n);
        }
        scores
    }

    /// Aggregate statistics over the whole graph.
    pub fn summary(&self, weights: &ScoreWeights) -> TrustSummary {
        let scores = self.top_scores(None, weights);

        let (mean, max, min) = if scores.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = scores.iter().map(|s| s.score).sum();
            (
                sum / scores.len() as f64,
                scores.first().map(|s| s.score).unwrap_or(0.0),
                scores.last().map(|s| s.score).unwrap_or(0.0),
            )
        };

        let mut depths: Vec<i64> = self
            .nodes
            .values()
            .map(|n| n.depth)
            .filter(|&d| d >= 0)
            .collect();
        depths.sort_unstable();
        let median_depth = match depths.len() {
            0 => 0.0,
            n if n % 2 == 1 => depths[n / 2] as f64,
            n => (depths[n / 2 - 1] + depths[n / 2]) as f64 / 2.0,
        };

        TrustSummary {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            mean_score: mean,
            max,
            min,
            median_depth,
            bidirectional_pairs: self.bidirectional_pairs(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;

    fn credential(said: &str, issuer: &str, recipient: &str, schema: &str) -> Credential {
        Credential {
            said: said.into(),
            issuer_id: issuer.into(),
            recipient_id: recipient.into(),
            schema_id: schema.into(),
            data: serde_json::Value::Null,
            timestamp: 1_700_000_000,
            signature: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_single_membership_score() {
        // I=1, U=1, B=0, O=1, D=1 ⇒ 1·1 + 1·2 + 0·3 + 1·2 − 1·0.1 = 4.9
        let graph = TrustGraph::build(
            "EORG123",
            &[credential("ESAID001", "EORG123", "EUSER1", "membership")],
        );

        let score = graph.score("EUSER1", &ScoreWeights::default()).unwrap();
        assert_eq!(score.incoming, 1);
        assert_eq!(score.distinct_issuers, 1);
        assert_eq!(score.bidirectional_neighbors, 0);
        assert_eq!(score.org_issued, 1);
        assert_eq!(score.depth, 1);
        assert!((score.score - 4.9).abs() < 1e-9);
    }

    #[test]
    fn test_score_monotonicity() {
        let base = vec![credential("ESAID001", "EORG123", "EUSER1", "membership")];
        let graph = TrustGraph::build("EORG123", &base);
        let base_score = graph.score("EUSER1", &ScoreWeights::default()).unwrap().score;

        // One more incoming edge from a distinct issuer never lowers the score
        let mut more = base.clone();
        more.push(credential("ESAID002", "EUSER9", "EUSER1", "invitation"));
        let graph = TrustGraph::build("EORG123", &more);
        let more_score = graph.score("EUSER1", &ScoreWeights::default()).unwrap().score;
        assert!(more_score >= base_score);

        // A mutual edge raises it further
        let mut mutual = more.clone();
        mutual.push(credential("ESAID003", "EUSER1", "EUSER9", "invitation"));
        let graph = TrustGraph::build("EORG123", &mutual);
        let mutual_score = graph.score("EUSER1", &ScoreWeights::default()).unwrap().score;
        assert!(mutual_score >= more_score);
    }

    #[test]
    fn test_unreachable_depth_not_penalised() {
        let graph = TrustGraph::build(
            "EORG123",
            &[credential("ESAID001", "EUSERX", "EUSERY", "invitation")],
        );

        let score = graph.score("EUSERY", &ScoreWeights::default()).unwrap();
        assert_eq!(score.depth, -1);
        // I=1, U=1 ⇒ 3.0 with no penalty applied
        assert!((score.score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let weights = ScoreWeights {
            incoming: 0.0,
            distinct_issuers: 0.0,
            bidirectional: 0.0,
            org_issued: 0.0,
            depth_penalty: 10.0,
        };
        let graph = TrustGraph::build(
            "EORG123",
            &[credential("ESAID001", "EORG123", "EUSER1", "membership")],
        );

        assert_eq!(graph.score("EUSER1", &weights).unwrap().score, 0.0);
    }

    #[test]
    fn test_top_scores_stable_order() {
        // Two users with identical factors: ties break by id
        let graph = TrustGraph::build(
            "EORG123",
            &[
                credential("ESAID001", "EORG123", "EUSER2", "membership"),
                credential("ESAID002", "EORG123", "EUSER1", "membership"),
            ],
        );

        let scores = graph.top_scores(None, &ScoreWeights::default());
        let tied: Vec<&str> = scores
            .iter()
            .filter(|s| s.id != "EORG123")
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(tied, vec!["EUSER1", "EUSER2"]);

        let limited = graph.top_scores(Some(1), &ScoreWeights::default());
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_summary() {
        let graph = TrustGraph::build(
            "EORG123",
            &[
                credential("ESAID001", "EORG123", "EUSER1", "membership"),
                credential("ESAID002", "EORG123", "EUSER2", "membership"),
                credential("ESAID003", "EUSER1", "EUSER2", "invitation"),
                credential("ESAID004", "EUSER2", "EUSER1", "invitation"),
            ],
        );

        let summary = graph.summary(&ScoreWeights::default());
        assert_eq!(summary.total_nodes, 3);
        assert_eq!(summary.total_edges, 4);
        assert_eq!(summary.bidirectional_pairs, 1);
        assert!((summary.median_depth - 1.0).abs() < 1e-9);
        assert!(summary.max >= summary.mean_score);
        assert!(summary.mean_score >= summary.min);
    }
}
