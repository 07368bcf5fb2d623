//! Trust graph construction.
//!
//! The graph is rebuilt from the credential cache on demand: nodes are
//! identifiers, edges are credentials. Each build produces a fresh
//! immutable graph, so invalidation is trivial and reads are
//! snapshot-consistent.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::credentials::{route_for, Credential, CredentialSchema, EdgeType};
use crate::error::{Error, Result};

/// A node: one identifier seen in the credential cache
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustNode {
    /// The identifier
    pub id: String,
    /// Display alias, when a credential carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Best-known role ("organization", "steward", "member", …)
    pub role: String,
    /// Earliest join timestamp seen for this identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<i64>,
    /// Credentials naming this identifier as recipient
    pub credential_count: usize,
    /// Shortest-path distance from the org along outgoing edges;
    /// `0` for the org itself, `-1` if unreachable
    pub depth: i64,
}

/// An edge: one credential from issuer to recipient
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustEdge {
    /// Issuer identifier
    pub from: String,
    /// Recipient identifier
    pub to: String,
    /// SAID of the backing credential; unique per edge
    pub credential_id: String,
    /// Edge type derived from the credential schema
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Whether a reverse edge exists for some credential
    pub bidirectional: bool,
    /// Credential issuance timestamp
    pub created_at: i64,
}

/// Immutable directed trust graph over the organisation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustGraph {
    /// The organisation identifier (always present, depth 0)
    pub org_id: String,
    /// Nodes keyed by identifier (ordered for deterministic output)
    pub nodes: BTreeMap<String, TrustNode>,
    /// All edges, in credential cache order
    pub edges: Vec<TrustEdge>,
}

impl TrustGraph {
    /// Build a graph from the cached credentials.
    ///
    /// Malformed credentials are logged and skipped rather than aborting
    /// the build. Duplicate edges (same `credential_id`) are rejected on
    /// insert. Self-claims produce a node but no edge.
    pub fn build(org_id: &str, credentials: &[Credential]) -> Self {
        let mut graph = Self {
            org_id: org_id.to_string(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        };

        graph.ensure_node(org_id);
        if let Some(org) = graph.nodes.get_mut(org_id) {
            org.role = "organization".to_string();
        }

        let mut seen_credentials = HashSet::new();
        for cred in credentials {
            if cred.said.is_empty() || cred.issuer_id.is_empty() || cred.recipient_id.is_empty() {
                tracing::warn!(said = cred.said.as_str(), "Skipping malformed credential");
                continue;
            }

            let schema = cred.schema();
            let route = route_for(schema);

            graph.ensure_node(&cred.issuer_id);
            graph.ensure_node(&cred.recipient_id);
            graph.absorb_node_fields(cred, schema);

            if let Some(node) = graph.nodes.get_mut(&cred.recipient_id) {
                node.credential_count += 1;
            }

            if !route.produces_edge {
                continue;
            }
            // Duplicate edges for one credential are rejected
            if !seen_credentials.insert(cred.said.clone()) {
                continue;
            }

            graph.edges.push(TrustEdge {
                from: cred.issuer_id.clone(),
                to: cred.recipient_id.clone(),
                credential_id: cred.said.clone(),
                edge_type: route.edge_type,
                bidirectional: false,
                created_at: cred.timestamp,
            });
        }

        graph.mark_bidirectional();
        graph.compute_depths();
        graph
    }

    fn ensure_node(&mut self, id: &str) {
        self.nodes.entry(id.to_string()).or_insert_with(|| TrustNode {
            id: id.to_string(),
            alias: None,
            role: "member".to_string(),
            joined_at: None,
            credential_count: 0,
            depth: -1,
        });
    }

    /// Pull the well-known fields (`role`, `displayName`, `joinedAt`) out
    /// of the opaque credential body onto the recipient node.
    fn absorb_node_fields(&mut self, cred: &Credential, schema: CredentialSchema) {
        let node = match self.nodes.get_mut(&cred.recipient_id) {
            Some(n) => n,
            None => return,
        };

        if schema == CredentialSchema::Steward {
            node.role = "steward".to_string();
        } else if let Some(role) = cred.data_field("role") {
            if node.role == "member" {
                node.role = role.to_string();
            }
        }

        if node.alias.is_none() {
            node.alias = cred.data_field("displayName").map(str::to_string);
        }

        let joined = cred
            .data
            .get("joinedAt")
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));
        if let Some(ts) = joined {
            node.joined_at = Some(node.joined_at.map_or(ts, |prev| prev.min(ts)));
        }
    }

    /// Set `bidirectional` on each edge `(a → b)` iff some `(b → a)` edge
    /// exists.
    fn mark_bidirectional(&mut self) {
        let pairs: HashSet<(String, String)> = self
            .edges
            .iter()
            .map(|e| (e.from.clone(), e.to.clone()))
            .collect();

        for edge in &mut self.edges {
            edge.bidirectional = pairs.contains(&(edge.to.clone(), edge.from.clone()));
        }
    }

    /// BFS from the org along outgoing edges; unreachable nodes stay -1.
    fn compute_depths(&mut self) {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
        }

        let mut depth: HashMap<String, i64> = HashMap::new();
        depth.insert(self.org_id.clone(), 0);

        let mut queue = VecDeque::new();
        queue.push_back(self.org_id.clone());
        while let Some(current) = queue.pop_front() {
            let d = depth[&current];
            if let Some(next) = adjacency.get(current.as_str()) {
                for &n in next {
                    if !depth.contains_key(n) {
                        depth.insert(n.to_string(), d + 1);
                        queue.push_back(n.to_string());
                    }
                }
            }
        }

        for (id, node) in self.nodes.iter_mut() {
            node.depth = depth.get(id).copied().unwrap_or(-1);
        }
    }

    /// BFS subgraph around `aid`, following edges in both directions, up
    /// to `depth` hops. `depth == 0` returns only `aid`; a negative depth
    /// returns the full graph.
    pub fn subgraph(&self, aid: &str, depth: i64) -> Result<TrustGraph> {
        if !self.nodes.contains_key(aid) {
            return Err(Error::CredentialNotFound(format!(
                "Identifier {} not in trust graph",
                aid
            )));
        }
        if depth < 0 {
            return Ok(self.clone());
        }

        let mut undirected: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            undirected.entry(&edge.from).or_default().push(&edge.to);
            undirected.entry(&edge.to).or_default().push(&edge.from);
        }

        let mut hops: HashMap<&str, i64> = HashMap::new();
        hops.insert(aid, 0);
        let mut queue = VecDeque::new();
        queue.push_back(aid);
        while let Some(current) = queue.pop_front() {
            let h = hops[current];
            if h == depth {
                continue;
            }
            if let Some(next) = undirected.get(current) {
                for &n in next {
                    if !hops.contains_key(n) {
                        hops.insert(n, h + 1);
                        queue.push_back(n);
                    }
                }
            }
        }

        let nodes: BTreeMap<String, TrustNode> = self
            .nodes
            .iter()
            .filter(|(id, _)| hops.contains_key(id.as_str()))
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect();

        let edges: Vec<TrustEdge> = self
            .edges
            .iter()
            .filter(|e| nodes.contains_key(&e.from) && nodes.contains_key(&e.to))
            .cloned()
            .collect();

        Ok(TrustGraph {
            org_id: self.org_id.clone(),
            nodes,
            edges,
        })
    }

    /// Distinct unordered pairs with edges in both directions
    pub fn bidirectional_pairs(&self) -> usize {
        let pairs: HashSet<(String, String)> = self
            .edges
            .iter()
            .map(|e| (e.from.clone(), e.to.clone()))
            .collect();

        let mut mutual = HashSet::new();
        for (a, b) in &pairs {
            if pairs.contains(&(b.clone(), a.clone())) && a != b {
                let key = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
                mutual.insert(key);
            }
        }
        mutual.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn credential(said: &str, issuer: &str, recipient: &str, schema: &str) -> Credential {
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

    /// The reference org: two memberships and a mutual invitation.
    fn reference_credentials() -> Vec<Credential> {
        vec![
            credential("ESAID001", "EORG123", "EUSER1", "membership"),
            credential("ESAID002", "EORG123", "EUSER2", "membership"),
            credential("ESAID003", "EUSER1", "EUSER2", "invitation"),
            credential("ESAID004", "EUSER2", "EUSER1", "invitation"),
        ]
    }

    #[test]
    fn test_reference_graph_shape() {
        let graph = TrustGraph::build("EORG123", &reference_credentials());

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 4);
        assert_eq!(graph.bidirectional_pairs(), 1);

        let bidirectional: Vec<_> = graph.edges.iter().filter(|e| e.bidirectional).collect();
        assert_eq!(bidirectional.len(), 2);
        for edge in bidirectional {
            assert!(matches!(edge.edge_type, EdgeType::Invitation));
        }
    }

    #[test]
    fn test_depths() {
        let graph = TrustGraph::build("EORG123", &reference_credentials());

        assert_eq!(graph.nodes["EORG123"].depth, 0);
        assert_eq!(graph.nodes["EUSER1"].depth, 1);
        assert_eq!(graph.nodes["EUSER2"].depth, 1);
    }

    #[test]
    fn test_unreachable_node_depth() {
        let creds = vec![credential("ESAID009", "EUSERX", "EUSERY", "invitation")];
        let graph = TrustGraph::build("EORG123", &creds);

        assert_eq!(graph.nodes["EORG123"].depth, 0);
        assert_eq!(graph.nodes["EUSERX"].depth, -1);
        assert_eq!(graph.nodes["EUSERY"].depth, -1);
    }

    #[test]
    fn test_org_always_present() {
        let graph = TrustGraph::build("EORG123", &[]);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes["EORG123"].role, "organization");
        assert_eq!(graph.nodes["EORG123"].depth, 0);
    }

    #[test]
    fn test_duplicate_credential_single_edge() {
        let creds = vec![
            credential("ESAID001", "EORG123", "EUSER1", "membership"),
            credential("ESAID001", "EORG123", "EUSER1", "membership"),
        ];
        let graph = TrustGraph::build("EORG123", &creds);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_self_claim_node_without_edge() {
        let creds = vec![credential("ESAID005", "EUSER3", "EUSER3", "self-claim")];
        let graph = TrustGraph::build("EORG123", &creds);

        assert!(graph.nodes.contains_key("EUSER3"));
        assert!(graph.edges.is_empty());
        assert_eq!(graph.nodes["EUSER3"].credential_count, 1);
    }

    #[test]
    fn test_malformed_credential_skipped() {
        let mut bad = credential("", "EORG123", "EUSER1", "membership");
        bad.said = String::new();
        let graph = TrustGraph::build("EORG123", &[bad]);

        assert_eq!(graph.edges.len(), 0);
        assert_eq!(graph.nodes.len(), 1);
    }

    #[test]
    fn test_steward_role_and_alias() {
        let mut cred = credential("ESAID006", "EORG123", "EUSER4", "steward");
        cred.data = serde_json::json!({"displayName": "Avery", "joinedAt": 1_690_000_000});
        let graph = TrustGraph::build("EORG123", &[cred]);

        let node = &graph.nodes["EUSER4"];
        assert_eq!(node.role, "steward");
        assert_eq!(node.alias.as_deref(), Some("Avery"));
        assert_eq!(node.joined_at, Some(1_690_000_000));
    }

    #[test]
    fn test_subgraph_depth_zero() {
        let graph = TrustGraph::build("EORG123", &reference_credentials());
        let sub = graph.subgraph("EUSER1", 0).unwrap();

        assert_eq!(sub.nodes.len(), 1);
        assert!(sub.nodes.contains_key("EUSER1"));
        assert!(sub.edges.is_empty());
    }

    #[test]
    fn test_subgraph_depth_one_excludes_chain() {
        let mut creds = reference_credentials();
        creds.push(credential("ESAID007", "EUSER2", "EUSER3", "invitation"));

        let graph = TrustGraph::build("EORG123", &creds);
        let sub = graph.subgraph("EUSER1", 1).unwrap();

        assert!(sub.nodes.contains_key("EORG123"));
        assert!(sub.nodes.contains_key("EUSER1"));
        assert!(sub.nodes.contains_key("EUSER2"));
        assert!(!sub.nodes.contains_key("EUSER3"));
    }

    #[test]
    fn test_subgraph_negative_depth_full_graph() {
        let graph = TrustGraph::build("EORG123", &reference_credentials());
        let sub = graph.subgraph("EUSER1", -1).unwrap();

        assert_eq!(sub.nodes.len(), graph.nodes.len());
        assert_eq!(sub.edges.len(), graph.edges.len());
    }

    #[test]
    fn test_subgraph_unknown_aid() {
        let graph = TrustGraph::build("EORG123", &reference_credentials());
        assert!(graph.subgraph("ENOBODY", 2).is_err());
    }

    #[test]
    fn test_subgraph_never_exceeds_distance() {
        // Chain org → u1 → u2 → u3
        let creds = vec![
            credential("ES1", "EORG123", "EU1", "invitation"),
            credential("ES2", "EU1", "EU2", "invitation"),
            credential("ES3", "EU2", "EU3", "invitation"),
        ];
        let graph = TrustGraph::build("EORG123", &creds);

        let sub = graph.subgraph("EORG123", 2).unwrap();
        assert!(sub.nodes.contains_key("EU2"));
        assert!(!sub.nodes.contains_key("EU3"));
    }
}
