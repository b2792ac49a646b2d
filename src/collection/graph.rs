//! Ordering graph for list bindings.

use crate::key::Key;

/// Directed graph of "must appear before" constraints over element keys.
///
/// Nodes and edges are monotonic: once declared they are never removed, and
/// a continuing contribution from a later module appends to the same
/// structure. The graph itself is cheap; a full order is recomputed on
/// every list resolution because later modules may have added edges since
/// the last one.
pub(crate) struct OrderingGraph {
    /// Unique nodes in first-seen order; the order seeds the sort so that
    /// unconstrained elements keep their contribution order.
    nodes: Vec<Key>,
    /// `(before, after)` pairs in declaration order.
    edges: Vec<(Key, Key)>,
}

impl OrderingGraph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub(crate) fn add_node(&mut self, key: Key) {
        if !self.nodes.contains(&key) {
            self.nodes.push(key);
        }
    }

    pub(crate) fn add_edge(&mut self, before: Key, after: Key) {
        self.add_node(before.clone());
        self.add_node(after.clone());
        self.edges.push((before, after));
    }

    /// Topological order of all nodes, or the set of nodes left unresolved
    /// by a cycle.
    ///
    /// Kahn's algorithm over a LIFO stack seeded in reverse insertion
    /// order, which is deterministic for identical input and keeps
    /// unconstrained elements in contribution order.
    pub(crate) fn sorted(&self) -> Result<Vec<Key>, Vec<Key>> {
        let n = self.nodes.len();
        let mut index = ahash::AHashMap::with_capacity(n);
        for (i, node) in self.nodes.iter().enumerate() {
            index.insert(node.clone(), i);
        }

        let mut indegree = vec![0usize; n];
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (before, after) in &self.edges {
            // Edge endpoints are always registered as nodes by add_edge.
            if let (Some(&b), Some(&a)) = (index.get(before), index.get(after)) {
                adjacency[b].push(a);
                indegree[a] += 1;
            }
        }

        let mut stack: Vec<usize> = (0..n).rev().filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut done = vec![false; n];

        while let Some(node) = stack.pop() {
            if done[node] {
                continue;
            }
            done[node] = true;
            order.push(self.nodes[node].clone());
            for &next in &adjacency[node] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    stack.push(next);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err(self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| !done[*i])
                .map(|(_, k)| k.clone())
                .collect())
        }
    }
}
