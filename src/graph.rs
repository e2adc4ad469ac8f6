use std::collections::HashMap;

use crate::{history::HistoryIndex, participant::Participant};

/// Undirected compatibility graph over the active participants.
///
/// Nodes are indexed in insertion order. An edge joins two participants who
/// have never been matched before.
#[derive(Default, Debug, Clone)]
pub struct Graph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<bool>>,
}

impl Graph {
    /// Adds an edge for every unordered pair of participants without shared
    /// history. Participants are expected to be deduplicated already; a repeat
    /// identifier maps onto its first node.
    pub fn build(participants: &[Participant], history: &HistoryIndex) -> Graph {
        let mut graph = Graph::default();
        for participant in participants {
            graph.add_node(participant.id());
        }

        let n = graph.len();
        for a in 0..n {
            for b in (a + 1)..n {
                if !history.have_met(&graph.nodes[a], &graph.nodes[b]) {
                    graph.add_edge(a, b);
                }
            }
        }
        tracing::debug!(
            nodes = n,
            edges = graph.edge_count(),
            "built compatibility graph"
        );
        graph
    }

    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&existing) = self.index.get(id) {
            return existing;
        }
        let idx = self.nodes.len();
        self.nodes.push(id.to_owned());
        self.index.insert(id.to_owned(), idx);
        for edge_row in &mut self.edges {
            edge_row.push(false);
        }
        self.edges.push(vec![false; self.nodes.len()]);
        idx
    }

    pub fn add_edge(&mut self, id1: usize, id2: usize) {
        assert!(self.nodes.len() > id1);
        assert!(self.nodes.len() > id2);
        if id1 == id2 {
            return;
        }
        self.edges[id1][id2] = true;
        self.edges[id2][id1] = true;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &str {
        &self.nodes[idx]
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn has_edge(&self, id1: usize, id2: usize) -> bool {
        self.edges[id1][id2]
    }

    pub fn neighbours(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges[idx]
            .iter()
            .enumerate()
            .filter(|(_, connected)| **connected)
            .map(|(b, _)| b)
    }

    pub fn degree(&self, idx: usize) -> usize {
        self.neighbours(idx).count()
    }

    pub fn edge_count(&self) -> usize {
        (0..self.len()).map(|a| self.degree(a)).sum::<usize>() / 2
    }
}
