//! Maximum-cardinality matching on a general (not necessarily bipartite)
//! graph, using Edmonds' blossom contraction over BFS augmenting paths.

use std::collections::VecDeque;

use crate::graph::Graph;

const NONE: usize = usize::MAX;

/// Returns a maximum set of disjoint edges as `(lower, higher)` node index
/// pairs, ordered by the lower index. Which of several equally large
/// matchings comes back is unspecified.
pub fn maximum_matching(graph: &Graph) -> Vec<(usize, usize)> {
    let adjacency = (0..graph.len())
        .map(|v| graph.neighbours(v).collect())
        .collect();
    let mut search = Search::new(adjacency);
    search.greedy();

    for root in 0..graph.len() {
        if search.mate[root] != NONE {
            continue;
        }
        // A vertex with no augmenting path now never gains one later, so one
        // attempt per exposed vertex is enough.
        if let Some(end) = search.augmenting_path(root) {
            search.augment(end);
        }
    }

    let matching = search.pairs();
    tracing::debug!(pairs = matching.len(), "computed maximum matching");
    matching
}

/// Same as [`maximum_matching`] but with node indices resolved back to
/// participant identifiers.
pub fn maximum_matching_ids(graph: &Graph) -> Vec<(String, String)> {
    maximum_matching(graph)
        .into_iter()
        .map(|(a, b)| (graph.node(a).to_owned(), graph.node(b).to_owned()))
        .collect()
}

struct Search {
    adjacency: Vec<Vec<usize>>,
    mate: Vec<usize>,
    parent: Vec<usize>,
    base: Vec<usize>,
    used: Vec<bool>,
    blossom: Vec<bool>,
    queue: VecDeque<usize>,
}

impl Search {
    fn new(adjacency: Vec<Vec<usize>>) -> Search {
        let n = adjacency.len();
        Search {
            adjacency,
            mate: vec![NONE; n],
            parent: vec![NONE; n],
            base: (0..n).collect(),
            used: vec![false; n],
            blossom: vec![false; n],
            queue: VecDeque::with_capacity(n),
        }
    }

    fn len(&self) -> usize {
        self.mate.len()
    }

    /// Seeds the search with a maximal matching so that only the remaining
    /// exposed vertices need a full BFS.
    fn greedy(&mut self) {
        for v in 0..self.len() {
            if self.mate[v] != NONE {
                continue;
            }
            let partner = self.adjacency[v]
                .iter()
                .copied()
                .find(|&to| self.mate[to] == NONE);
            if let Some(to) = partner {
                self.mate[v] = to;
                self.mate[to] = v;
            }
        }
    }

    fn augmenting_path(&mut self, root: usize) -> Option<usize> {
        let n = self.len();
        self.used.fill(false);
        self.parent.fill(NONE);
        for (i, base) in self.base.iter_mut().enumerate() {
            *base = i;
        }

        self.used[root] = true;
        self.queue.clear();
        self.queue.push_back(root);

        while let Some(v) = self.queue.pop_front() {
            for i in 0..self.adjacency[v].len() {
                let to = self.adjacency[v][i];
                if self.base[v] == self.base[to] || self.mate[v] == to {
                    continue;
                }

                let odd_cycle = to == root
                    || (self.mate[to] != NONE && self.parent[self.mate[to]] != NONE);
                if odd_cycle {
                    let current_base = self.lowest_common_ancestor(v, to);
                    self.blossom.fill(false);
                    self.mark_path(v, current_base, to);
                    self.mark_path(to, current_base, v);
                    for u in 0..n {
                        if self.blossom[self.base[u]] {
                            self.base[u] = current_base;
                            if !self.used[u] {
                                self.used[u] = true;
                                self.queue.push_back(u);
                            }
                        }
                    }
                } else if self.parent[to] == NONE {
                    self.parent[to] = v;
                    if self.mate[to] == NONE {
                        return Some(to);
                    }
                    let next = self.mate[to];
                    self.used[next] = true;
                    self.queue.push_back(next);
                }
            }
        }
        None
    }

    fn lowest_common_ancestor(&self, a: usize, b: usize) -> usize {
        let mut seen = vec![false; self.len()];
        let mut a = a;
        loop {
            a = self.base[a];
            seen[a] = true;
            if self.mate[a] == NONE {
                break;
            }
            a = self.parent[self.mate[a]];
        }
        let mut b = b;
        loop {
            b = self.base[b];
            if seen[b] {
                return b;
            }
            b = self.parent[self.mate[b]];
        }
    }

    fn mark_path(&mut self, v: usize, current_base: usize, child: usize) {
        let (mut v, mut child) = (v, child);
        while self.base[v] != current_base {
            self.blossom[self.base[v]] = true;
            self.blossom[self.base[self.mate[v]]] = true;
            self.parent[v] = child;
            child = self.mate[v];
            v = self.parent[self.mate[v]];
        }
    }

    fn augment(&mut self, end: usize) {
        let mut v = end;
        while v != NONE {
            let pv = self.parent[v];
            let next = self.mate[pv];
            self.mate[v] = pv;
            self.mate[pv] = v;
            v = next;
        }
    }

    fn pairs(&self) -> Vec<(usize, usize)> {
        self.mate
            .iter()
            .enumerate()
            .filter(|&(v, &m)| m != NONE && v < m)
            .map(|(v, &m)| (v, m))
            .collect()
    }
}
