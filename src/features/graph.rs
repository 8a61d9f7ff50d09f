//! Undirected sender/recipient graph built from e-mail records, with centrality metrics.

use crate::ingest::{LogRecord, RecordDetail};
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashMap, VecDeque};

pub struct EmailGraph {
    graph: UnGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl Default for EmailGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailGraph {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            index: HashMap::new(),
        }
    }

    pub fn from_records(records: &[LogRecord]) -> Self {
        let mut g = Self::new();
        for r in records {
            if let RecordDetail::Email { recipients, .. } = &r.detail {
                for to in recipients {
                    g.add_edge(&r.user, to);
                }
            }
        }
        g
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Parallel edges collapse; self-loops only register the node.
    pub fn add_edge(&mut self, a: &str, b: &str) {
        let ia = self.node(a);
        let ib = self.node(b);
        if ia != ib {
            self.graph.update_edge(ia, ib, ());
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// `deg(v) / (n - 1)`; all zero when the graph has at most one node.
    pub fn degree_centrality(&self) -> HashMap<String, f64> {
        let n = self.graph.node_count();
        self.graph
            .node_indices()
            .map(|v| {
                let c = if n <= 1 {
                    0.0
                } else {
                    self.graph.neighbors(v).count() as f64 / (n - 1) as f64
                };
                (self.graph[v].clone(), c)
            })
            .collect()
    }

    /// Brandes' algorithm on the unweighted undirected graph, normalized by
    /// `2 / ((n - 1)(n - 2))`. All zero when `n <= 2`.
    pub fn betweenness_centrality(&self) -> HashMap<String, f64> {
        let n = self.graph.node_count();
        let mut bc = vec![0.0f64; n];
        let mut stack: Vec<NodeIndex> = Vec::with_capacity(n);
        let mut preds: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        let mut delta = vec![0.0f64; n];
        let mut queue = VecDeque::with_capacity(n);

        // Buffers are shared across sources; each visited node is reset as it
        // leaves the stack, so untouched components cost nothing.
        for s in self.graph.node_indices() {
            sigma[s.index()] = 1.0;
            dist[s.index()] = 0;

            queue.push_back(s);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for w in self.graph.neighbors(v) {
                    if dist[w.index()] < 0 {
                        dist[w.index()] = dist[v.index()] + 1;
                        queue.push_back(w);
                    }
                    if dist[w.index()] == dist[v.index()] + 1 {
                        sigma[w.index()] += sigma[v.index()];
                        preds[w.index()].push(v);
                    }
                }
            }

            while let Some(w) = stack.pop() {
                let dw = delta[w.index()];
                let sw = sigma[w.index()];
                for v in &preds[w.index()] {
                    delta[v.index()] += sigma[v.index()] / sw * (1.0 + dw);
                }
                if w != s {
                    bc[w.index()] += delta[w.index()];
                }
                preds[w.index()].clear();
                sigma[w.index()] = 0.0;
                dist[w.index()] = -1;
                delta[w.index()] = 0.0;
            }
        }

        // Each pair is counted from both endpoints; the halving folds into the scale.
        let scale = if n > 2 {
            1.0 / ((n - 1) as f64 * (n - 2) as f64)
        } else {
            0.0
        };
        self.graph
            .node_indices()
            .map(|v| (self.graph[v].clone(), bc[v.index()] * scale))
            .collect()
    }
}
