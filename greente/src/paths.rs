//! Candidate path enumeration over the live topology.
//!
//! Bounded-depth breadth-first search producing up to K simple paths per
//! (src, dst) pair, each stored as a sequence of canonical links.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use fnv::FnvHashMap;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::models::{LinkId, Path};
use crate::topo::Edge;

/// Path ids start here so they never collide with flow ids.
pub const FIRST_PATH_ID: i32 = 100;
/// Longest node sequence a candidate path may have.
const MAX_PATH_NODES: usize = 10;

struct Adjacency {
    graph: UnGraph<i32, ()>,
    index: FnvHashMap<i32, NodeIndex>,
}

impl Adjacency {
    fn from_edges(alive: &[Edge]) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut index: FnvHashMap<i32, NodeIndex> = FnvHashMap::default();
        for e in alive {
            let ui = *index.entry(e.u).or_insert_with(|| graph.add_node(e.u));
            let vi = *index.entry(e.v).or_insert_with(|| graph.add_node(e.v));
            if graph.find_edge(ui, vi).is_none() {
                graph.add_edge(ui, vi, ());
            }
        }
        Adjacency { graph, index }
    }
}

/// Enumerate up to `k` simple paths for every required pair. Ids are
/// assigned in emission order starting at [`FIRST_PATH_ID`]; BFS order
/// means shorter paths come first.
pub fn enumerate_k_paths(alive: &[Edge], pairs: &BTreeSet<(i32, i32)>, k: usize) -> Vec<Path> {
    let adj = Adjacency::from_edges(alive);
    let mut out = Vec::new();
    let mut next_pid = FIRST_PATH_ID;
    for &(s, d) in pairs {
        bfs_k_paths(&adj, s, d, k, &mut out, &mut next_pid);
    }
    out
}

fn bfs_k_paths(
    adj: &Adjacency,
    s: i32,
    d: i32,
    k: usize,
    out: &mut Vec<Path>,
    next_pid: &mut i32,
) {
    let (si, di) = match (adj.index.get(&s), adj.index.get(&d)) {
        (Some(&si), Some(&di)) => (si, di),
        _ => return,
    };
    let mut emitted = 0usize;
    let mut seen: BTreeSet<Vec<i32>> = BTreeSet::new();
    let mut queue: VecDeque<(NodeIndex, Vec<NodeIndex>)> = VecDeque::new();
    queue.push_back((si, vec![si]));

    while let Some((node, seq)) = queue.pop_front() {
        if emitted >= k {
            break;
        }
        if seq.len() > MAX_PATH_NODES {
            continue;
        }
        if node == di {
            let nodes: Vec<i32> = seq.iter().map(|&ix| adj.graph[ix]).collect();
            if seen.insert(nodes.clone()) {
                let edges = nodes
                    .windows(2)
                    .map(|w| LinkId::new(w[0], w[1]))
                    .collect();
                out.push(Path {
                    id: *next_pid,
                    edges,
                });
                *next_pid += 1;
                emitted += 1;
            }
            continue;
        }
        for nb in adj.graph.neighbors(node) {
            if seq.contains(&nb) {
                continue;
            }
            let mut nxt = seq.clone();
            nxt.push(nb);
            queue.push_back((nb, nxt));
        }
    }
}

/// Recover a path's endpoints: the two odd-degree nodes of its edge
/// multiset, falling back to the first/last edge endpoints.
pub fn path_endpoints(p: &Path) -> Option<(i32, i32)> {
    let mut deg: BTreeMap<i32, usize> = BTreeMap::new();
    for e in &p.edges {
        *deg.entry(e.u).or_insert(0) += 1;
        *deg.entry(e.v).or_insert(0) += 1;
    }
    let odd: Vec<i32> = deg
        .iter()
        .filter(|(_, &d)| d % 2 == 1)
        .map(|(&n, _)| n)
        .collect();
    let (mut s, mut d) = match odd.as_slice() {
        [a, b] => (*a, *b),
        _ => {
            let first = p.edges.first()?;
            let last = p.edges.last()?;
            (first.u, last.v)
        }
    };
    if s > d {
        std::mem::swap(&mut s, &mut d);
    }
    Some((s, d))
}

/// Group candidate paths by their (src, dst) pair.
pub fn group_by_endpoints(paths: &[Path]) -> BTreeMap<(i32, i32), Vec<i32>> {
    let mut mp: BTreeMap<(i32, i32), Vec<i32>> = BTreeMap::new();
    for p in paths {
        if let Some(key) = path_endpoints(p) {
            mp.entry(key).or_default().push(p.id);
        }
    }
    mp
}
