//! Cuthill–McKee ordering of the DoF coupling graph.
//!
//! Two DoFs couple when they share an active cell. The ordering is built
//! level by level from a pseudo-peripheral root: each new BFS frontier is
//! sorted by (lowest label of a labelled neighbour, degree, old index).
//! Disconnected pieces are handled one after another.

use crate::algs::communicator::Communicator;
use crate::data::dof_store::{DofStore, Layer};
use crate::data::index_set::IndexSet;
use crate::data::{DofIndex, INVALID_DOF};
use crate::dof_error::DofError;
use crate::dof_handler::DofHandler;
use crate::policy::DofPolicy;
use crate::topology::triangulation::Triangulation;
use hashbrown::HashMap;

/// Undirected graph on local node ids `0..n`.
#[derive(Debug, Clone, Default)]
pub struct CouplingGraph {
    adj: Vec<Vec<usize>>,
}

impl CouplingGraph {
    /// Couple the DoFs of every active cell.
    ///
    /// `node` maps a DoF index to its node id; DoFs it rejects are left out,
    /// as are invalid slots. Artificial cells of a shared mesh take part so
    /// that every rank builds the same graph.
    pub fn from_cells<const D: usize, F>(
        tria: &Triangulation<D>,
        store: &DofStore,
        n_nodes: usize,
        node: F,
    ) -> Self
    where
        F: Fn(DofIndex) -> Option<usize>,
    {
        let mut adj = vec![Vec::new(); n_nodes];
        let mut buf = Vec::new();
        let mut local = Vec::new();
        for id in tria.active_cell_ids() {
            store.cell_indices(Layer::Active, tria, id, &mut buf);
            local.clear();
            local.extend(
                buf.iter()
                    .filter(|&&i| i != INVALID_DOF)
                    .filter_map(|&i| node(i))
                    .filter(|&v| v < n_nodes),
            );
            for &a in &local {
                adj[a].extend(local.iter().copied().filter(|&b| b != a));
            }
        }
        for list in &mut adj {
            list.sort_unstable();
            list.dedup();
        }
        Self { adj }
    }

    pub fn n_nodes(&self) -> usize {
        self.adj.len()
    }

    pub fn degree(&self, v: usize) -> usize {
        self.adj[v].len()
    }

    pub fn neighbours(&self, v: usize) -> &[usize] {
        &self.adj[v]
    }

    /// BFS level sets from `root`, restricted to unlabelled nodes.
    fn level_structure(&self, root: usize, labelled: &[bool]) -> Vec<Vec<usize>> {
        let mut seen = labelled.to_vec();
        seen[root] = true;
        let mut levels = vec![vec![root]];
        loop {
            let mut next = Vec::new();
            for &u in levels.last().map(Vec::as_slice).unwrap_or_default() {
                for &v in &self.adj[u] {
                    if !seen[v] {
                        seen[v] = true;
                        next.push(v);
                    }
                }
            }
            if next.is_empty() {
                return levels;
            }
            levels.push(next);
        }
    }

    /// Root whose BFS depth no neighbour-of-the-last-level can beat.
    pub fn pseudo_peripheral_root(&self, start: usize, labelled: &[bool]) -> usize {
        let mut root = start;
        let mut depth = 0;
        loop {
            let levels = self.level_structure(root, labelled);
            if levels.len() <= depth {
                return root;
            }
            depth = levels.len();
            let candidate = levels
                .last()
                .and_then(|last| last.iter().copied().min_by_key(|&v| (self.degree(v), v)))
                .unwrap_or(root);
            if candidate == root {
                return root;
            }
            root = candidate;
        }
    }

    /// Node ids in Cuthill–McKee order.
    pub fn cuthill_mckee_order(&self) -> Vec<usize> {
        let n = self.n_nodes();
        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut labelled = vec![false; n];
        let mut order = Vec::with_capacity(n);
        // components are started from their lowest-degree node
        let mut starts: Vec<usize> = (0..n).collect();
        starts.sort_by_key(|&v| (self.degree(v), v));
        for start in starts {
            if labelled[start] {
                continue;
            }
            let root = self.pseudo_peripheral_root(start, &labelled);
            let mut frontier = vec![root];
            labelled[root] = true;
            while !frontier.is_empty() {
                for &v in &frontier {
                    labels[v] = Some(order.len());
                    order.push(v);
                }
                let mut parent: HashMap<usize, usize> = HashMap::new();
                for &u in &frontier {
                    let lu = labels[u].unwrap_or(usize::MAX);
                    for &v in &self.adj[u] {
                        if !labelled[v] {
                            parent
                                .entry(v)
                                .and_modify(|l| *l = (*l).min(lu))
                                .or_insert(lu);
                        }
                    }
                }
                let mut next: Vec<(usize, usize, usize)> = parent
                    .into_iter()
                    .map(|(v, l)| (l, self.degree(v), v))
                    .collect();
                next.sort_unstable();
                frontier = next.into_iter().map(|(_, _, v)| v).collect();
                for &v in &frontier {
                    labelled[v] = true;
                }
            }
        }
        order
    }
}

fn positions(order: &[usize], reversed: bool) -> Vec<DofIndex> {
    let n = order.len();
    let mut pos = vec![0; n];
    for (k, &v) in order.iter().enumerate() {
        pos[v] = if reversed { n - 1 - k } else { k } as DofIndex;
    }
    pos
}

/// Cuthill–McKee permutation of all DoFs, ready for
/// [`DofHandler::renumber_dofs`].
///
/// Needs the full numbering on this process, so distributed meshes must use
/// [`cuthill_mckee_locally_owned`].
pub fn cuthill_mckee<const D: usize, C: Communicator>(
    handler: &DofHandler<'_, D, C>,
    reversed: bool,
) -> Result<Vec<DofIndex>, DofError> {
    if handler.policy() == DofPolicy::ParallelDistributed {
        return Err(DofError::Precondition(
            "a distributed numbering is only known locally; use cuthill_mckee_locally_owned".into(),
        ));
    }
    let store = handler.store().ok_or(DofError::NotDistributed)?;
    let n = handler.n_dofs() as usize;
    let graph = CouplingGraph::from_cells(handler.triangulation(), store, n, |i| Some(i as usize));
    let perm = positions(&graph.cuthill_mckee_order(), reversed);
    log::debug!("cuthill-mckee over {n} DoFs (reversed: {reversed})");
    Ok(perm)
}

/// Cuthill–McKee order of the locally owned DoFs, mapped back onto the
/// locally owned set; pass it to [`DofHandler::renumber_dofs`] on every rank.
pub fn cuthill_mckee_locally_owned<const D: usize, C: Communicator>(
    handler: &DofHandler<'_, D, C>,
    reversed: bool,
) -> Result<Vec<DofIndex>, DofError> {
    let store = handler.store().ok_or(DofError::NotDistributed)?;
    let owned: &IndexSet = handler.locally_owned_dofs();
    let n = owned.n_elements() as usize;
    let graph = CouplingGraph::from_cells(handler.triangulation(), store, n, |i| {
        owned.index_within_set(i).map(|k| k as usize)
    });
    positions(&graph.cuthill_mckee_order(), reversed)
        .into_iter()
        .map(|k| {
            owned
                .nth_index_in_set(k)
                .ok_or(DofError::PermutationIndexOutOfRange { index: k, len: n })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize, shuffle: &[usize]) -> CouplingGraph {
        let mut adj = vec![Vec::new(); n];
        for w in shuffle.windows(2) {
            adj[w[0]].push(w[1]);
            adj[w[1]].push(w[0]);
        }
        for l in &mut adj {
            l.sort_unstable();
        }
        CouplingGraph { adj }
    }

    #[test]
    fn path_root_is_an_end() {
        let g = path(5, &[3, 0, 4, 1, 2]);
        let root = g.pseudo_peripheral_root(4, &[false; 5]);
        assert!(root == 3 || root == 2);
    }

    #[test]
    fn path_order_follows_the_path() {
        let walk = [3, 0, 4, 1, 2];
        let g = path(5, &walk);
        let order = g.cuthill_mckee_order();
        let mut rev = walk;
        rev.reverse();
        assert!(order == walk || order == rev);
    }

    #[test]
    fn disconnected_and_isolated_nodes() {
        let mut g = path(6, &[0, 1, 2]);
        g.adj[4].push(5);
        g.adj[5].push(4);
        let order = g.cuthill_mckee_order();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..6).collect::<Vec<_>>());
        // isolated node 3 has degree zero and starts first
        assert_eq!(order[0], 3);
    }

    #[test]
    fn reversed_positions() {
        assert_eq!(positions(&[2, 0, 1], false), vec![1, 2, 0]);
        assert_eq!(positions(&[2, 0, 1], true), vec![1, 0, 2]);
    }
}
