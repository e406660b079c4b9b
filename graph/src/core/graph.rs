use thiserror::Error;

/// A revision number in the source repository. Revisions are dense, start at
/// 0 and are ordered by creation time.
pub type Revision = u32;

/// Failure while interrogating the source repository for graph edges.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read parents of revision {rev}")]
    ParentQuery {
        rev: Revision,
        #[source]
        source: anyhow::Error,
    },
}

/// Parent/child adjacency of the full revision range, built once per run and
/// read-only afterwards.
///
/// Revision 0 is the root and has no parents. Every other revision has a
/// primary parent and optionally a merge parent. A revision with more than
/// one child is a branch point; a revision with two parents is a merge point.
#[derive(Debug, Clone)]
pub struct RevisionGraph {
    /// Indexed by revision: (primary parent, merge parent).
    parents: Vec<(Option<Revision>, Option<Revision>)>,
    /// Indexed by revision: children in ascending discovery order.
    children: Vec<Vec<Revision>>,
}

impl RevisionGraph {
    /// Build the graph for revisions `0..=tip` by asking `lookup` for each
    /// revision's explicit parent list.
    ///
    /// Sources that store parents only for merges and branches report an
    /// empty list for a linear continuation; the primary parent then
    /// defaults to the previous revision. Any lookup failure aborts the
    /// build; a partial graph is never returned.
    pub fn build<F>(tip: Revision, mut lookup: F) -> Result<Self, GraphError>
    where
        F: FnMut(Revision) -> anyhow::Result<Vec<Revision>>,
    {
        let count = tip as usize + 1;
        let mut parents = vec![(None, None); count];
        let mut children = vec![Vec::new(); count];

        for rev in 1..=tip {
            let explicit = lookup(rev).map_err(|source| GraphError::ParentQuery { rev, source })?;

            let primary = explicit.first().copied().unwrap_or(rev - 1);
            let merge = explicit.get(1).copied();

            children[primary as usize].push(rev);
            if let Some(merge) = merge {
                children[merge as usize].push(rev);
            }
            parents[rev as usize] = (Some(primary), merge);
        }

        Ok(RevisionGraph { parents, children })
    }

    /// Highest revision in the graph.
    pub fn tip(&self) -> Revision {
        (self.parents.len() - 1) as Revision
    }

    /// Number of revisions, tip + 1.
    pub fn revision_count(&self) -> usize {
        self.parents.len()
    }

    /// (primary parent, merge parent) of a revision. Both are `None` only
    /// for revision 0.
    pub fn parents(&self, rev: Revision) -> (Option<Revision>, Option<Revision>) {
        self.parents[rev as usize]
    }

    pub fn primary_parent(&self, rev: Revision) -> Option<Revision> {
        self.parents[rev as usize].0
    }

    pub fn merge_parent(&self, rev: Revision) -> Option<Revision> {
        self.parents[rev as usize].1
    }

    /// Children of a revision in ascending order.
    pub fn children(&self, rev: Revision) -> &[Revision] {
        &self.children[rev as usize]
    }

    /// First recorded child, the continuation of the revision's own lineage.
    pub fn first_child(&self, rev: Revision) -> Option<Revision> {
        self.children[rev as usize].first().copied()
    }

    pub fn is_merge(&self, rev: Revision) -> bool {
        self.parents[rev as usize].1.is_some()
    }

    pub fn is_branch_point(&self, rev: Revision) -> bool {
        self.children[rev as usize].len() > 1
    }
}
