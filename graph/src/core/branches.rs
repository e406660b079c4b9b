use super::graph::{Revision, RevisionGraph};

/// Label of the default line of development.
pub const MAIN_BRANCH: &str = "main";

/// The synthetic label minted for a revision that diverges from its parent's
/// lineage. Revision numbers are unique, so the label is too.
pub fn synthetic_label(rev: Revision) -> String {
    format!("branch-{rev}")
}

/// Branch label for every revision, computed in one ascending pass.
///
/// Each label depends only on already-assigned parent labels:
/// - revision 0 opens the main line;
/// - a merge lands on main whenever its merge parent is on main, and
///   otherwise stays on its primary parent's line;
/// - the first child of a revision continues that revision's lineage;
/// - every later child opens a fresh synthetic branch.
///
/// Labels are assigned exactly once and never change, even when the branch
/// is later merged back and pruned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchAssignment {
    labels: Vec<String>,
}

impl BranchAssignment {
    pub fn infer(graph: &RevisionGraph) -> Self {
        let mut labels: Vec<String> = Vec::with_capacity(graph.revision_count());
        labels.push(MAIN_BRANCH.to_string());

        for rev in 1..=graph.tip() {
            let label = match graph.parents(rev) {
                (Some(primary), Some(merge)) => {
                    if labels[merge as usize] == MAIN_BRANCH {
                        MAIN_BRANCH.to_string()
                    } else {
                        labels[primary as usize].clone()
                    }
                }
                (Some(primary), None) => {
                    if graph.first_child(primary) == Some(rev) {
                        labels[primary as usize].clone()
                    } else {
                        synthetic_label(rev)
                    }
                }
                // Unreachable on a well-formed graph: only revision 0 is
                // parentless, and the loop starts at 1.
                (None, _) => MAIN_BRANCH.to_string(),
            };
            labels.push(label);
        }

        BranchAssignment { labels }
    }

    pub fn label(&self, rev: Revision) -> &str {
        &self.labels[rev as usize]
    }

    /// Whether `rev` opened its own synthetic branch, which tells the replay
    /// side to create the branch rather than check it out.
    pub fn is_fresh(&self, rev: Revision) -> bool {
        self.labels[rev as usize] == synthetic_label(rev)
    }
}
