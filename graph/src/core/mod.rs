mod branches;
mod graph;

pub use branches::{synthetic_label, BranchAssignment, MAIN_BRANCH};
pub use graph::{GraphError, Revision, RevisionGraph};
