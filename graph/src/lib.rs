pub mod core;

pub use core::{
    synthetic_label, BranchAssignment, GraphError, Revision, RevisionGraph, MAIN_BRANCH,
};
