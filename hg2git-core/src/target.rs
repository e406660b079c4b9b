use anyhow::Result;

use crate::identity::{Identity, WhenSpec};

/// Mutating operations on the repository being written. One implementation
/// drives git through libgit2; tests substitute an in-memory double.
pub trait Target {
    /// Create (or re-create) an empty repository whose default branch is
    /// `main`.
    fn init_repository(&mut self) -> Result<()>;

    /// Create a branch starting at a previously recorded commit and switch
    /// the working tree to it.
    fn switch_to_new_branch(&mut self, name: &str, start_commit: &str) -> Result<()>;

    /// Switch the working tree to an existing branch.
    fn switch_branch(&mut self, name: &str) -> Result<()>;

    /// Merge another branch into the checked-out one at the index level,
    /// without creating a commit. Conflicting hunks resolve to the
    /// checked-out side.
    fn merge_no_commit(&mut self, other_branch: &str) -> Result<()>;

    /// Stage every addition and removal visible in the working tree.
    fn stage_all_changes(&mut self) -> Result<()>;

    /// Commit the staged tree. Author and committer are the same identity;
    /// empty messages and empty diffs are both allowed.
    fn commit(&mut self, message: &str, author: &Identity, when: WhenSpec) -> Result<String>;

    /// Tag the current head commit.
    fn tag(&mut self, name: &str, author: &Identity, when: WhenSpec) -> Result<()>;

    /// Drop a branch reference.
    fn delete_branch(&mut self, name: &str) -> Result<()>;

    /// Identifier of the most recent commit on the checked-out branch.
    fn head_commit_id(&self) -> Result<String>;

    /// Compact repository storage.
    fn repack(&self) -> Result<()>;
}
