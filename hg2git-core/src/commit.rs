use anyhow::Result;
use git2::{IndexAddOption, Oid, Repository as Git2Repository, Signature};

/// Index and commit plumbing for the conversion target.
pub struct CommitOps<'repo> {
    repo: &'repo Git2Repository,
}

impl<'repo> CommitOps<'repo> {
    pub fn new(repo: &'repo Git2Repository) -> Self {
        CommitOps { repo }
    }

    /// Stage everything the working tree shows: new and modified files via
    /// add_all, deletions of tracked files via update_all.
    pub fn stage_all_changes(&self) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    /// Create a commit from the staged tree. Parents are the current HEAD
    /// (absent on the very first commit) plus any pending merge heads.
    pub fn create(&self, message: &str, author: &Signature, merge_heads: &[Oid]) -> Result<String> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let head_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let merge_commits = merge_heads
            .iter()
            .map(|oid| self.repo.find_commit(*oid))
            .collect::<Result<Vec<_>, _>>()?;

        let mut parents = Vec::new();
        if let Some(commit) = head_commit.as_ref() {
            parents.push(commit);
        }
        parents.extend(merge_commits.iter());

        let oid = self
            .repo
            .commit(Some("HEAD"), author, author, message, &tree, &parents)?;

        if !merge_heads.is_empty() {
            self.repo.cleanup_state()?;
        }

        Ok(oid.to_string())
    }
}
