use std::fs;

use anyhow::{anyhow, Result};
use git2::{
    build::CheckoutBuilder, BranchType, FileFavor, MergeOptions, Oid,
    Repository as Git2Repository,
};

/// Index-level merges for the conversion target.
pub struct MergeOps<'repo> {
    repo: &'repo Git2Repository,
}

impl<'repo> MergeOps<'repo> {
    pub fn new(repo: &'repo Git2Repository) -> Self {
        MergeOps { repo }
    }

    /// Merge `branch_name` into the checked-out branch without committing.
    /// MERGE_HEAD is left behind so the next commit records both parents.
    /// Conflicting hunks resolve to the checked-out side; the working tree
    /// is rebuilt from the source right after, so only the parent linkage
    /// matters here.
    pub fn merge_no_commit(&self, branch_name: &str) -> Result<()> {
        let branch = self.repo.find_branch(branch_name, BranchType::Local)?;
        let target_oid = branch
            .get()
            .target()
            .ok_or_else(|| anyhow!("branch {} has no target", branch_name))?;
        let annotated = self.repo.find_annotated_commit(target_oid)?;

        let mut merge_options = MergeOptions::new();
        merge_options.file_favor(FileFavor::Ours);
        let mut checkout = CheckoutBuilder::new();
        checkout.force().allow_conflicts(true);

        self.repo
            .merge(&[&annotated], Some(&mut merge_options), Some(&mut checkout))?;
        Ok(())
    }

    /// Read the pending merge parents from MERGE_HEAD.
    pub fn merge_heads(&self) -> Result<Vec<Oid>> {
        let merge_head_path = self.repo.path().join("MERGE_HEAD");
        if !merge_head_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(merge_head_path)?;
        let mut heads = Vec::new();
        for line in content.lines() {
            if let Ok(oid) = Oid::from_str(line.trim()) {
                heads.push(oid);
            }
        }
        Ok(heads)
    }
}
