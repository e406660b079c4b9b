use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use git2::{
    build::CheckoutBuilder, BranchType, ObjectType, Oid, Repository as Git2Repository,
    RepositoryInitOptions,
};
use tracing::debug;

use crate::commit::CommitOps;
use crate::identity::{Identity, WhenSpec};
use crate::merge::MergeOps;
use crate::tag::TagOps;
use crate::target::Target;

/// The git repository being written. It shares its working tree with the
/// source checkout, so `.hg` sits right next to `.git`.
pub struct GitRepo {
    workdir: PathBuf,
    repo: Option<Git2Repository>,
}

impl GitRepo {
    /// Open the repository at `workdir` if one exists; otherwise defer until
    /// `init_repository` creates it.
    pub fn new<P: AsRef<Path>>(workdir: P) -> Result<Self> {
        let workdir = workdir.as_ref().to_path_buf();
        let repo = Git2Repository::open(&workdir).ok();

        let this = GitRepo { workdir, repo };
        if this.repo.is_some() {
            this.exclude_source_metadata()?;
        }
        Ok(this)
    }

    fn repo(&self) -> Result<&Git2Repository> {
        self.repo.as_ref().ok_or_else(|| {
            anyhow!(
                "git repository at {} is not initialized",
                self.workdir.display()
            )
        })
    }

    /// The source checkout lives alongside `.git`; keep it out of the index.
    fn exclude_source_metadata(&self) -> Result<()> {
        let repo = self.repo()?;
        let exclude = repo.path().join("info").join("exclude");
        let current = fs::read_to_string(&exclude).unwrap_or_default();
        if current.lines().any(|line| line.trim() == ".hg/") {
            return Ok(());
        }

        if let Some(parent) = exclude.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut contents = current;
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(".hg/\n");
        fs::write(&exclude, contents)
            .with_context(|| format!("failed to write {}", exclude.display()))?;
        Ok(())
    }

    fn checkout(&self, branch_name: &str) -> Result<()> {
        let repo = self.repo()?;
        let branch = repo.find_branch(branch_name, BranchType::Local)?;
        let reference = branch.get();
        let object = reference.peel(ObjectType::Commit)?;

        repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))?;
        let refname = reference
            .name()
            .ok_or_else(|| anyhow!("branch {} has an invalid reference name", branch_name))?;
        repo.set_head(refname)?;
        Ok(())
    }
}

impl Target for GitRepo {
    fn init_repository(&mut self) -> Result<()> {
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        let repo = Git2Repository::init_opts(&self.workdir, &options).with_context(|| {
            format!(
                "failed to initialize git repository at {}",
                self.workdir.display()
            )
        })?;
        self.repo = Some(repo);
        self.exclude_source_metadata()
    }

    fn switch_to_new_branch(&mut self, name: &str, start_commit: &str) -> Result<()> {
        let repo = self.repo()?;
        let oid = Oid::from_str(start_commit)?;
        let commit = repo.find_commit(oid)?;
        repo.branch(name, &commit, false)?;
        self.checkout(name)
    }

    fn switch_branch(&mut self, name: &str) -> Result<()> {
        self.checkout(name)
    }

    fn merge_no_commit(&mut self, other_branch: &str) -> Result<()> {
        MergeOps::new(self.repo()?).merge_no_commit(other_branch)
    }

    fn stage_all_changes(&mut self) -> Result<()> {
        CommitOps::new(self.repo()?).stage_all_changes()
    }

    fn commit(&mut self, message: &str, author: &Identity, when: WhenSpec) -> Result<String> {
        let repo = self.repo()?;
        let signature = author.signature(when)?;
        let merge_heads = MergeOps::new(repo).merge_heads()?;
        CommitOps::new(repo).create(message, &signature, &merge_heads)
    }

    fn tag(&mut self, name: &str, author: &Identity, when: WhenSpec) -> Result<()> {
        let repo = self.repo()?;
        let signature = author.signature(when)?;
        TagOps::new(repo).create_at_head(name, &signature)
    }

    fn delete_branch(&mut self, name: &str) -> Result<()> {
        let repo = self.repo()?;
        let mut branch = repo.find_branch(name, BranchType::Local)?;
        branch.delete()?;
        Ok(())
    }

    fn head_commit_id(&self) -> Result<String> {
        let repo = self.repo()?;
        let head = repo.head()?.peel_to_commit()?;
        Ok(head.id().to_string())
    }

    /// libgit2 exposes no repack; delegate to the git client.
    fn repack(&self) -> Result<()> {
        debug!("repacking {}", self.workdir.display());
        let output = Command::new("git")
            .args(["repack", "-a", "-d"])
            .current_dir(&self.workdir)
            .output()
            .context("failed to run git repack")?;
        if !output.status.success() {
            bail!(
                "git repack failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
