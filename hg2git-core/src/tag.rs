use anyhow::{anyhow, Result};
use git2::{ObjectType, Repository as Git2Repository, Signature};

/// Tag creation for the conversion target.
pub struct TagOps<'repo> {
    repo: &'repo Git2Repository,
}

impl<'repo> TagOps<'repo> {
    pub fn new(repo: &'repo Git2Repository) -> Self {
        TagOps { repo }
    }

    /// Tag the current HEAD commit. The tag carries the acting identity and
    /// date; the message stays empty.
    pub fn create_at_head(&self, name: &str, tagger: &Signature) -> Result<()> {
        let target_oid = self
            .repo
            .head()?
            .target()
            .ok_or_else(|| anyhow!("HEAD is not pointing to a valid commit"))?;
        let target_obj = self.repo.find_object(target_oid, Some(ObjectType::Commit))?;

        self.repo.tag(name, &target_obj, tagger, "", false)?;
        Ok(())
    }
}
