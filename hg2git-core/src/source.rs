use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use graph::Revision;

use crate::identity::WhenSpec;

/// Per-changeset metadata needed to replay one revision. Fetched on demand
/// and discarded once the commit exists.
#[derive(Debug, Clone)]
pub struct ChangesetInfo {
    pub tag: Option<String>,
    pub author: String,
    pub when: WhenSpec,
}

/// Read-only view of the source repository, one query per call. Every call
/// blocks until the underlying tool finishes.
pub trait Source {
    /// Highest revision number currently present.
    fn tip(&self) -> Result<Revision>;

    /// Explicit parent revisions, as stored. Linear continuation is implied
    /// by an empty list.
    fn parents(&self, rev: Revision) -> Result<Vec<Revision>>;

    /// Tag, author and timestamp of a revision.
    fn changeset(&self, rev: Revision) -> Result<ChangesetInfo>;

    /// Full commit message of a revision.
    fn message(&self, rev: Revision) -> Result<String>;

    /// Make the working tree match the exact file state of a revision.
    fn materialize(&self, rev: Revision) -> Result<()>;
}

// One template per query kind; call sites never assemble query strings.
const TIP_TEMPLATE: &str = "{rev}";
const PARENTS_TEMPLATE: &str = "{parents}";
const CHANGESET_TEMPLATE: &str = "{tags}\n{date|hgdate}\n{author}\n";
const MESSAGE_TEMPLATE: &str = "{desc}";

/// Mercurial repository driven through the `hg` command line client.
pub struct HgSource {
    root: PathBuf,
}

impl HgSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        HgSource {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn hg(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("hg")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("failed to run hg {}", args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "hg {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn log_template(&self, rev: Revision, template: &str) -> Result<String> {
        let rev = rev.to_string();
        self.hg(&["log", "-r", &rev, "--template", template])
    }
}

impl Source for HgSource {
    fn tip(&self) -> Result<Revision> {
        let raw = self.hg(&["tip", "--template", TIP_TEMPLATE])?;
        raw.trim()
            .parse()
            .with_context(|| format!("unexpected hg tip output {raw:?}"))
    }

    fn parents(&self, rev: Revision) -> Result<Vec<Revision>> {
        let raw = self.log_template(rev, PARENTS_TEMPLATE)?;
        parse_parents(&raw).with_context(|| format!("unexpected parent list for revision {rev}"))
    }

    fn changeset(&self, rev: Revision) -> Result<ChangesetInfo> {
        let raw = self.log_template(rev, CHANGESET_TEMPLATE)?;
        let mut lines = raw.lines();
        let tag = lines.next().unwrap_or("").trim().to_string();
        let date = lines.next().unwrap_or("").trim().to_string();
        let author = lines.next().unwrap_or("").trim().to_string();

        Ok(ChangesetInfo {
            tag: if tag.is_empty() { None } else { Some(tag) },
            author,
            when: parse_hgdate(&date)
                .with_context(|| format!("unexpected hg date {date:?} for revision {rev}"))?,
        })
    }

    fn message(&self, rev: Revision) -> Result<String> {
        Ok(self.log_template(rev, MESSAGE_TEMPLATE)?.trim().to_string())
    }

    fn materialize(&self, rev: Revision) -> Result<()> {
        let rev = rev.to_string();
        self.hg(&["update", "-C", &rev])?;
        Ok(())
    }
}

/// Parse `{parents}` output: whitespace-separated `rev:node` pairs. The null
/// parent (`-1:000...`) is not a real edge and is dropped.
fn parse_parents(raw: &str) -> Result<Vec<Revision>> {
    let mut parents = Vec::new();
    for entry in raw.split_whitespace() {
        let number = entry.split(':').next().unwrap_or(entry);
        let number: i64 = number
            .parse()
            .with_context(|| format!("malformed parent entry {entry:?}"))?;
        if number >= 0 {
            parents.push(number as Revision);
        }
    }
    Ok(parents)
}

/// Parse `{date|hgdate}`: seconds since the epoch followed by the timezone
/// offset in seconds west of UTC. Git wants minutes east.
fn parse_hgdate(raw: &str) -> Result<WhenSpec> {
    let mut fields = raw.split_whitespace();
    let seconds: i64 = fields
        .next()
        .context("empty date")?
        .parse()
        .context("malformed seconds field")?;
    let offset: i32 = fields
        .next()
        .unwrap_or("0")
        .parse()
        .context("malformed offset field")?;

    Ok(WhenSpec {
        seconds,
        offset_minutes: -offset / 60,
    })
}
