use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, TimeZone};
use graph::{BranchAssignment, Revision, RevisionGraph};
use tracing::warn;
use walkdir::WalkDir;

use crate::identity::{Identity, WhenSpec};
use crate::source::{ChangesetInfo, Source};
use crate::state::ConversionState;
use crate::target::Target;

/// Mercurial's floating tag for the newest changeset; never replicated.
const TIP_TAG: &str = "tip";

/// The two metadata directories that survive the per-revision sweep.
const KEEP_DIRS: [&str; 2] = [".git", ".hg"];

/// What to do when a mutating step fails mid-revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and keep going, accepting a possibly partially applied revision.
    BestEffort,
    /// Abort the run on the first failure.
    FailFast,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub failure_policy: FailurePolicy,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        ReplayOptions {
            failure_policy: FailurePolicy::BestEffort,
        }
    }
}

/// Replay every unconverted revision into the target, oldest first, and
/// record each new commit in the conversion state. Returns how many
/// revisions this run converted.
///
/// Metadata reads and the initial repository creation are always fatal;
/// whether a failed mutating step aborts the run is decided by the failure
/// policy.
pub fn replay<S: Source, T: Target>(
    graph: &RevisionGraph,
    branches: &BranchAssignment,
    source: &S,
    target: &mut T,
    state: &mut ConversionState,
    workdir: &Path,
    options: &ReplayOptions,
) -> Result<usize> {
    let policy = options.failure_policy;

    if !state.contains(0) {
        println!("creating repository");
        target.init_repository()?;
    }

    let mut converted = 0usize;
    for rev in 0..=graph.tip() {
        if state.contains(rev) {
            continue;
        }
        converted += 1;

        let info = source
            .changeset(rev)
            .with_context(|| format!("failed to read metadata for revision {rev}"))?;
        let message = source
            .message(rev)
            .with_context(|| format!("failed to read message for revision {rev}"))?;
        let author = Identity::parse(&info.author);
        let label = branches.label(rev);
        let (parent, merge_parent) = graph.parents(rev);

        print_banner(rev, label, &info, &message, parent, merge_parent);

        // Position the working tree on the right branch. Revision 0 lands
        // on the default branch of the freshly created repository.
        if let Some(parent) = parent {
            if branches.is_fresh(rev) {
                let start = state
                    .commit_id(parent)
                    .ok_or_else(|| {
                        anyhow!("parent revision {parent} of {rev} has no recorded commit")
                    })?
                    .to_string();
                println!("creating new branch {label}");
                step(
                    policy,
                    "branch creation",
                    target.switch_to_new_branch(label, &start),
                )?;
            } else {
                println!("checking out branch {label}");
                step(policy, "branch checkout", target.switch_branch(label))?;
            }
        }

        // Join the other side of a merge at the index level. The other side
        // is whichever parent is not on the branch currently checked out.
        let mut merged: Option<(String, Revision)> = None;
        if let (Some(parent), Some(merge_parent)) = (parent, merge_parent) {
            let (other, other_head) = if branches.label(parent) == label {
                (branches.label(merge_parent), merge_parent)
            } else {
                (branches.label(parent), parent)
            };
            println!("merging {other} into {label}");
            step(policy, "merge", target.merge_no_commit(other))?;
            merged = Some((other.to_string(), other_head));
        }

        // The source does not promise the shared tree matches the revision
        // unless it starts from nothing: clear, then repopulate.
        step(policy, "working tree cleanup", clear_worktree(workdir))?;
        step(policy, "working tree checkout", source.materialize(rev))?;

        step(policy, "staging", target.stage_all_changes())?;
        step(
            policy,
            "commit",
            target.commit(&message, &author, info.when).map(|_| ()),
        )?;

        if let Some(tag) = info.tag.as_deref() {
            if tag != TIP_TAG {
                step(policy, "tag", target.tag(tag, &author, info.when))?;
            }
        }

        // A short-lived branch that ends at this merge has no further use.
        if let Some((other, other_head)) = merged.as_ref() {
            if graph.children(*other_head).iter().all(|&child| child == rev) {
                println!("deleting unused branch: {other}");
                step(policy, "branch deletion", target.delete_branch(other))?;
            }
        }

        match target.head_commit_id() {
            Ok(id) => {
                println!("record {rev} -> {id}");
                state.record(rev, id);
            }
            Err(err) => match policy {
                FailurePolicy::FailFast => {
                    return Err(
                        err.context(format!("failed to read the new commit id for revision {rev}"))
                    )
                }
                FailurePolicy::BestEffort => {
                    warn!("leaving revision {rev} unrecorded: {err:#}")
                }
            },
        }
    }

    Ok(converted)
}

fn step(policy: FailurePolicy, what: &str, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => match policy {
            FailurePolicy::FailFast => Err(err.context(format!("{what} failed"))),
            FailurePolicy::BestEffort => {
                warn!("{what} failed, continuing: {err:#}");
                Ok(())
            }
        },
    }
}

fn print_banner(
    rev: Revision,
    label: &str,
    info: &ChangesetInfo,
    message: &str,
    parent: Option<Revision>,
    merge_parent: Option<Revision>,
) {
    println!("-----------------------------------------");
    println!("cset: {rev}");
    println!("branch: {label}");
    println!("user: {}", info.author);
    println!("date: {}", render_when(info.when));
    println!("comment: {message}");
    if let Some(parent) = parent {
        println!("parent: {parent}");
    }
    if let Some(merge_parent) = merge_parent {
        println!("mparent: {merge_parent}");
    }
    if let Some(tag) = info.tag.as_deref() {
        println!("tag: {tag}");
    }
    println!("-----------------------------------------");
}

fn render_when(when: WhenSpec) -> String {
    FixedOffset::east_opt(when.offset_minutes * 60)
        .and_then(|zone| zone.timestamp_opt(when.seconds, 0).single())
        .map(|date| date.to_rfc2822())
        .unwrap_or_else(|| when.seconds.to_string())
}

/// Remove everything from the working tree except the two repositories'
/// metadata directories, so files deleted in the source actually disappear
/// before it repopulates the tree.
fn clear_worktree(workdir: &Path) -> Result<()> {
    for entry in WalkDir::new(workdir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if KEEP_DIRS.contains(&name.as_ref()) {
            continue;
        }
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())
                .with_context(|| format!("failed to remove {}", entry.path().display()))?;
        } else {
            fs::remove_file(entry.path())
                .with_context(|| format!("failed to remove {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct FakeChangeset {
        explicit_parents: Vec<Revision>,
        author: &'static str,
        message: &'static str,
        tag: Option<&'static str>,
        files: Vec<(&'static str, &'static str)>,
    }

    fn cset(
        explicit_parents: &[Revision],
        author: &'static str,
        message: &'static str,
        tag: Option<&'static str>,
        files: &[(&'static str, &'static str)],
    ) -> FakeChangeset {
        FakeChangeset {
            explicit_parents: explicit_parents.to_vec(),
            author,
            message,
            tag,
            files: files.to_vec(),
        }
    }

    struct FakeSource {
        workdir: PathBuf,
        changesets: Vec<FakeChangeset>,
    }

    impl Source for FakeSource {
        fn tip(&self) -> Result<Revision> {
            Ok((self.changesets.len() - 1) as Revision)
        }

        fn parents(&self, rev: Revision) -> Result<Vec<Revision>> {
            Ok(self.changesets[rev as usize].explicit_parents.clone())
        }

        fn changeset(&self, rev: Revision) -> Result<ChangesetInfo> {
            let cset = &self.changesets[rev as usize];
            Ok(ChangesetInfo {
                tag: cset.tag.map(String::from),
                author: cset.author.to_string(),
                when: WhenSpec {
                    seconds: 1_000_000 + rev as i64,
                    offset_minutes: 0,
                },
            })
        }

        fn message(&self, rev: Revision) -> Result<String> {
            Ok(self.changesets[rev as usize].message.to_string())
        }

        fn materialize(&self, rev: Revision) -> Result<()> {
            for (name, content) in &self.changesets[rev as usize].files {
                fs::write(self.workdir.join(name), content)?;
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone)]
    struct FakeCommit {
        id: String,
        parents: Vec<String>,
        branch: String,
        message: String,
        author: Identity,
    }

    #[derive(Default)]
    struct FakeTarget {
        commits: Vec<FakeCommit>,
        branches: HashMap<String, String>,
        current: String,
        pending_merge: Option<String>,
        tags: Vec<(String, String)>,
        merged_log: Vec<String>,
        deleted: Vec<String>,
        initialized: bool,
        mutations: usize,
    }

    impl Target for FakeTarget {
        fn init_repository(&mut self) -> Result<()> {
            self.initialized = true;
            self.current = "main".to_string();
            self.mutations += 1;
            Ok(())
        }

        fn switch_to_new_branch(&mut self, name: &str, start_commit: &str) -> Result<()> {
            self.branches
                .insert(name.to_string(), start_commit.to_string());
            self.current = name.to_string();
            self.mutations += 1;
            Ok(())
        }

        fn switch_branch(&mut self, name: &str) -> Result<()> {
            if !self.branches.contains_key(name) {
                return Err(anyhow!("no branch named {name}"));
            }
            self.current = name.to_string();
            self.mutations += 1;
            Ok(())
        }

        fn merge_no_commit(&mut self, other_branch: &str) -> Result<()> {
            let head = self
                .branches
                .get(other_branch)
                .ok_or_else(|| anyhow!("no branch named {other_branch}"))?;
            self.pending_merge = Some(head.clone());
            self.merged_log.push(other_branch.to_string());
            self.mutations += 1;
            Ok(())
        }

        fn stage_all_changes(&mut self) -> Result<()> {
            self.mutations += 1;
            Ok(())
        }

        fn commit(&mut self, message: &str, author: &Identity, _when: WhenSpec) -> Result<String> {
            let mut parents = Vec::new();
            if let Some(head) = self.branches.get(&self.current) {
                parents.push(head.clone());
            }
            if let Some(merge_head) = self.pending_merge.take() {
                parents.push(merge_head);
            }

            let id = format!("c{}", self.commits.len());
            self.branches.insert(self.current.clone(), id.clone());
            self.commits.push(FakeCommit {
                id: id.clone(),
                parents,
                branch: self.current.clone(),
                message: message.to_string(),
                author: author.clone(),
            });
            self.mutations += 1;
            Ok(id)
        }

        fn tag(&mut self, name: &str, _author: &Identity, _when: WhenSpec) -> Result<()> {
            let head = self
                .branches
                .get(&self.current)
                .ok_or_else(|| anyhow!("nothing to tag"))?;
            self.tags.push((name.to_string(), head.clone()));
            self.mutations += 1;
            Ok(())
        }

        fn delete_branch(&mut self, name: &str) -> Result<()> {
            self.branches
                .remove(name)
                .ok_or_else(|| anyhow!("no branch named {name}"))?;
            self.deleted.push(name.to_string());
            self.mutations += 1;
            Ok(())
        }

        fn head_commit_id(&self) -> Result<String> {
            self.branches
                .get(&self.current)
                .cloned()
                .ok_or_else(|| anyhow!("branch {} has no commits", self.current))
        }

        fn repack(&self) -> Result<()> {
            Ok(())
        }
    }

    fn run(
        source: &FakeSource,
        target: &mut FakeTarget,
        state: &mut ConversionState,
        workdir: &Path,
    ) -> usize {
        let graph = RevisionGraph::build(source.tip().unwrap(), |rev| source.parents(rev)).unwrap();
        let branches = BranchAssignment::infer(&graph);
        replay(
            &graph,
            &branches,
            source,
            target,
            state,
            workdir,
            &ReplayOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn linear_history_becomes_a_single_chain_on_main() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "Jane Doe <jane@example.com>", "first", None, &[("a.txt", "1")]),
                cset(&[], "Jane Doe <jane@example.com>", "second", None, &[("a.txt", "2")]),
                cset(&[], "anonymous", "third", Some("v1"), &[("a.txt", "3")]),
            ],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        let converted = run(&source, &mut target, &mut state, dir.path());

        assert_eq!(converted, 3);
        assert!(target.initialized);
        assert_eq!(target.commits.len(), 3);
        assert!(target.commits.iter().all(|commit| commit.branch == "main"));
        assert!(target.commits[0].parents.is_empty());
        assert_eq!(target.commits[1].parents, vec!["c0"]);
        assert_eq!(target.commits[2].parents, vec!["c1"]);
        assert_eq!(state.commit_id(2), Some("c2"));

        // Author decomposition flows through to the commits.
        assert_eq!(target.commits[0].author.name, "Jane Doe");
        assert_eq!(target.commits[0].author.email, "jane@example.com");
        assert_eq!(target.commits[2].author.name, "anonymous");
        assert_eq!(target.commits[2].author.email, "");

        assert_eq!(target.tags, vec![("v1".to_string(), "c2".to_string())]);
    }

    #[test]
    fn the_tip_tag_is_never_replicated() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![cset(&[], "a", "only", Some("tip"), &[])],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        run(&source, &mut target, &mut state, dir.path());
        assert!(target.tags.is_empty());
    }

    #[test]
    fn a_fork_and_merge_produce_a_two_parent_commit_and_prune_the_branch() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "a", "r0", None, &[("f.txt", "0")]),
                cset(&[], "a", "r1", None, &[("f.txt", "1")]),
                cset(&[], "a", "r2", None, &[("f.txt", "2")]),
                cset(&[1], "a", "r3", None, &[("g.txt", "3")]),
                cset(&[2, 3], "a", "merge", None, &[("f.txt", "2"), ("g.txt", "3")]),
            ],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        run(&source, &mut target, &mut state, dir.path());

        assert_eq!(target.commits.len(), 5);
        // Revision 3 diverged from 1, so its commit starts at c1.
        assert_eq!(target.commits[3].branch, "branch-3");
        assert_eq!(target.commits[3].parents, vec!["c1"]);
        // The merge lands on main with both sides as parents.
        assert_eq!(target.commits[4].branch, "main");
        assert_eq!(target.commits[4].parents, vec!["c2", "c3"]);
        assert_eq!(target.merged_log, vec!["branch-3"]);
        // branch-3 ended at the merge and was pruned.
        assert_eq!(target.deleted, vec!["branch-3"]);
        assert!(!target.branches.contains_key("branch-3"));
    }

    #[test]
    fn the_merge_joins_the_non_current_side_even_when_it_is_the_primary_parent() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "a", "r0", None, &[]),
                cset(&[], "a", "r1", None, &[]),
                cset(&[], "a", "r2", None, &[]),
                cset(&[1], "a", "r3", None, &[]),
                // The divergent side is the primary parent this time.
                cset(&[3, 2], "a", "merge", None, &[]),
            ],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        run(&source, &mut target, &mut state, dir.path());

        // The merge revision is on main (its merge parent is), so the other
        // side is the synthetic branch.
        assert_eq!(target.commits[4].branch, "main");
        assert_eq!(target.merged_log, vec!["branch-3"]);
        assert_eq!(target.commits[4].parents, vec!["c2", "c3"]);
    }

    #[test]
    fn a_continued_branch_is_not_pruned_after_its_merge() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "a", "r0", None, &[]),
                cset(&[], "a", "r1", None, &[]),
                cset(&[0], "a", "r2", None, &[]),
                cset(&[1, 2], "a", "merge", None, &[]),
                // branch-2 keeps living after the merge.
                cset(&[2], "a", "r4", None, &[]),
            ],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        run(&source, &mut target, &mut state, dir.path());

        assert_eq!(target.merged_log, vec!["branch-2"]);
        assert!(target.deleted.is_empty());
        assert!(target.branches.contains_key("branch-2"));
    }

    #[test]
    fn a_second_run_with_no_new_revisions_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "a", "r0", None, &[("a.txt", "1")]),
                cset(&[], "a", "r1", None, &[("a.txt", "2")]),
            ],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        let first = run(&source, &mut target, &mut state, dir.path());
        assert_eq!(first, 2);
        let mutations = target.mutations;

        let second = run(&source, &mut target, &mut state, dir.path());
        assert_eq!(second, 0);
        assert_eq!(target.mutations, mutations);
        assert_eq!(target.commits.len(), 2);
    }

    #[test]
    fn an_incremental_run_converts_only_the_new_revisions() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "a", "r0", None, &[("a.txt", "1")]),
                cset(&[], "a", "r1", None, &[("a.txt", "2")]),
            ],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        run(&source, &mut target, &mut state, dir.path());

        source
            .changesets
            .push(cset(&[], "a", "r2", None, &[("a.txt", "3")]));
        let converted = run(&source, &mut target, &mut state, dir.path());

        assert_eq!(converted, 1);
        assert_eq!(target.commits.len(), 3);
        assert_eq!(target.commits[2].parents, vec!["c1"]);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn the_working_tree_is_cleared_before_each_revision() {
        let dir = TempDir::new().unwrap();
        // Metadata directories and their contents must survive the sweep.
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("config"), "x").unwrap();
        fs::create_dir(dir.path().join(".hg")).unwrap();
        fs::write(dir.path().join("stale.txt"), "left over").unwrap();

        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "a", "r0", None, &[("a.txt", "1"), ("b.txt", "1")]),
                cset(&[], "a", "r1", None, &[("a.txt", "2")]),
            ],
        };
        let mut target = FakeTarget::default();
        let mut state = ConversionState::default();

        run(&source, &mut target, &mut state, dir.path());

        // b.txt existed in revision 0 only; the sweep removed it.
        assert!(!dir.path().join("b.txt").exists());
        assert!(!dir.path().join("stale.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "2");
        assert!(dir.path().join(".git").join("config").exists());
        assert!(dir.path().join(".hg").exists());
    }

    #[test]
    fn fail_fast_aborts_on_a_missing_branch() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            workdir: dir.path().to_path_buf(),
            changesets: vec![
                cset(&[], "a", "r0", None, &[]),
                cset(&[], "a", "r1", None, &[]),
            ],
        };
        let graph = RevisionGraph::build(source.tip().unwrap(), |rev| source.parents(rev)).unwrap();
        let branches = BranchAssignment::infer(&graph);

        // Pretend revision 0 was converted, but hand the driver a target
        // with no branches, so the checkout for revision 1 fails.
        let mut target = FakeTarget::default();
        target.initialized = true;
        target.current = "main".to_string();
        let mut state = ConversionState::default();
        state.record(0, "c0".to_string());

        let options = ReplayOptions {
            failure_policy: FailurePolicy::FailFast,
        };
        let result = replay(
            &graph,
            &branches,
            &source,
            &mut target,
            &mut state,
            dir.path(),
            &options,
        );
        assert!(result.is_err());
        assert!(target.commits.is_empty());
    }
}
