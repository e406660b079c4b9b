use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use graph::{BranchAssignment, RevisionGraph};
use hg2git_core::{
    ConversionState, FailurePolicy, GitRepo, HgSource, ReplayOptions, Source, Target,
};
use tracing::{debug, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "hg2git")]
#[command(about = "Convert a Mercurial repository into a git repository, incrementally", long_about = None)]
struct Cli {
    /// Mercurial project to import (directory)
    hgprj: PathBuf,

    /// State file saved/read for incremental runs
    #[arg(short = 's', long = "gitstate")]
    gitstate: Option<PathBuf>,

    /// Directory used for temporary files
    #[arg(short = 't', long = "tempdir")]
    tempdir: Option<PathBuf>,

    /// Number of new changesets that triggers a repack (negative to deactivate)
    #[arg(short = 'n', long = "nrepack", default_value_t = 0)]
    nrepack: i64,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Stop at the first failed git operation instead of carrying on
    #[arg(long)]
    fail_fast: bool,
}

fn main() -> Result<()> {
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // Resolve the state path up front; the conversion runs with the project
    // directory as the working tree.
    let gitstate = match cli.gitstate {
        Some(path) => Some(
            std::path::absolute(&path)
                .with_context(|| format!("failed to resolve state path {}", path.display()))?,
        ),
        None => None,
    };

    let mut state = match &gitstate {
        Some(path) => ConversionState::load(path)?,
        None => ConversionState::default(),
    };

    let source = HgSource::new(&cli.hgprj);
    let tip = source
        .tip()
        .context("failed to read the source tip revision")?;
    debug!("tip is {tip}");

    debug!("analysing the branches");
    let graph = RevisionGraph::build(tip, |rev| source.parents(rev))?;
    let branches = BranchAssignment::infer(&graph);

    let mut target = GitRepo::new(&cli.hgprj)?;
    let options = ReplayOptions {
        failure_policy: if cli.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::BestEffort
        },
    };
    let converted = hg2git_core::replay(
        &graph,
        &branches,
        &source,
        &mut target,
        &mut state,
        &cli.hgprj,
        &options,
    )?;
    debug!("{converted} new changesets converted");

    if cli.nrepack >= 0 && converted as i64 >= cli.nrepack {
        if let Err(err) = target.repack() {
            warn!("repack failed: {err:#}");
        }
    }

    if let Some(path) = &gitstate {
        debug!("writing state");
        state.flush(path, cli.tempdir.as_deref())?;
    }

    Ok(())
}
