use std::path::PathBuf;

use anyhow::Context;
use byte_unit::Byte;
use clap::Parser;
use tagdex::heed::EnvOpenOptions;
use tagdex::update::{IndexTags, IndexerConfig};
use tagdex::{Index, Repo};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

const TAGDEX_DATA_DIR: &str = "TAGDEX_DATA_DIR";
const TAGDEX_REPO_DIR: &str = "TAGDEX_REPO_DIR";
const TAGDEX_HELPER: &str = "TAGDEX_HELPER";
const TAGDEX_INDEXING_THREADS: &str = "TAGDEX_INDEXING_THREADS";
const TAGDEX_MAX_INDEX_SIZE: &str = "TAGDEX_MAX_INDEX_SIZE";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opt {
    /// The directory holding the on-disk indexes of this project. It must
    /// already exist; an existing index is resumed, not overwritten.
    #[arg(long, env = TAGDEX_DATA_DIR)]
    data_dir: PathBuf,

    /// The root of the source repository to index. Passed to the
    /// revision-control helper through its environment.
    #[arg(long, env = TAGDEX_REPO_DIR)]
    repo_dir: PathBuf,

    /// The revision-control helper executable.
    #[arg(long, env = TAGDEX_HELPER, default_value = "./script.sh")]
    helper: PathBuf,

    /// Total worker budget shared by the extractor pools.
    #[arg(long, env = TAGDEX_INDEXING_THREADS, default_value_t = 10)]
    threads: usize,

    /// Maximum size the on-disk indexes can grow to.
    #[arg(long, env = TAGDEX_MAX_INDEX_SIZE, default_value = "100 GiB")]
    max_index_size: Byte,
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
        )
        .init();

    let repo = Repo::new(&opt.helper, &opt.repo_dir)?;
    let dts_comp = repo.dts_comp().context("probing device-tree support")?;

    let options = EnvOpenOptions::new();
    let mut options = options.read_txn_without_tls();
    options.map_size(opt.max_index_size.as_u64() as usize);
    let index = Index::new(options, &opt.data_dir, dts_comp)
        .with_context(|| format!("opening the index at {}", opt.data_dir.display()))?;

    let config = IndexerConfig { worker_budget: opt.threads, ..Default::default() };
    let result = IndexTags::new(&index, &repo, &config).execute()?;

    info!("indexed {} tags, {} new blobs", result.indexed_tags, result.new_blobs);
    Ok(())
}
