mod assign_blob_ids;
mod extract;
mod record_versions;
mod run;

use std::thread;

use tracing::info;

use self::assign_blob_ids::assign_blob_ids;
use self::extract::{
    extract_compatible_docs, extract_compatibles, extract_definitions, extract_doc_comments,
    extract_references,
};
use self::record_versions::record_versions;
use self::run::IndexRun;
use crate::error::InternalError;
use crate::progress::Progress;
use crate::repo::Repo;
use crate::update::indexer_config::PoolSizes;
use crate::update::IndexerConfig;
use crate::{Error, Index, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagIndexingResult {
    /// The number of tags that were new and are now recorded.
    pub indexed_tags: usize,
    /// The number of blob ids assigned during this run.
    pub new_blobs: u64,
}

/// One incremental indexing pass: ingests every tag the repository knows
/// about that is not yet present in the versions database.
pub struct IndexTags<'a> {
    index: &'a Index,
    repo: &'a Repo,
    config: &'a IndexerConfig,
}

impl<'a> IndexTags<'a> {
    pub fn new(index: &'a Index, repo: &'a Repo, config: &'a IndexerConfig) -> IndexTags<'a> {
        IndexTags { index, repo, config }
    }

    pub fn execute(self) -> Result<TagIndexingResult> {
        let IndexTags { index, repo, config } = self;

        let pools = PoolSizes::for_budget(config.worker_budget, index.dts_enabled())?;

        let tags = {
            let rtxn = index.read_txn()?;
            let mut tags = Vec::new();
            for tag in repo.list_tags()? {
                if !index.has_version(&rtxn, &tag)? {
                    tags.push(tag);
                }
            }
            tags
        };
        info!("found {} new tags", tags.len());

        if tags.is_empty() {
            return Ok(TagIndexingResult { indexed_tags: 0, new_blobs: 0 });
        }

        let num_blobs_before = {
            let rtxn = index.read_txn()?;
            index.num_blobs(&rtxn)?
        };

        let progress = Progress::new(&index.path(), tags.len());
        let run = IndexRun::new(index, repo, config, &tags, progress);
        let run = &run;

        thread::scope(|scope| {
            let mut handles = Vec::new();

            handles.push(
                scope.spawn(move || run.stage("blob id assigner", || assign_blob_ids(run))),
            );
            handles
                .push(scope.spawn(move || run.stage("version recorder", || record_versions(run))));

            for worker in 0..pools.defs {
                handles.push(scope.spawn(move || {
                    run.stage("definition extractor", || {
                        extract_definitions(run, worker, pools.defs)
                    })
                }));
            }
            for worker in 0..pools.refs {
                handles.push(scope.spawn(move || {
                    run.stage("reference extractor", || extract_references(run, worker, pools.refs))
                }));
            }
            for worker in 0..pools.docs {
                handles.push(scope.spawn(move || {
                    run.stage("doc-comment extractor", || {
                        extract_doc_comments(run, worker, pools.docs)
                    })
                }));
            }
            for worker in 0..pools.comps {
                handles.push(scope.spawn(move || {
                    run.stage("compatible extractor", || {
                        extract_compatibles(run, worker, pools.comps)
                    })
                }));
            }
            for worker in 0..pools.comp_docs {
                handles.push(scope.spawn(move || {
                    run.stage("compatible-docs extractor", || {
                        extract_compatible_docs(run, worker, pools.comp_docs)
                    })
                }));
            }

            let mut first_error = None;
            for handle in handles {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(InternalError::WorkerPanicked { stage: "indexing" }.into())
                });
                if let Err(error) = result {
                    // Keep the error that caused the abort, not the aborts
                    // it provoked in the other stages.
                    let replaces = match &first_error {
                        None => true,
                        Some(Error::InternalError(InternalError::AbortedIndexation)) => {
                            !is_aborted(&error)
                        }
                        Some(_) => false,
                    };
                    if replaces {
                        first_error = Some(error);
                    }
                }
            }
            match first_error {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })?;

        let rtxn = index.read_txn()?;
        let new_blobs = index.num_blobs(&rtxn)? - num_blobs_before;
        Ok(TagIndexingResult { indexed_tags: tags.len(), new_blobs })
    }
}

fn is_aborted(error: &Error) -> bool {
    matches!(error, Error::InternalError(InternalError::AbortedIndexation))
}
