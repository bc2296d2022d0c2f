use bstr::ByteSlice;
use tracing::info;

use super::run::IndexRun;
use crate::error::InternalError;
use crate::index::db_name;
use crate::records::PathList;
use crate::{BlobId, Result};

/// Paths under this prefix are device-tree binding documents.
const BINDINGS_DOC_PREFIX: &[u8] = b"Documentation/devicetree/bindings";

/// Records the ordered (id, path) list of each new tag.
///
/// The `versions` write is the final commit for a tag: its presence is what
/// marks the tag as indexed, so it is flushed to disk before the next tag is
/// started. Binding-document ids are collected on the way for the
/// compatible-docs extractor.
pub(crate) fn record_versions(run: &IndexRun<'_>) -> Result<()> {
    let index = run.index;

    for (tag_index, tag) in run.tags.iter().enumerate() {
        run.wait_assigned(tag_index)?;

        let blobs = run.repo.list_blobs_with_paths(tag)?;
        let mut entries: Vec<(BlobId, Vec<u8>)> = Vec::with_capacity(blobs.len());
        {
            let rtxn = index.read_txn()?;
            for (hash, path) in blobs {
                let id = index.blob_id(&rtxn, &hash)?.ok_or_else(|| {
                    InternalError::DatabaseMissingEntry {
                        db_name: db_name::BLOBS,
                        key: hash.into(),
                    }
                })?;
                if path.starts_with(BINDINGS_DOC_PREFIX) {
                    run.bindings.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
                }
                entries.push((id, path));
            }
        }
        entries.sort();

        let mut paths = PathList::default();
        for (id, path) in entries {
            paths.append(id, &path);
        }

        let mut wtxn = index.write_txn()?;
        index.put_version(&mut wtxn, tag, &paths)?;
        wtxn.commit()?;
        index.force_sync()?;

        run.progress.report(format_args!("versions: {}: recorded", tag.as_bstr()), tag_index);
        run.set_versions_done(tag_index);
    }

    info!("version recorder exiting");
    Ok(())
}
