use bstr::ByteSlice;
use tracing::info;

use super::run::IndexRun;
use crate::Result;

/// Discovers the blob contents of each new tag, in order, and assigns the
/// next integer id to every content hash not seen before.
///
/// A whole tag's assignment is one store transaction: either all of its new
/// ids, basenames and the updated `numBlobs` land together, or none do, so a
/// crash never leaves ids above the recorded counter.
pub(crate) fn assign_blob_ids(run: &IndexRun<'_>) -> Result<()> {
    let index = run.index;

    for (tag_index, tag) in run.tags.iter().enumerate() {
        let blobs = run.repo.list_blobs_with_filenames(tag)?;

        let mut wtxn = index.write_txn()?;
        let mut next_id = index.num_blobs(&wtxn)?;
        let mut new_ids = Vec::new();
        for (hash, basename) in blobs {
            if index.blob_id(&wtxn, &hash)?.is_none() {
                index.put_blob_id(&mut wtxn, &hash, next_id)?;
                index.put_blob_hash(&mut wtxn, next_id, &hash)?;
                index.put_blob_filename(&mut wtxn, next_id, &basename)?;
                new_ids.push(next_id);
                next_id += 1;
            }
        }
        index.put_num_blobs(&mut wtxn, next_id)?;
        wtxn.commit()?;

        run.progress
            .report(format_args!("ids: {}: {} new blobs", tag.as_bstr(), new_ids.len()), tag_index);
        run.set_assigned(tag_index, new_ids);
    }

    info!("blob id assigner exiting");
    Ok(())
}
