use std::sync::atomic::Ordering;

use bstr::ByteSlice;
use indexmap::IndexMap;
use tracing::{debug, info};

use super::super::run::IndexRun;
use super::blob_hash_and_filename;
use crate::family::{file_family, Family};
use crate::records::push_int;
use crate::Result;

/// Records the documentation-comment anchors of every new blob of the tags
/// owned by this worker. Anchors are recorded unconditionally, there is no
/// definition test.
pub(crate) fn extract_doc_comments(
    run: &IndexRun<'_>,
    worker: usize,
    pool_size: usize,
) -> Result<()> {
    let index = run.index;

    let mut tag_index = worker;
    while tag_index < run.tags.len() {
        let new_ids = run.wait_assigned(tag_index)?;
        let tag = &run.tags[tag_index];

        for (nth, &id) in new_ids.iter().enumerate() {
            if nth > 0 && nth % run.config.progress_every == 0 {
                let done = run.tags_done_docs.load(Ordering::Relaxed);
                run.progress.report(format_args!("docs: {}: {} blobs", tag.as_bstr(), nth), done);
            }

            let (hash, filename) = {
                let rtxn = index.read_txn()?;
                blob_hash_and_filename(index, &rtxn, id)?
            };
            let Some(family) = file_family(&filename) else { continue };
            if family == Family::M {
                continue;
            }

            let anchors = run.repo.parse_docs(&hash, &filename)?;
            if anchors.is_empty() {
                continue;
            }

            let mut occurrences: IndexMap<Vec<u8>, Vec<u8>> = IndexMap::new();
            for (ident, line) in anchors {
                let lines = occurrences.entry(ident).or_default();
                if !lines.is_empty() {
                    lines.push(b',');
                }
                push_int(lines, line);
            }

            let mut wtxn = index.write_txn()?;
            for (ident, lines) in occurrences {
                let mut docs = index.doc_comments(&wtxn, &ident)?.unwrap_or_default();
                docs.append(id, &lines, family);
                index.put_doc_comments(&mut wtxn, &ident, &docs)?;
                debug!(
                    "doc: {} in blob {} lines {} [{}]",
                    ident.as_bstr(),
                    id,
                    lines.as_bstr(),
                    family.as_str()
                );
            }
            wtxn.commit()?;
        }

        let done = run.tags_done_docs.fetch_add(1, Ordering::Relaxed) + 1;
        run.progress
            .report(format_args!("docs: {}: {} blobs", tag.as_bstr(), new_ids.len()), done);
        tag_index += pool_size;
    }

    info!("doc-comment extractor {worker} exiting");
    Ok(())
}
