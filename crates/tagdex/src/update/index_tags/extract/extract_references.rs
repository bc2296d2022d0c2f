use std::borrow::Cow;
use std::sync::atomic::Ordering;

use bstr::ByteSlice;
use indexmap::IndexMap;
use tracing::{debug, info};

use super::super::run::IndexRun;
use super::blob_hash_and_filename;
use crate::family::{file_family, Family};
use crate::records::push_int;
use crate::{LineNumber, Result};

/// Re-tokenizes every new blob of the tags owned by this worker and records
/// which defined identifiers it mentions, and where.
///
/// A token only counts as a reference when it has a definitions entry and
/// the (blob, line) pair is not the very definition the definition extractor
/// just recorded; a definition line never references itself. Waiting for the
/// tag's D event is what makes both tests meaningful.
pub(crate) fn extract_references(
    run: &IndexRun<'_>,
    worker: usize,
    pool_size: usize,
) -> Result<()> {
    let index = run.index;

    let mut tag_index = worker;
    while tag_index < run.tags.len() {
        let new_ids = run.wait_assigned(tag_index)?;
        run.wait_defs_done(tag_index)?;
        let tag = &run.tags[tag_index];

        for (nth, &id) in new_ids.iter().enumerate() {
            if nth > 0 && nth % run.config.progress_every == 0 {
                let done = run.tags_done_refs.load(Ordering::Relaxed);
                run.progress.report(format_args!("refs: {}: {} blobs", tag.as_bstr(), nth), done);
            }

            let (hash, filename) = {
                let rtxn = index.read_txn()?;
                blob_hash_and_filename(index, &rtxn, id)?
            };
            let Some(family) = file_family(&filename) else { continue };

            let chunks = run.repo.tokenize(&hash, family)?;

            // Lines where each identifier occurs, in encounter order.
            let mut occurrences: IndexMap<Vec<u8>, Vec<u8>> = IndexMap::new();
            {
                let line_map = run.defs_lock.lock().unwrap_or_else(|e| e.into_inner());
                let rtxn = index.read_txn()?;
                let mut line: LineNumber = 1;

                for (nth_chunk, chunk) in chunks.iter().enumerate() {
                    // Chunks alternate, non-identifier text first; the
                    // non-identifier chunks carry one \x01 per swallowed
                    // newline.
                    if nth_chunk % 2 == 0 {
                        line += chunk.iter().filter(|&&b| b == 0x01).count() as LineNumber;
                        continue;
                    }

                    let token: Cow<'_, [u8]> = match family {
                        // Kconfig sources spell configuration symbols
                        // without their CONFIG_ prefix.
                        Family::K => {
                            let mut token = b"CONFIG_".to_vec();
                            token.extend_from_slice(chunk);
                            Cow::Owned(token)
                        }
                        // In Makefiles only already-prefixed tokens can
                        // reference anything.
                        Family::M if !chunk.starts_with(b"CONFIG_") => continue,
                        _ => Cow::Borrowed(chunk.as_slice()),
                    };

                    if !index.has_definition(&rtxn, &token)? {
                        continue;
                    }
                    if line_map.get(&(id, line)).map(Vec::as_slice) == Some(&*token) {
                        continue;
                    }

                    let lines = occurrences.entry(token.into_owned()).or_default();
                    if !lines.is_empty() {
                        lines.push(b',');
                    }
                    push_int(lines, line);
                }
            }

            if occurrences.is_empty() {
                continue;
            }

            let mut wtxn = index.write_txn()?;
            for (ident, lines) in occurrences {
                let mut refs = index.references(&wtxn, &ident)?.unwrap_or_default();
                refs.append(id, &lines, family);
                index.put_references(&mut wtxn, &ident, &refs)?;
                debug!(
                    "ref: {} in blob {} lines {} [{}]",
                    ident.as_bstr(),
                    id,
                    lines.as_bstr(),
                    family.as_str()
                );
            }
            wtxn.commit()?;
        }

        let done = run.tags_done_refs.fetch_add(1, Ordering::Relaxed) + 1;
        run.progress
            .report(format_args!("refs: {}: {} blobs", tag.as_bstr(), new_ids.len()), done);
        tag_index += pool_size;
    }

    info!("reference extractor {worker} exiting");
    Ok(())
}
