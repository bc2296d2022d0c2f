use std::sync::atomic::Ordering;

use bstr::ByteSlice;
use tracing::{debug, info};

use super::super::run::IndexRun;
use super::blob_hash_and_filename;
use crate::family::{file_family, Family};
use crate::ident::is_ident;
use crate::records::{DefKind, DefList};
use crate::Result;

/// Parses the definitions of every new blob of the tags owned by this
/// worker and appends them to the definitions index.
///
/// Worker `worker` of a pool of `pool_size` owns tag indices
/// `worker, worker + pool_size, …`; it alone sets the tag's D event, which
/// releases the reference extractors for that tag.
pub(crate) fn extract_definitions(
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
                let done = run.tags_done_defs.load(Ordering::Relaxed);
                run.progress.report(format_args!("defs: {}: {} blobs", tag.as_bstr(), nth), done);
            }

            let (hash, filename) = {
                let rtxn = index.read_txn()?;
                blob_hash_and_filename(index, &rtxn, id)?
            };
            let Some(family) = file_family(&filename) else { continue };
            // Makefiles define nothing; their CONFIG_ tokens are references.
            if family == Family::M {
                continue;
            }

            let triples = run.repo.parse_defs(&hash, &filename, family)?;
            if triples.is_empty() {
                continue;
            }

            // The same-line map and the definitions database must move
            // together: the reference extractors read them as one snapshot
            // once this tag's D event fires.
            let mut line_map = run.defs_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut wtxn = index.write_txn()?;
            for (ident, kind_char, line) in triples {
                line_map.insert((id, line), ident.clone());

                let Some(kind) = DefKind::from_char(kind_char) else { continue };
                let mut defs = match index.definitions(&wtxn, &ident)? {
                    Some(defs) => defs,
                    None if is_ident(&ident, family) => DefList::default(),
                    None => continue,
                };
                defs.append(id, kind, line, family);
                index.put_definitions(&mut wtxn, &ident, &defs)?;
                debug!(
                    "def: {} {} in blob {} line {} [{}]",
                    ident.as_bstr(),
                    kind.name(),
                    id,
                    line,
                    family.as_str()
                );
            }
            wtxn.commit()?;
        }

        let done = run.tags_done_defs.fetch_add(1, Ordering::Relaxed) + 1;
        run.progress
            .report(format_args!("defs: {}: {} blobs", tag.as_bstr(), new_ids.len()), done);
        run.set_defs_done(tag_index);
        tag_index += pool_size;
    }

    info!("definition extractor {worker} exiting");
    Ok(())
}
