use std::sync::atomic::Ordering;

use bstr::ByteSlice;
use indexmap::IndexMap;
use tracing::{debug, info};

use super::super::run::IndexRun;
use super::blob_hash_and_filename;
use crate::dts::scan_compatibles;
use crate::family::{file_family, Family};
use crate::records::push_int;
use crate::{LineNumber, Result};

/// Scans code and device-tree sources of the tags owned by this worker for
/// `compatible` strings. Only spawned when device-tree support is enabled.
pub(crate) fn extract_compatibles(
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
                let done = run.tags_done_comps.load(Ordering::Relaxed);
                run.progress.report(format_args!("comps: {}: {} blobs", tag.as_bstr(), nth), done);
            }

            let (hash, filename) = {
                let rtxn = index.read_txn()?;
                blob_hash_and_filename(index, &rtxn, id)?
            };
            let Some(family) = file_family(&filename) else { continue };
            if matches!(family, Family::K | Family::M) {
                continue;
            }

            let content = run.repo.get_blob(&hash)?;
            let occurrences = coalesce_lines(scan_compatibles(&content, family));
            if occurrences.is_empty() {
                continue;
            }

            let mut wtxn = index.write_txn()?;
            for (comp, lines) in occurrences {
                let mut refs = index.compatible(&wtxn, &comp)?.unwrap_or_default();
                refs.append(id, &lines, family);
                index.put_compatible(&mut wtxn, &comp, &refs)?;
                debug!(
                    "comp: {} in blob {} lines {} [{}]",
                    comp.as_bstr(),
                    id,
                    lines.as_bstr(),
                    family.as_str()
                );
            }
            wtxn.commit()?;
        }

        let done = run.tags_done_comps.fetch_add(1, Ordering::Relaxed) + 1;
        run.progress
            .report(format_args!("comps: {}: {} blobs", tag.as_bstr(), new_ids.len()), done);
        run.set_comps_done(tag_index);
        tag_index += pool_size;
    }

    info!("compatible extractor {worker} exiting");
    Ok(())
}

/// Cross-references compatible strings inside binding documents: an
/// occurrence is recorded only when the string is already known from code or
/// device-tree sources.
///
/// Needs the tag's C event (the compatible index holds everything this tag
/// contributes) and its V event (the bindings id set is complete for this
/// tag).
pub(crate) fn extract_compatible_docs(
    run: &IndexRun<'_>,
    worker: usize,
    pool_size: usize,
) -> Result<()> {
    let index = run.index;

    let mut tag_index = worker;
    while tag_index < run.tags.len() {
        let new_ids = run.wait_assigned(tag_index)?;
        run.wait_comps_and_versions(tag_index)?;
        let tag = &run.tags[tag_index];

        for (nth, &id) in new_ids.iter().enumerate() {
            if nth > 0 && nth % run.config.progress_every == 0 {
                let done = run.tags_done_comp_docs.load(Ordering::Relaxed);
                run.progress
                    .report(format_args!("comps docs: {}: {} blobs", tag.as_bstr(), nth), done);
            }

            let is_binding_doc =
                run.bindings.lock().unwrap_or_else(|e| e.into_inner()).contains(&id);
            if !is_binding_doc {
                continue;
            }

            let hash = {
                let rtxn = index.read_txn()?;
                blob_hash_and_filename(index, &rtxn, id)?.0
            };
            let content = run.repo.get_blob(&hash)?;

            let known = {
                let rtxn = index.read_txn()?;
                let mut known = Vec::new();
                for (comp, line) in scan_compatibles(&content, Family::B) {
                    if index.has_compatible(&rtxn, &comp)? {
                        known.push((comp, line));
                    }
                }
                known
            };
            let occurrences = coalesce_lines(known);
            if occurrences.is_empty() {
                continue;
            }

            let mut wtxn = index.write_txn()?;
            for (comp, lines) in occurrences {
                let mut refs = index.compatible_docs(&wtxn, &comp)?.unwrap_or_default();
                refs.append(id, &lines, Family::B);
                index.put_compatible_docs(&mut wtxn, &comp, &refs)?;
                debug!("comp doc: {} in blob {} lines {}", comp.as_bstr(), id, lines.as_bstr());
            }
            wtxn.commit()?;
        }

        let done = run.tags_done_comp_docs.fetch_add(1, Ordering::Relaxed) + 1;
        run.progress
            .report(format_args!("comps docs: {}: {} blobs", tag.as_bstr(), new_ids.len()), done);
        tag_index += pool_size;
    }

    info!("compatible-docs extractor {worker} exiting");
    Ok(())
}

/// Collapses repeated occurrences of one string within a blob into a single
/// comma-separated line list, preserving encounter order.
fn coalesce_lines(found: Vec<(Vec<u8>, LineNumber)>) -> IndexMap<Vec<u8>, Vec<u8>> {
    let mut occurrences: IndexMap<Vec<u8>, Vec<u8>> = IndexMap::new();
    for (value, line) in found {
        let lines = occurrences.entry(value).or_default();
        if !lines.is_empty() {
            lines.push(b',');
        }
        push_int(lines, line);
    }
    occurrences
}
