mod extract_compatibles;
mod extract_definitions;
mod extract_doc_comments;
mod extract_references;

use heed::{RoTxn, WithoutTls};

pub(crate) use self::extract_compatibles::{extract_compatible_docs, extract_compatibles};
pub(crate) use self::extract_definitions::extract_definitions;
pub(crate) use self::extract_doc_comments::extract_doc_comments;
pub(crate) use self::extract_references::extract_references;
use crate::error::InternalError;
use crate::index::db_name;
use crate::records::push_int;
use crate::{BlobId, Index, Result};

/// Resolves a blob id back to its content hash and representative basename.
/// Both were written before the tag's A event fired, so a miss is an index
/// corruption, not a race.
fn blob_hash_and_filename(
    index: &Index,
    rtxn: &RoTxn<'_, WithoutTls>,
    id: BlobId,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let hash = index
        .blob_hash(rtxn, id)?
        .ok_or_else(|| missing_id_entry(db_name::HASHES, id))?;
    let filename = index
        .blob_filename(rtxn, id)?
        .ok_or_else(|| missing_id_entry(db_name::FILENAMES, id))?;
    Ok((hash, filename))
}

fn missing_id_entry(db_name: &'static str, id: BlobId) -> InternalError {
    let mut key = Vec::new();
    push_int(&mut key, id);
    InternalError::DatabaseMissingEntry { db_name, key: key.into() }
}
