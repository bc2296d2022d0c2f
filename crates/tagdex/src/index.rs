use std::path::{Path, PathBuf};

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn, WithoutTls};

use crate::error::{InternalError, UserError};
use crate::records::{parse_int, push_int};
use crate::{BlobId, DefList, PathList, RefList, Result};

pub mod var_key {
    /// 1 + the highest blob id ever assigned.
    pub const NUM_BLOBS: &str = "numBlobs";
}

pub mod db_name {
    pub const VARIABLES: &str = "variables";
    pub const BLOBS: &str = "blobs";
    pub const HASHES: &str = "hashes";
    pub const FILENAMES: &str = "filenames";
    pub const VERSIONS: &str = "versions";
    pub const DEFINITIONS: &str = "definitions";
    pub const REFERENCES: &str = "references";
    pub const DOC_COMMENTS: &str = "doccomments";
    pub const COMPATIBLE_DTS: &str = "compatibledts";
    pub const COMPATIBLE_DTS_DOCS: &str = "compatibledts_docs";
}

const NUMBER_OF_DBS: u32 = 10;

/// The on-disk indexes of one project: a single LMDB environment holding one
/// named database per logical index.
///
/// All keys and values are raw bytes; the list-valued databases store the
/// packed record formats of [`crate::records`]. The two device-tree
/// databases exist only when the index was opened with device-tree support.
#[derive(Clone)]
pub struct Index {
    pub(crate) env: Env<WithoutTls>,

    /// Process-wide counters; currently the single `numBlobs` key.
    vars: Database<Str, Bytes>,

    /// Maps a blob content hash to its integer id.
    blobs: Database<Bytes, Bytes>,

    /// Maps a blob id back to its content hash.
    hashes: Database<Bytes, Bytes>,

    /// Maps a blob id to one representative basename (first observed wins).
    filenames: Database<Bytes, Bytes>,

    /// Maps a tag to the `PathList` of its tree. A tag present here is fully
    /// indexed.
    versions: Database<Bytes, Bytes>,

    /// Maps an identifier to the `DefList` of its definition sites.
    definitions: Database<Bytes, Bytes>,

    /// Maps an identifier to the `RefList` of its references.
    references: Database<Bytes, Bytes>,

    /// Maps an identifier to the `RefList` of its documentation-comment
    /// anchors.
    doc_comments: Database<Bytes, Bytes>,

    /// Maps a compatible string to its occurrences in code and device-tree
    /// sources.
    compatible_dts: Option<Database<Bytes, Bytes>>,

    /// Maps a compatible string to its occurrences in binding documents.
    compatible_dts_docs: Option<Database<Bytes, Bytes>>,
}

impl Index {
    /// Opens (or populates) the index databases under `path`.
    ///
    /// The directory must already exist: pointing a fresh invocation at a
    /// missing directory is an operator error, not a reason to silently
    /// start an empty index.
    pub fn new<P: AsRef<Path>>(
        mut options: EnvOpenOptions<WithoutTls>,
        path: P,
        dts_comp: bool,
    ) -> Result<Index> {
        use db_name::*;

        let path = path.as_ref();
        if !path.is_dir() {
            return Err(UserError::IndexDirectoryNotFound(path.to_path_buf()).into());
        }

        options.max_dbs(NUMBER_OF_DBS);

        let env = unsafe { options.open(path) }?;
        let mut wtxn = env.write_txn()?;
        let vars = env.create_database(&mut wtxn, Some(VARIABLES))?;
        let blobs = env.create_database(&mut wtxn, Some(BLOBS))?;
        let hashes = env.create_database(&mut wtxn, Some(HASHES))?;
        let filenames = env.create_database(&mut wtxn, Some(FILENAMES))?;
        let versions = env.create_database(&mut wtxn, Some(VERSIONS))?;
        let definitions = env.create_database(&mut wtxn, Some(DEFINITIONS))?;
        let references = env.create_database(&mut wtxn, Some(REFERENCES))?;
        let doc_comments = env.create_database(&mut wtxn, Some(DOC_COMMENTS))?;
        let (compatible_dts, compatible_dts_docs) = if dts_comp {
            let comps = env.create_database(&mut wtxn, Some(COMPATIBLE_DTS))?;
            let comps_docs = env.create_database(&mut wtxn, Some(COMPATIBLE_DTS_DOCS))?;
            (Some(comps), Some(comps_docs))
        } else {
            (None, None)
        };
        wtxn.commit()?;

        Ok(Index {
            env,
            vars,
            blobs,
            hashes,
            filenames,
            versions,
            definitions,
            references,
            doc_comments,
            compatible_dts,
            compatible_dts_docs,
        })
    }

    pub fn read_txn(&self) -> heed::Result<RoTxn<'_, WithoutTls>> {
        self.env.read_txn()
    }

    pub fn write_txn(&self) -> heed::Result<RwTxn<'_>> {
        self.env.write_txn()
    }

    pub fn path(&self) -> PathBuf {
        self.env.path().to_path_buf()
    }

    /// Whether the index carries the device-tree compatible databases.
    pub fn dts_enabled(&self) -> bool {
        self.compatible_dts.is_some()
    }

    /// Flushes the environment to disk, making all committed writes durable.
    pub fn force_sync(&self) -> Result<()> {
        Ok(self.env.force_sync()?)
    }

    /* numBlobs */

    /// 1 + the highest blob id ever assigned; zero on a fresh index.
    pub fn num_blobs(&self, rtxn: &RoTxn<'_, WithoutTls>) -> Result<BlobId> {
        match self.vars.get(rtxn, var_key::NUM_BLOBS)? {
            Some(bytes) => {
                parse_int(bytes).ok_or_else(|| invalid_record(db_name::VARIABLES).into())
            }
            None => Ok(0),
        }
    }

    pub fn put_num_blobs(&self, wtxn: &mut RwTxn<'_>, num_blobs: BlobId) -> Result<()> {
        let mut value = Vec::new();
        push_int(&mut value, num_blobs);
        Ok(self.vars.put(wtxn, var_key::NUM_BLOBS, &value)?)
    }

    /* blob ids, hashes, filenames */

    pub fn blob_id(&self, rtxn: &RoTxn<'_, WithoutTls>, hash: &[u8]) -> Result<Option<BlobId>> {
        match self.blobs.get(rtxn, hash)? {
            Some(bytes) => {
                let id = parse_int(bytes).ok_or_else(|| invalid_record(db_name::BLOBS))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    pub fn put_blob_id(&self, wtxn: &mut RwTxn<'_>, hash: &[u8], id: BlobId) -> Result<()> {
        let mut value = Vec::new();
        push_int(&mut value, id);
        Ok(self.blobs.put(wtxn, hash, &value)?)
    }

    pub fn blob_hash(&self, rtxn: &RoTxn<'_, WithoutTls>, id: BlobId) -> Result<Option<Vec<u8>>> {
        Ok(self.hashes.get(rtxn, &id_key(id))?.map(|bytes| bytes.to_vec()))
    }

    pub fn put_blob_hash(&self, wtxn: &mut RwTxn<'_>, id: BlobId, hash: &[u8]) -> Result<()> {
        Ok(self.hashes.put(wtxn, &id_key(id), hash)?)
    }

    pub fn blob_filename(&self, rtxn: &RoTxn<'_, WithoutTls>, id: BlobId) -> Result<Option<Vec<u8>>> {
        Ok(self.filenames.get(rtxn, &id_key(id))?.map(|bytes| bytes.to_vec()))
    }

    pub fn put_blob_filename(
        &self,
        wtxn: &mut RwTxn<'_>,
        id: BlobId,
        basename: &[u8],
    ) -> Result<()> {
        Ok(self.filenames.put(wtxn, &id_key(id), basename)?)
    }

    /* versions */

    pub fn has_version(&self, rtxn: &RoTxn<'_, WithoutTls>, tag: &[u8]) -> Result<bool> {
        Ok(self.versions.get(rtxn, tag)?.is_some())
    }

    pub fn version(&self, rtxn: &RoTxn<'_, WithoutTls>, tag: &[u8]) -> Result<Option<PathList>> {
        Ok(self.versions.get(rtxn, tag)?.map(PathList::from_bytes))
    }

    pub fn put_version(&self, wtxn: &mut RwTxn<'_>, tag: &[u8], paths: &PathList) -> Result<()> {
        Ok(self.versions.put(wtxn, tag, &paths.pack())?)
    }

    /* definitions */

    pub fn has_definition(&self, rtxn: &RoTxn<'_, WithoutTls>, ident: &[u8]) -> Result<bool> {
        Ok(self.definitions.get(rtxn, ident)?.is_some())
    }

    pub fn definitions(&self, rtxn: &RoTxn<'_, WithoutTls>, ident: &[u8]) -> Result<Option<DefList>> {
        match self.definitions.get(rtxn, ident)? {
            Some(bytes) => {
                let list = DefList::from_bytes(bytes)
                    .ok_or_else(|| invalid_record(db_name::DEFINITIONS))?;
                Ok(Some(list))
            }
            None => Ok(None),
        }
    }

    pub fn put_definitions(
        &self,
        wtxn: &mut RwTxn<'_>,
        ident: &[u8],
        defs: &DefList,
    ) -> Result<()> {
        Ok(self.definitions.put(wtxn, ident, &defs.pack())?)
    }

    /* references */

    pub fn references(&self, rtxn: &RoTxn<'_, WithoutTls>, ident: &[u8]) -> Result<Option<RefList>> {
        Ok(self.references.get(rtxn, ident)?.map(RefList::from_bytes))
    }

    pub fn put_references(&self, wtxn: &mut RwTxn<'_>, ident: &[u8], refs: &RefList) -> Result<()> {
        Ok(self.references.put(wtxn, ident, &refs.pack())?)
    }

    /* documentation-comment anchors */

    pub fn doc_comments(&self, rtxn: &RoTxn<'_, WithoutTls>, ident: &[u8]) -> Result<Option<RefList>> {
        Ok(self.doc_comments.get(rtxn, ident)?.map(RefList::from_bytes))
    }

    pub fn put_doc_comments(
        &self,
        wtxn: &mut RwTxn<'_>,
        ident: &[u8],
        docs: &RefList,
    ) -> Result<()> {
        Ok(self.doc_comments.put(wtxn, ident, &docs.pack())?)
    }

    /* device-tree compatible strings */

    pub fn has_compatible(&self, rtxn: &RoTxn<'_, WithoutTls>, comp: &[u8]) -> Result<bool> {
        Ok(self.compatible_dts_db()?.get(rtxn, comp)?.is_some())
    }

    pub fn compatible(&self, rtxn: &RoTxn<'_, WithoutTls>, comp: &[u8]) -> Result<Option<RefList>> {
        Ok(self.compatible_dts_db()?.get(rtxn, comp)?.map(RefList::from_bytes))
    }

    pub fn put_compatible(&self, wtxn: &mut RwTxn<'_>, comp: &[u8], refs: &RefList) -> Result<()> {
        Ok(self.compatible_dts_db()?.put(wtxn, comp, &refs.pack())?)
    }

    pub fn compatible_docs(&self, rtxn: &RoTxn<'_, WithoutTls>, comp: &[u8]) -> Result<Option<RefList>> {
        Ok(self.compatible_dts_docs_db()?.get(rtxn, comp)?.map(RefList::from_bytes))
    }

    pub fn put_compatible_docs(
        &self,
        wtxn: &mut RwTxn<'_>,
        comp: &[u8],
        refs: &RefList,
    ) -> Result<()> {
        Ok(self.compatible_dts_docs_db()?.put(wtxn, comp, &refs.pack())?)
    }

    fn compatible_dts_db(&self) -> Result<&Database<Bytes, Bytes>> {
        self.compatible_dts.as_ref().ok_or_else(|| dts_disabled(db_name::COMPATIBLE_DTS).into())
    }

    fn compatible_dts_docs_db(&self) -> Result<&Database<Bytes, Bytes>> {
        self.compatible_dts_docs
            .as_ref()
            .ok_or_else(|| dts_disabled(db_name::COMPATIBLE_DTS_DOCS).into())
    }

    /// Per-database entry counts, mostly useful to assert that an operation
    /// touched nothing.
    pub fn stats(&self, rtxn: &RoTxn<'_, WithoutTls>) -> Result<IndexStats> {
        Ok(IndexStats {
            vars: self.vars.len(rtxn)?,
            blobs: self.blobs.len(rtxn)?,
            hashes: self.hashes.len(rtxn)?,
            filenames: self.filenames.len(rtxn)?,
            versions: self.versions.len(rtxn)?,
            definitions: self.definitions.len(rtxn)?,
            references: self.references.len(rtxn)?,
            doc_comments: self.doc_comments.len(rtxn)?,
            compatible_dts: match &self.compatible_dts {
                Some(db) => db.len(rtxn)?,
                None => 0,
            },
            compatible_dts_docs: match &self.compatible_dts_docs {
                Some(db) => db.len(rtxn)?,
                None => 0,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub vars: u64,
    pub blobs: u64,
    pub hashes: u64,
    pub filenames: u64,
    pub versions: u64,
    pub definitions: u64,
    pub references: u64,
    pub doc_comments: u64,
    pub compatible_dts: u64,
    pub compatible_dts_docs: u64,
}

/// Blob ids are stored as decimal ASCII keys, like every other integer in
/// the on-disk format.
fn id_key(id: BlobId) -> Vec<u8> {
    let mut key = Vec::new();
    push_int(&mut key, id);
    key
}

fn invalid_record(db_name: &'static str) -> InternalError {
    InternalError::InvalidRecord { db_name }
}

fn dts_disabled(db_name: &'static str) -> InternalError {
    InternalError::DtsSupportDisabled { db_name }
}
