use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use fxhash::{FxHashMap, FxHashSet};

use crate::error::InternalError;
use crate::progress::Progress;
use crate::repo::Repo;
use crate::update::IndexerConfig;
use crate::{BlobId, Index, LineNumber, Result};

/// Maps a (blob, line) pair to the identifier defined there, so the
/// reference extractor can tell a definition apart from a use of the same
/// identifier on the same line.
pub(crate) type DefLineMap = FxHashMap<(BlobId, LineNumber), Vec<u8>>;

/// Shared context of one indexing run, threaded through every stage.
///
/// Stages for one tag cooperate through the per-tag slots: the blob id
/// assigner publishes the tag's new-id list (event A), the owning definition
/// and compatible extractors flag their completion (events D and C), and the
/// version recorder flags the durable `versions` write (event V). A single
/// condition variable wakes every waiter whenever any event fires.
pub(crate) struct IndexRun<'a> {
    pub index: &'a Index,
    pub repo: &'a Repo,
    pub config: &'a IndexerConfig,
    pub tags: &'a [Vec<u8>],
    pub progress: Progress,

    state: Mutex<RunState>,
    tag_ready: Condvar,

    /// Guards read-modify-writes of the definitions database together with
    /// the same-line map, so the two stay consistent tag by tag.
    pub defs_lock: Mutex<DefLineMap>,

    /// Blob ids whose path lies under the bindings-documentation subtree.
    /// Filled by the version recorder, complete for a tag once V fired.
    pub bindings: Mutex<FxHashSet<BlobId>>,

    // Per-stage counts of fully processed tags, for progress reporting only.
    pub tags_done_defs: AtomicUsize,
    pub tags_done_refs: AtomicUsize,
    pub tags_done_docs: AtomicUsize,
    pub tags_done_comps: AtomicUsize,
    pub tags_done_comp_docs: AtomicUsize,
}

struct RunState {
    aborted: bool,
    slots: Vec<TagSlot>,
}

#[derive(Default)]
struct TagSlot {
    /// `Some` once the blob id assigner finished the tag (event A).
    new_ids: Option<Arc<Vec<BlobId>>>,
    /// Set once the owning definition extractor finished the tag (event D).
    defs_done: bool,
    /// Set once the owning compatible extractor finished the tag (event C).
    comps_done: bool,
    /// Set once the version recorder committed the tag (event V).
    versions_done: bool,
}

impl<'a> IndexRun<'a> {
    pub fn new(
        index: &'a Index,
        repo: &'a Repo,
        config: &'a IndexerConfig,
        tags: &'a [Vec<u8>],
        progress: Progress,
    ) -> IndexRun<'a> {
        let slots = tags.iter().map(|_| TagSlot::default()).collect();
        IndexRun {
            index,
            repo,
            config,
            tags,
            progress,
            state: Mutex::new(RunState { aborted: false, slots }),
            tag_ready: Condvar::new(),
            defs_lock: Mutex::new(DefLineMap::default()),
            bindings: Mutex::new(FxHashSet::default()),
            tags_done_defs: AtomicUsize::new(0),
            tags_done_refs: AtomicUsize::new(0),
            tags_done_docs: AtomicUsize::new(0),
            tags_done_comps: AtomicUsize::new(0),
            tags_done_comp_docs: AtomicUsize::new(0),
        }
    }

    /// Runs one stage to completion; a failure or panic aborts the whole run
    /// so that no other stage blocks forever on an event that will never
    /// fire.
    pub fn stage(&self, name: &'static str, f: impl FnOnce() -> Result<()>) -> Result<()> {
        let result = catch_unwind(AssertUnwindSafe(f))
            .unwrap_or_else(|_| Err(InternalError::WorkerPanicked { stage: name }.into()));
        if result.is_err() {
            self.abort();
        }
        result
    }

    pub fn abort(&self) {
        self.lock_state().aborted = true;
        self.tag_ready.notify_all();
    }

    pub fn set_assigned(&self, tag_index: usize, new_ids: Vec<BlobId>) {
        self.lock_state().slots[tag_index].new_ids = Some(Arc::new(new_ids));
        self.tag_ready.notify_all();
    }

    pub fn wait_assigned(&self, tag_index: usize) -> Result<Arc<Vec<BlobId>>> {
        self.wait_until(|state| state.slots[tag_index].new_ids.clone())
    }

    pub fn set_defs_done(&self, tag_index: usize) {
        self.lock_state().slots[tag_index].defs_done = true;
        self.tag_ready.notify_all();
    }

    pub fn wait_defs_done(&self, tag_index: usize) -> Result<()> {
        self.wait_until(|state| state.slots[tag_index].defs_done.then_some(()))
    }

    pub fn set_comps_done(&self, tag_index: usize) {
        self.lock_state().slots[tag_index].comps_done = true;
        self.tag_ready.notify_all();
    }

    pub fn set_versions_done(&self, tag_index: usize) {
        self.lock_state().slots[tag_index].versions_done = true;
        self.tag_ready.notify_all();
    }

    /// Waits for both C and V, the entry condition of the compatible-docs
    /// extractor.
    pub fn wait_comps_and_versions(&self, tag_index: usize) -> Result<()> {
        self.wait_until(|state| {
            let slot = &state.slots[tag_index];
            (slot.comps_done && slot.versions_done).then_some(())
        })
    }

    fn wait_until<T>(&self, ready: impl Fn(&RunState) -> Option<T>) -> Result<T> {
        let mut state = self.lock_state();
        loop {
            if state.aborted {
                return Err(InternalError::AbortedIndexation.into());
            }
            if let Some(value) = ready(&state) {
                return Ok(value);
            }
            state = self.tag_ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
