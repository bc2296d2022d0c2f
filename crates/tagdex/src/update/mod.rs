mod index_tags;
mod indexer_config;

pub use self::index_tags::{IndexTags, TagIndexingResult};
pub use self::indexer_config::{IndexerConfig, MIN_WORKER_BUDGET};
