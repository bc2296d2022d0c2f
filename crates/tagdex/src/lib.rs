mod error;
pub mod dts;
pub mod family;
pub mod ident;
pub mod index;
pub mod progress;
pub mod records;
pub mod repo;
pub mod update;

pub use heed;

pub use self::error::{Error, InternalError, UserError};
pub use self::family::Family;
pub use self::index::Index;
pub use self::records::{DefKind, DefList, PathList, RefList};
pub use self::repo::Repo;

pub type Result<T> = std::result::Result<T, error::Error>;

/// The sequence number assigned to one distinct blob content.
///
/// Ids are allocated contiguously from zero, in the order blobs first appear
/// in the tag listings, and are never reused or deleted.
pub type BlobId = u64;

/// A 1-based line number inside a blob.
pub type LineNumber = u64;
