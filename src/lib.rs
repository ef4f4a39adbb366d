//! # ori-store
//!
//! A content-addressed object store with pull-based replication.
//! Objects (blobs, large blobs, trees, commits) are hashed with
//! SHA-256, deduplicated into append-only packfiles, and indexed for
//! O(1) lookup. Repositories replicate by pulling missing objects over
//! a small RPC protocol that runs over a Unix socket, an SSH-spawned
//! child process, or HTTP.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ori_store::repo::Repository;
//!
//! let mut repo = Repository::open("/srv/repos/mine", true)?;
//! let blob = repo.add_file(b"hello")?;
//! # Ok::<(), ori_store::error::RepoError>(())
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod chunker;
pub mod cleanup;
pub mod config;
pub mod diff;
pub mod error;
pub mod hash;
pub mod index;
pub mod keys;
pub mod lock;
pub mod logging;
pub mod merge;
pub mod metadata;
pub mod object;
pub mod packfile;
pub mod repo;
pub mod rpc;
pub mod snapshot;
pub mod stream;
pub mod validation;

pub use error::{RepoError, RepoResult};
pub use hash::ObjectHash;
pub use object::{Commit, Object, ObjectInfo, ObjectType};
pub use repo::{RemoteSource, Repository};
