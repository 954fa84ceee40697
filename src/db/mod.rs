//! Call record persistence.
//!
//! Raw SQL with rusqlite, no ORM. Each operation opens its own connection;
//! SQLite serializes writers, and the reconciler wraps its read-modify-write
//! in an immediate transaction so concurrent events for the same call never
//! interleave.

pub mod calls;
pub mod init;

pub use calls::{CallChanges, CallRecord, CallRepository, StoreError};
pub use init::{migrate, open_at};

use anyhow::Result;
use rusqlite::Connection;
use std::path::PathBuf;

/// Handle to the on-disk database. Cheap to clone; connections are opened
/// per operation.
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn open(&self) -> Result<Connection> {
        open_at(&self.path)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
