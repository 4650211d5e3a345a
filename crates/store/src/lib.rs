pub mod audit;
pub mod db;
pub mod error;
pub mod events;
pub mod fts;
pub mod jobs;
pub mod memories;
pub mod migrations;
pub mod reminders;
pub mod tasks;
pub mod types;
pub mod users;

use std::sync::Mutex;

use rusqlite::Connection;

pub use error::{Result, StoreError};

/// Single-writer store handle, shared behind `Arc` by the dispatcher,
/// worker, scheduler, search engine, and HTTP surface — one
/// `Mutex<Connection>` guarding the one connection all entities share.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self { conn: Mutex::new(db::open(path)?) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Mutex::new(db::open_in_memory()?) })
    }

    /// Run `f` with exclusive access to the underlying connection. Entity
    /// modules take `&mut Connection` so they can open their own
    /// transactions; this is the only place that acquires the lock.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().expect("store connection mutex poisoned");
        f(&mut conn)
    }

    /// Same locking as [`Store::with_conn`], but for callers outside this
    /// crate (`bearmemori-search`) whose own error type isn't `StoreError`.
    pub fn with_raw_conn<T>(&self, f: impl FnOnce(&mut Connection) -> T) -> T {
        let mut conn = self.conn.lock().expect("store connection mutex poisoned");
        f(&mut conn)
    }
}
