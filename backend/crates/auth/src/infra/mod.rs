//! Infrastructure Layer
//!
//! Persistence adapters (MySQL, in-memory) and the file-backed session store.

pub mod file_session;
pub mod memory;
pub mod mysql;

pub use file_session::FileSessionStore;
pub use memory::MemoryStore;
pub use mysql::MySqlStore;
