//! Infrastructure adapters: the MySQL-backed blog directory.

pub mod directory;

pub use directory::MySqlDirectory;
