//! # Wallcast DB
//! SQLite-backed subscription table and sweep watermarks.

pub mod sqlite;

pub use sqlite::SubscriptionDb;
