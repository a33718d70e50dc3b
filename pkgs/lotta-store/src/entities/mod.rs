//! Sea-ORM entities for lotta-store

pub mod cache_entries;

pub use cache_entries::Entity as CacheEntries;
