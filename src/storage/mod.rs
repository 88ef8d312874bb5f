mod cursor_store;
mod dedup_cache;

pub use cursor_store::*;
pub use dedup_cache::*;

#[cfg(test)]
mod dedup_cache_test;
