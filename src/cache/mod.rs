pub mod result_cache;

pub use result_cache::{cache_key, ResultCache};
