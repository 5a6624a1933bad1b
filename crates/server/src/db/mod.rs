pub mod analysis_cache;
pub mod games;
pub mod pool;
