pub mod cache;
pub mod journal;
