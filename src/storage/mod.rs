pub mod block;
pub mod partition;
pub mod store;
