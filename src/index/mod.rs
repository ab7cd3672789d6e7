pub mod kdv;
pub mod registry;
