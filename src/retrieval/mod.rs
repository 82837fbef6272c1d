pub mod bundle;
pub mod format;
pub mod retriever;
pub mod rules;
