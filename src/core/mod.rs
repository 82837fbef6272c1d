pub mod entity;
pub mod error;
pub mod money;
pub mod records;
pub mod store;
pub mod transaction;
