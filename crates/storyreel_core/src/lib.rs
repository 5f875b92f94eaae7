pub mod collision;
pub mod error;
pub mod generation;
pub mod project;
pub mod store;
pub mod types;
