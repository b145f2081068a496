pub mod application;
pub mod domain;
pub mod errors;
pub mod features;
pub mod inference;
pub mod infrastructure;
pub mod settings;
