pub mod context;
pub mod env;
pub mod jobs;
