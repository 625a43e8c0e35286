pub mod cli;
pub mod core;
pub mod models;
pub mod progress;
pub mod storage;

pub use cli::run;
