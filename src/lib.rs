pub mod backend;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod logging;
pub mod models;
pub mod repository;
pub mod storage;

pub use repository::JobRepository;
