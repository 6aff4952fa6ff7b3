pub mod processor;
pub mod types;
pub mod utils;

pub use processor::ingest;
