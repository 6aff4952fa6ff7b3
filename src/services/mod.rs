pub mod chart;
pub mod excel;
pub mod file_store;
pub mod insights;
pub mod store;
