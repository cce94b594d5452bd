pub mod error;
pub mod report;
pub mod workload;
