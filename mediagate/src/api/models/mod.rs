pub mod billing;
pub mod jobs;
pub mod transactions;
