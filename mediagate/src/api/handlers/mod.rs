pub mod billing;
pub mod internal;
pub mod jobs;
pub mod transactions;
