pub mod batch;
pub mod config;
pub mod extract;
pub mod humanize;
pub mod observability;
pub mod progress;
pub mod storage;
pub mod worker;
