pub mod coordinator;
pub mod partition;
