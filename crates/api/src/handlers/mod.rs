pub mod jobs;
pub mod rpc;
