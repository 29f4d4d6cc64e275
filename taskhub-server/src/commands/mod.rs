pub mod orchestration;
pub mod server;
