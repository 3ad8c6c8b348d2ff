pub mod launcher;
pub mod server;
