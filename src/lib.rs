pub mod codec;
pub mod db;
pub mod server;
pub mod types;
