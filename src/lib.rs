pub mod cdn;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod normalize;
pub mod poller;
pub mod provider;
pub mod server;
pub mod sync;
pub mod writer;
