pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use server::{GatehouseServer, ServerBuilder, build_app};
