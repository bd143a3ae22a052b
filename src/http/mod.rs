//! HTTP surface: route multiplexing, client registration endpoints, and
//! discovery metadata.

pub mod context;
pub mod handler_health;
pub mod handler_register;
pub mod handler_well_known;
pub mod server;

pub use context::AppState;
pub use server::{RouteMultiplexer, build_router, default_resource_router};
