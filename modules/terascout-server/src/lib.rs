//! Control plane: the HTTP surface for creating, inspecting, and deleting
//! scouts, plus the registry of running engine tasks.

pub mod registry;
pub mod rest;
pub mod routes;

pub use registry::ScoutRegistry;
pub use routes::{build_router, AppState};
