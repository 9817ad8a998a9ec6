//! HTTP API: router, auth middleware, handlers, and request/response mapping.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
