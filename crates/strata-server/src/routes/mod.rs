//! HTTP route handlers.

pub mod demo;
pub mod health;

pub use demo::{
    LoginRequest, UserResponse, VisitResponse, demo_routes, get_value_handler, login_handler,
    logout_handler, visit_handler, whoami_handler,
};
pub use health::{HealthResponse, health, health_routes};
