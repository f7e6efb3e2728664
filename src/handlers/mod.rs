pub mod health_handlers;
pub mod signing_handlers;
