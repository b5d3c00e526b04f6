//! HTTP API for kubecast

pub mod health;

pub use health::health_routes;
