// src/lib.rs
pub mod config;
pub mod health;
pub mod load_balancer;
pub mod metrics;
pub mod node;
pub mod protocol;
pub mod proxy;
pub mod server;
