// src/health/mod.rs
mod checker;
mod prober;

pub use checker::{HealthCheckResult, HealthChecker};
pub use prober::{HttpProber, ProbeError, Prober};
