//! Retry/hedging subsystem (§4.9, §4.10, §4.11): the service-config model
//! that decides whether and how a call retries, the token-bucket throttle
//! that caps retry traffic channel-wide, and the engine that drives one
//! call's attempts against both.

pub mod engine;
pub mod policy;
pub mod throttle;

pub use engine::{AttemptContext, AttemptResult, MessageBuffer, Pushback, RetryEngine};
pub use policy::{ConfigError, HedgingPolicy, MethodPolicy, ServiceConfig, ServiceConfigBuilder, MAX_ATTEMPTS_CAP};
pub use throttle::RetryThrottle;
