//! Service-config model (C11, §4.11): per-`(service, method)` retry/hedging
//! policy, with the same `no_retry`/`aggressive`/`patient` preset shape
//! `client/src/config/retry.rs` used for its single global policy, now keyed
//! per method the way a `grpc-go` service config is.

use std::collections::HashMap;
use std::time::Duration;

use grpc_core::Code;
use thiserror::Error;

/// The hard ceiling on `max_attempts` a policy may request, independent of
/// what a service config document asks for (§9, Open Question: capped at 5
/// rather than left unbounded, to put a floor under worst-case call
/// amplification).
pub const MAX_ATTEMPTS_CAP: u32 = 5;

/// Errors raised by [`MethodPolicy::validate`] / [`ServiceConfig::validate`].
/// Never panics on bad input; always returned through `?` per the call
/// sites that construct these policies from configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_attempts must be between 2 and {cap}, got {actual}")]
    MaxAttemptsOutOfRange { actual: u32, cap: u32 },

    #[error("retryable_status_codes must not be empty when retries are enabled")]
    EmptyRetryableCodes,

    #[error("base_delay ({base_delay:?}) must not exceed max_delay ({max_delay:?})")]
    BaseDelayExceedsMaxDelay {
        base_delay: Duration,
        max_delay: Duration,
    },

    #[error("multiplier must be >= 1.0, got {actual}")]
    InvalidMultiplier { actual: f64 },

    #[error("hedging_delay must be nonzero when a hedging policy is set")]
    ZeroHedgingDelay,
}

/// One method's retry/hedging policy (§4.9, §4.11).
///
/// A `None` policy (see [`ServiceConfig::resolve`]) means the call gets a
/// single attempt with no retry behavior at all.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub retryable_status_codes: Vec<Code>,
    pub hedging: Option<HedgingPolicy>,
}

impl MethodPolicy {
    /// No retries: a single attempt, committed on whatever it returns.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(0),
            max_backoff: Duration::from_millis(0),
            backoff_multiplier: 1.0,
            retryable_status_codes: Vec::new(),
            hedging: None,
        }
    }

    /// Short backoff, few attempts, wide retryable set — suited to
    /// latency-sensitive calls willing to trade extra load for tail latency.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 1.6,
            retryable_status_codes: vec![
                Code::Unavailable,
                Code::ResourceExhausted,
                Code::Aborted,
                Code::DeadlineExceeded,
            ],
            hedging: None,
        }
    }

    /// Long backoff, generous attempt budget, narrow retryable set — suited
    /// to calls where a retry storm is worse than added latency.
    pub fn patient() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            retryable_status_codes: vec![Code::Unavailable],
            hedging: None,
        }
    }

    /// Validates this policy's invariants (§4.9, §4.11):
    /// `max_attempts ∈ [2, MAX_ATTEMPTS_CAP]` when retries are requested,
    /// a nonempty retryable set, `base_delay <= max_delay`, and
    /// `multiplier >= 1.0`. A `max_attempts` of exactly `1` (no retry) is
    /// always valid regardless of the other fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 1 {
            return Ok(());
        }
        if !(2..=MAX_ATTEMPTS_CAP).contains(&self.max_attempts) {
            return Err(ConfigError::MaxAttemptsOutOfRange {
                actual: self.max_attempts,
                cap: MAX_ATTEMPTS_CAP,
            });
        }
        if self.retryable_status_codes.is_empty() {
            return Err(ConfigError::EmptyRetryableCodes);
        }
        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::BaseDelayExceedsMaxDelay {
                base_delay: self.initial_backoff,
                max_delay: self.max_backoff,
            });
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier {
                actual: self.backoff_multiplier,
            });
        }
        if let Some(hedging) = &self.hedging {
            if hedging.hedging_delay.is_zero() {
                return Err(ConfigError::ZeroHedgingDelay);
            }
        }
        Ok(())
    }

    /// `rand(0, min(initial_backoff * multiplier^(n-1), max_backoff))` for
    /// the `n`th retry attempt (1-indexed: `n=1` is the delay before the
    /// *first* retry, i.e. before spawning attempt 2). Full-jitter per
    /// §4.9's backoff law `0 <= d_n <= min(...)`.
    pub fn backoff_for_attempt(&self, n: u32) -> Duration {
        let scale = self.backoff_multiplier.powi(n.saturating_sub(1) as i32);
        let ceiling = (self.initial_backoff.as_secs_f64() * scale).min(self.max_backoff.as_secs_f64());
        let jittered = rand::random::<f64>() * ceiling.max(0.0);
        Duration::from_secs_f64(jittered)
    }
}

/// Hedging configuration (§4.9): spawn a new attempt every `hedging_delay`,
/// up to `max_attempts` total, without waiting for the previous attempt to
/// fail first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgingPolicy {
    pub hedging_delay: Duration,
    /// Status codes that, when returned by one attempt, do *not* cancel
    /// the others still in flight — the call only commits once every
    /// attempt has either failed fatally or been canceled.
    pub non_fatal_status_codes: &'static [Code],
}

/// Key identifying which [`MethodPolicy`] governs a call: the fully
/// qualified service name, and optionally the bare method name (§4.11).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PolicyKey {
    service: String,
    method: Option<String>,
}

/// A `(service, method?)` → [`MethodPolicy`] map, mirroring a gRPC service
/// config document's method-config list (§4.11).
///
/// [`ServiceConfig::resolve`] implements the selection precedence: an exact
/// `(service, method)` entry wins over a `(service, None)` wildcard entry,
/// which wins over the configured default.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    policies: HashMap<PolicyKey, MethodPolicy>,
    default: Option<MethodPolicy>,
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Resolve the policy governing a call to `service`/`method`. Falls
    /// through exact method match, service-wide wildcard, then the
    /// configured default; `None` means the call gets a single attempt.
    pub fn resolve(&self, service: &str, method: &str) -> Option<&MethodPolicy> {
        let exact = PolicyKey {
            service: service.to_string(),
            method: Some(method.to_string()),
        };
        if let Some(policy) = self.policies.get(&exact) {
            return Some(policy);
        }
        let wildcard = PolicyKey {
            service: service.to_string(),
            method: None,
        };
        if let Some(policy) = self.policies.get(&wildcard) {
            return Some(policy);
        }
        self.default.as_ref()
    }

    /// Validate every configured policy (§4.11).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for policy in self.policies.values() {
            policy.validate()?;
        }
        if let Some(default) = &self.default {
            default.validate()?;
        }
        Ok(())
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config with no retry anywhere: every call gets exactly one
    /// attempt.
    pub fn no_retry() -> ServiceConfig {
        ServiceConfig {
            policies: HashMap::new(),
            default: Some(MethodPolicy::no_retry()),
        }
    }

    /// Build a config using [`MethodPolicy::aggressive`] as the default for
    /// every service/method.
    pub fn aggressive() -> ServiceConfig {
        ServiceConfig {
            policies: HashMap::new(),
            default: Some(MethodPolicy::aggressive()),
        }
    }

    /// Build a config using [`MethodPolicy::patient`] as the default for
    /// every service/method.
    pub fn patient() -> ServiceConfig {
        ServiceConfig {
            policies: HashMap::new(),
            default: Some(MethodPolicy::patient()),
        }
    }

    /// Set the fallback policy used when no `(service, method)` or
    /// `(service, *)` entry matches.
    pub fn default_policy(mut self, policy: MethodPolicy) -> Self {
        self.config.default = Some(policy);
        self
    }

    /// Configure a policy for every method of `service`.
    pub fn for_service(mut self, service: impl Into<String>, policy: MethodPolicy) -> Self {
        self.config.policies.insert(
            PolicyKey {
                service: service.into(),
                method: None,
            },
            policy,
        );
        self
    }

    /// Configure a policy for one specific `service`/`method` pair,
    /// overriding any service-wide wildcard entry.
    pub fn for_method(
        mut self,
        service: impl Into<String>,
        method: impl Into<String>,
        policy: MethodPolicy,
    ) -> Self {
        self.config.policies.insert(
            PolicyKey {
                service: service.into(),
                method: Some(method.into()),
            },
            policy,
        );
        self
    }

    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retry_always_valid() {
        assert!(MethodPolicy::no_retry().validate().is_ok());
    }

    #[test]
    fn aggressive_and_patient_presets_are_valid() {
        assert!(MethodPolicy::aggressive().validate().is_ok());
        assert!(MethodPolicy::patient().validate().is_ok());
    }

    #[test]
    fn max_attempts_above_cap_rejected() {
        let mut policy = MethodPolicy::aggressive();
        policy.max_attempts = MAX_ATTEMPTS_CAP + 1;
        assert_eq!(
            policy.validate(),
            Err(ConfigError::MaxAttemptsOutOfRange {
                actual: MAX_ATTEMPTS_CAP + 1,
                cap: MAX_ATTEMPTS_CAP,
            })
        );
    }

    #[test]
    fn max_attempts_of_zero_or_one_retry_rejected_unless_exactly_one() {
        let mut policy = MethodPolicy::aggressive();
        policy.max_attempts = 0;
        assert!(policy.validate().is_err());

        policy.max_attempts = 1;
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn empty_retryable_codes_rejected() {
        let mut policy = MethodPolicy::aggressive();
        policy.retryable_status_codes.clear();
        assert_eq!(policy.validate(), Err(ConfigError::EmptyRetryableCodes));
    }

    #[test]
    fn base_delay_exceeding_max_delay_rejected() {
        let mut policy = MethodPolicy::aggressive();
        policy.initial_backoff = Duration::from_secs(10);
        policy.max_backoff = Duration::from_secs(1);
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::BaseDelayExceedsMaxDelay { .. })
        ));
    }

    #[test]
    fn sub_unity_multiplier_rejected() {
        let mut policy = MethodPolicy::aggressive();
        policy.backoff_multiplier = 0.5;
        assert_eq!(
            policy.validate(),
            Err(ConfigError::InvalidMultiplier { actual: 0.5 })
        );
    }

    #[test]
    fn backoff_for_attempt_never_exceeds_ceiling() {
        let policy = MethodPolicy::aggressive();
        for n in 1..=5 {
            let ceiling = (policy.initial_backoff.as_secs_f64()
                * policy.backoff_multiplier.powi((n - 1) as i32))
            .min(policy.max_backoff.as_secs_f64());
            for _ in 0..20 {
                let delay = policy.backoff_for_attempt(n);
                assert!(delay.as_secs_f64() <= ceiling + f64::EPSILON);
                assert!(delay.as_secs_f64() >= 0.0);
            }
        }
    }

    #[test]
    fn resolve_prefers_exact_method_over_wildcard_over_default() {
        let config = ServiceConfig::builder()
            .default_policy(MethodPolicy::no_retry())
            .for_service("svc.Echo", MethodPolicy::patient())
            .for_method("svc.Echo", "Unary", MethodPolicy::aggressive())
            .build()
            .unwrap();

        assert_eq!(
            config.resolve("svc.Echo", "Unary"),
            Some(&MethodPolicy::aggressive())
        );
        assert_eq!(
            config.resolve("svc.Echo", "Stream"),
            Some(&MethodPolicy::patient())
        );
        assert_eq!(
            config.resolve("svc.Other", "Unary"),
            Some(&MethodPolicy::no_retry())
        );
    }

    #[test]
    fn resolve_with_no_default_and_no_match_returns_none() {
        let config = ServiceConfig::builder()
            .for_service("svc.Echo", MethodPolicy::patient())
            .build()
            .unwrap();
        assert_eq!(config.resolve("svc.Other", "Unary"), None);
    }

    #[test]
    fn builder_build_rejects_invalid_policy() {
        let mut bad = MethodPolicy::aggressive();
        bad.max_attempts = 99;
        let err = ServiceConfig::builder().default_policy(bad).build();
        assert!(err.is_err());
    }
}
