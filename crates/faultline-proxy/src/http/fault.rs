//! Fault decisions for a single matched request.

use faultline_core::{Failure, Rule};
use rand::Rng;
use tracing::warn;

/// Fixed response bodies; part of FaultLine's wire contract, not a detail
/// implementers may alter.
pub const INJECTED_ERROR_BODY: &str = "FaultLine: Injected Error Response";
pub const INJECTED_FLAKY_BODY: &str = "FaultLine: Injected Flaky Error";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggeredBody {
    Error,
    Flaky,
}

impl TriggeredBody {
    pub fn text(self) -> &'static str {
        match self {
            TriggeredBody::Error => INJECTED_ERROR_BODY,
            TriggeredBody::Flaky => INJECTED_FLAKY_BODY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FaultDecision {
    /// No rule matched, or the matched rule resolved to a no-op.
    Passthrough,
    /// Sleep for the given duration before forwarding.
    Latency { ms: u64 },
    /// Short-circuit with this status code instead of forwarding upstream.
    Error { code: u16, body: TriggeredBody },
}

/// Fixed status for a `Flaky` fault that fires, mirroring an intermittently
/// unavailable backend.
const FLAKY_TRIGGERED_STATUS: u16 = 503;

pub fn decide(rule: Option<&Rule>) -> FaultDecision {
    let Some(rule) = rule else {
        return FaultDecision::Passthrough;
    };
    if !rule.enabled {
        return FaultDecision::Passthrough;
    }
    match &rule.failure {
        Failure::Latency { latency_ms } => FaultDecision::Latency { ms: *latency_ms },
        Failure::Error { error_code } => FaultDecision::Error {
            code: *error_code,
            body: TriggeredBody::Error,
        },
        Failure::Flaky { probability } => {
            if rand::thread_rng().gen_bool(*probability) {
                FaultDecision::Error {
                    code: FLAKY_TRIGGERED_STATUS,
                    body: TriggeredBody::Flaky,
                }
            } else {
                FaultDecision::Passthrough
            }
        }
        Failure::Unknown { type_name, .. } => {
            warn!(rule_id = %rule.id, failure_type = %type_name, "unrecognized failure type, passing request through");
            FaultDecision::Passthrough
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::Category;

    fn rule_with(failure: Failure, enabled: bool) -> Rule {
        Rule {
            id: "r1".into(),
            target: "example.test".into(),
            enabled,
            category: None::<Category>,
            failure,
        }
    }

    #[test]
    fn no_match_is_passthrough() {
        assert_eq!(decide(None), FaultDecision::Passthrough);
    }

    #[test]
    fn disabled_rule_is_passthrough_even_with_failure_set() {
        let rule = rule_with(Failure::Error { error_code: 500 }, false);
        assert_eq!(decide(Some(&rule)), FaultDecision::Passthrough);
    }

    #[test]
    fn latency_rule_yields_latency_decision() {
        let rule = rule_with(Failure::Latency { latency_ms: 250 }, true);
        assert_eq!(decide(Some(&rule)), FaultDecision::Latency { ms: 250 });
    }

    #[test]
    fn error_rule_yields_error_decision() {
        let rule = rule_with(Failure::Error { error_code: 418 }, true);
        assert_eq!(
            decide(Some(&rule)),
            FaultDecision::Error {
                code: 418,
                body: TriggeredBody::Error
            }
        );
    }

    #[test]
    fn flaky_probability_zero_never_triggers() {
        let rule = rule_with(Failure::Flaky { probability: 0.0 }, true);
        for _ in 0..50 {
            assert_eq!(decide(Some(&rule)), FaultDecision::Passthrough);
        }
    }

    #[test]
    fn flaky_probability_one_always_triggers() {
        let rule = rule_with(Failure::Flaky { probability: 1.0 }, true);
        for _ in 0..50 {
            assert_eq!(
                decide(Some(&rule)),
                FaultDecision::Error {
                    code: FLAKY_TRIGGERED_STATUS,
                    body: TriggeredBody::Flaky
                }
            );
        }
    }

    #[test]
    fn unknown_failure_is_passthrough() {
        let rule = rule_with(
            Failure::Unknown {
                type_name: "teleport".into(),
                latency_ms: None,
                error_code: None,
                probability: None,
            },
            true,
        );
        assert_eq!(decide(Some(&rule)), FaultDecision::Passthrough);
    }
}
