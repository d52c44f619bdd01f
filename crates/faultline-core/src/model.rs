//! The rule data model: `Rule`, `Failure`, `TcpRule`, `TcpFaults`.
//!
//! `Failure` is modeled as an explicit discriminated union (per the design
//! note in the spec preferring a strict sum type), but (de)serializes to
//! and from the flat `{type, latencyMs, errorCode, probability}` JSON record
//! the persisted rule file uses, so the wire format never changes shape.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `timeout` has no dedicated runtime behavior; it is normalized into a
/// `Failure::Latency` large enough to exceed typical client timeouts.
pub const TIMEOUT_LATENCY_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Api,
    Database,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Latency {
        latency_ms: u64,
    },
    Error {
        error_code: u16,
    },
    Flaky {
        probability: f64,
    },
    /// A recognized-but-invalid or genuinely unrecognized failure type.
    /// Kept around (rather than rejected) so `getAll`/export round-trip it,
    /// per the forward-compatibility invariant in the data model.
    Unknown {
        type_name: String,
        latency_ms: Option<u64>,
        error_code: Option<u16>,
        probability: Option<f64>,
    },
}

impl Failure {
    /// Whether this failure is well-formed enough to apply to traffic.
    /// An invalid failure is never rejected outright — it is stored as
    /// given and treated as pass-through at match time, with the reason
    /// logged by the caller.
    pub fn validation_error(&self) -> Option<String> {
        match self {
            Failure::Latency { .. } => None,
            Failure::Error { error_code } => {
                if (100..=599).contains(error_code) {
                    None
                } else {
                    Some(format!("error code {error_code} out of range [100,599]"))
                }
            }
            Failure::Flaky { probability } => {
                if (0.0..=1.0).contains(probability) {
                    None
                } else {
                    Some(format!("probability {probability} out of range [0,1]"))
                }
            }
            Failure::Unknown { type_name, .. } => {
                Some(format!("unrecognized failure type '{type_name}'"))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FailureWire {
    #[serde(rename = "type")]
    type_name: String,
    // The persisted rule file and the control API use `latencyMs`; the
    // documented `faultline.yaml` seed shape (spec.md §6) uses `latency_ms`.
    // Accept either on the way in, always emit the camelCase wire form.
    #[serde(
        default,
        rename = "latencyMs",
        alias = "latency_ms",
        skip_serializing_if = "Option::is_none"
    )]
    latency_ms: Option<u64>,
    #[serde(
        default,
        rename = "errorCode",
        alias = "error_code",
        skip_serializing_if = "Option::is_none"
    )]
    error_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probability: Option<f64>,
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

impl Serialize for Failure {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Failure::Latency { latency_ms } => FailureWire {
                type_name: "latency".to_string(),
                latency_ms: Some(*latency_ms),
                error_code: None,
                probability: None,
            },
            Failure::Error { error_code } => FailureWire {
                type_name: "error".to_string(),
                latency_ms: None,
                error_code: Some(*error_code),
                probability: None,
            },
            Failure::Flaky { probability } => FailureWire {
                type_name: "flaky".to_string(),
                latency_ms: None,
                error_code: None,
                probability: Some(*probability),
            },
            Failure::Unknown {
                type_name,
                latency_ms,
                error_code,
                probability,
            } => FailureWire {
                type_name: type_name.clone(),
                latency_ms: *latency_ms,
                error_code: *error_code,
                probability: *probability,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Failure {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = FailureWire::deserialize(deserializer)?;
        Ok(match wire.type_name.as_str() {
            "latency" => Failure::Latency {
                latency_ms: wire.latency_ms.unwrap_or(0),
            },
            "error" => Failure::Error {
                error_code: wire.error_code.ok_or_else(|| {
                    D::Error::custom("failure.type \"error\" requires errorCode")
                })?,
            },
            "flaky" => Failure::Flaky {
                probability: clamp_probability(wire.probability.unwrap_or(0.0)),
            },
            "timeout" => Failure::Latency {
                latency_ms: TIMEOUT_LATENCY_MS,
            },
            other => Failure::Unknown {
                type_name: other.to_string(),
                latency_ms: wire.latency_ms,
                error_code: wire.error_code,
                probability: wire.probability,
            },
        })
    }
}

fn generated_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}

/// A fault-injection directive matched against reconstructed HTTP target URLs.
///
/// `id` and `enabled` default when absent so that `faultline.yaml`'s `rules:`
/// seed list (spec.md §6: `{target, failure: {...}}`, no `id`/`enabled`) loads
/// directly as `Rule`s — a freshly generated id and `enabled: true` — while
/// the persisted rule file and control API, which always round-trip both
/// fields explicitly, are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "generated_id")]
    pub id: String,
    pub target: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub failure: Failure,
}

impl Rule {
    /// Build a rule with a freshly generated id, for callers (control API,
    /// CLI `rules add`) that don't supply one themselves.
    pub fn new_with_generated_id(
        target: String,
        failure: Failure,
        enabled: bool,
        category: Option<Category>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target,
            enabled,
            category,
            failure,
        }
    }
}

/// Per-direction fault configuration for one TCP listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TcpFaults {
    #[serde(default, rename = "latencyMs")]
    pub latency_ms: u64,
    #[serde(default, rename = "dropProbability")]
    pub drop_probability: f64,
    #[serde(default, rename = "resetProbability")]
    pub reset_probability: f64,
    #[serde(default, rename = "bandwidthKbps")]
    pub bandwidth_kbps: u64,
    #[serde(default, rename = "refuseConnections")]
    pub refuse_connections: bool,
}

impl TcpFaults {
    /// Clamp probabilities to [0,1] in place, per the data model invariant.
    pub fn normalize(&mut self) {
        self.drop_probability = clamp_probability(self.drop_probability);
        self.reset_probability = clamp_probability(self.reset_probability);
    }
}

/// Immutable-after-startup configuration for one TCP listener/upstream pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpRule {
    pub listen: String,
    pub upstream: String,
    #[serde(default)]
    pub faults: TcpFaults,
}
