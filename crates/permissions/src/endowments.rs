//! Endowment specification builders.
//!
//! An endowment grants a flag or a data payload instead of an invocable
//! method. Builders are pure: equal options give equal specifications.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Permission, Result};

/// Target keys of the built-in endowments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endowment {
    NetworkAccess,
    LongRunning,
    TransactionInsight,
    Cronjob,
}

impl Endowment {
    pub const ALL: [Endowment; 4] = [
        Endowment::NetworkAccess,
        Endowment::LongRunning,
        Endowment::TransactionInsight,
        Endowment::Cronjob,
    ];

    pub fn target_key(self) -> &'static str {
        match self {
            Endowment::NetworkAccess => "endowment:network-access",
            Endowment::LongRunning => "endowment:long-running",
            Endowment::TransactionInsight => "endowment:transaction-insight",
            Endowment::Cronjob => "endowment:cronjob",
        }
    }

    /// Build the specification for this endowment.
    pub fn specification(self) -> EndowmentSpecification {
        match self {
            Endowment::NetworkAccess => network_access(),
            Endowment::LongRunning => long_running(),
            Endowment::TransactionInsight => transaction_insight(),
            Endowment::Cronjob => cronjob(),
        }
    }
}

impl std::fmt::Display for Endowment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.target_key())
    }
}

/// Caveat type carrying cronjob definitions.
pub const CRONJOB_CAVEAT: &str = "cronjobCaveat";

/// One recurring job requested by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronjobDefinition {
    pub expression: String,
    pub request: Map<String, Value>,
}

/// Value of the cronjob caveat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronjobPayload {
    pub jobs: Vec<CronjobDefinition>,
}

/// How an endowment derives its payload from a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndowmentKind {
    /// Holding the permission is the whole signal.
    Flag,
    /// The cronjob definitions carried in the cronjob caveat.
    Cronjob,
}

impl EndowmentKind {
    /// Get the endowment payload of a permission.
    pub fn get(self, permission: &Permission) -> Result<Option<Value>> {
        match self {
            EndowmentKind::Flag => Ok(None),
            EndowmentKind::Cronjob => {
                let payload = cronjob_payload(permission)?;
                let jobs = serde_json::to_value(payload.jobs).map_err(|e| Error::InvalidCaveat {
                    caveat: CRONJOB_CAVEAT.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(jobs))
            }
        }
    }

    pub(crate) fn validate(self, permission: &Permission) -> Result<()> {
        match self {
            EndowmentKind::Flag => Ok(()),
            EndowmentKind::Cronjob => cronjob_payload(permission).map(|_| ()),
        }
    }
}

/// A data-only endowment specification.
#[derive(Debug, Clone, PartialEq)]
pub struct EndowmentSpecification {
    pub target_key: String,
    pub allowed_caveats: Option<Vec<String>>,
    pub getter: EndowmentKind,
}

fn flag(endowment: Endowment) -> EndowmentSpecification {
    EndowmentSpecification {
        target_key: endowment.target_key().to_string(),
        allowed_caveats: None,
        getter: EndowmentKind::Flag,
    }
}

/// `endowment:network-access`: the plugin may use network APIs.
pub fn network_access() -> EndowmentSpecification {
    flag(Endowment::NetworkAccess)
}

/// `endowment:long-running`: the plugin is exempt from idle termination.
pub fn long_running() -> EndowmentSpecification {
    flag(Endowment::LongRunning)
}

/// `endowment:transaction-insight`: the plugin may annotate transactions.
pub fn transaction_insight() -> EndowmentSpecification {
    flag(Endowment::TransactionInsight)
}

/// `endowment:cronjob`: the plugin wants the jobs listed in its cronjob caveat run.
pub fn cronjob() -> EndowmentSpecification {
    EndowmentSpecification {
        target_key: Endowment::Cronjob.target_key().to_string(),
        allowed_caveats: Some(vec![CRONJOB_CAVEAT.to_string()]),
        getter: EndowmentKind::Cronjob,
    }
}

/// Specifications of every built-in endowment.
pub fn all_endowment_specifications() -> Vec<EndowmentSpecification> {
    Endowment::ALL.iter().map(|e| e.specification()).collect()
}

/// Read the cronjob definitions out of a cronjob permission.
pub fn cronjob_payload(permission: &Permission) -> Result<CronjobPayload> {
    let caveat = permission
        .find_caveat(CRONJOB_CAVEAT)
        .ok_or_else(|| Error::InvalidCaveat {
            caveat: CRONJOB_CAVEAT.to_string(),
            reason: "missing".to_string(),
        })?;

    serde_json::from_value(caveat.value.clone()).map_err(|e| Error::InvalidCaveat {
        caveat: CRONJOB_CAVEAT.to_string(),
        reason: e.to_string(),
    })
}
