//! Permission records and the default permission constructor.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Caveat;

/// A unique identifier for a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionId(pub Uuid);

impl PermissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PermissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PermissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// A stored capability grant binding a subject to a target.
///
/// Everything but the caveat list is fixed at construction. Caveats are only
/// replaced wholesale, through [`PermissionController::update_caveats`].
///
/// [`PermissionController::update_caveats`]: crate::PermissionController::update_caveats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    id: PermissionId,
    #[serde(rename = "parentCapability")]
    target: String,
    invoker: String,
    caveats: Option<Vec<Caveat>>,
    date: i64,
}

impl Permission {
    pub fn id(&self) -> PermissionId {
        self.id
    }

    /// The target name this permission governs.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The subject holding this permission.
    pub fn invoker(&self) -> &str {
        &self.invoker
    }

    pub fn caveats(&self) -> Option<&[Caveat]> {
        self.caveats.as_deref()
    }

    /// Creation time in epoch milliseconds.
    pub fn date(&self) -> i64 {
        self.date
    }

    /// Get the first caveat of the given type.
    pub fn find_caveat(&self, caveat_type: &str) -> Option<&Caveat> {
        find_caveat(self, caveat_type)
    }

    pub(crate) fn replace_caveats(&mut self, caveats: Option<Vec<Caveat>>) {
        self.caveats = caveats;
    }
}

/// Inputs for building a permission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionOptions {
    pub target: String,
    pub invoker: String,
    /// Assigned if not provided.
    pub id: Option<PermissionId>,
    pub caveats: Option<Vec<Caveat>>,
}

impl PermissionOptions {
    pub fn new(target: impl Into<String>, invoker: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            invoker: invoker.into(),
            ..Default::default()
        }
    }

    pub fn with_caveats(mut self, caveats: Vec<Caveat>) -> Self {
        self.caveats = Some(caveats);
        self
    }

    pub fn with_id(mut self, id: PermissionId) -> Self {
        self.id = Some(id);
        self
    }
}

/// The default permission factory.
///
/// Naively builds a permission from the options, generating an id when none
/// is given. Performs no validation.
pub fn construct_permission(options: PermissionOptions) -> Permission {
    let PermissionOptions {
        target,
        invoker,
        id,
        caveats,
    } = options;

    Permission {
        id: id.unwrap_or_default(),
        target,
        invoker,
        caveats,
        date: Utc::now().timestamp_millis(),
    }
}

/// Get the first caveat of `caveat_type` on `permission`, if any.
pub fn find_caveat<'a>(permission: &'a Permission, caveat_type: &str) -> Option<&'a Caveat> {
    permission
        .caveats
        .as_ref()?
        .iter()
        .find(|caveat| caveat.kind == caveat_type)
}
