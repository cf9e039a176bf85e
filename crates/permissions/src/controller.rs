//! Permission storage and enforcement.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::specification::{Implementation, RestrictedMethodArgs, SpecificationRegistry};
use crate::target::validate_target_name;
use crate::{Caveat, Error, Permission, PermissionOptions, Result};

/// Permissions of one subject, keyed by target name in grant order.
pub type SubjectPermissions = IndexMap<String, Permission>;

/// Read access to granted permissions.
pub trait PermissionStore: Send + Sync {
    fn has_permission(&self, subject: &str, target: &str) -> bool;

    fn get_permissions(&self, subject: &str) -> SubjectPermissions;
}

/// A durable sink for permission changes.
///
/// Called before the in-memory state changes; an error aborts the change.
pub trait Persistence: Send + Sync {
    fn save(&self, permission: &Permission) -> Result<()>;

    fn remove(&self, subject: &str, target: &str) -> Result<()>;

    fn remove_subject(&self, subject: &str) -> Result<()>;
}

/// Owns granted permissions and gates access to their targets.
pub struct PermissionController {
    registry: SpecificationRegistry,
    subjects: RwLock<IndexMap<String, SubjectPermissions>>,
    persistence: Option<Box<dyn Persistence>>,
}

impl PermissionController {
    pub fn new(registry: SpecificationRegistry) -> Self {
        Self {
            registry,
            subjects: RwLock::new(IndexMap::new()),
            persistence: None,
        }
    }

    /// Write every change through to `persistence`.
    pub fn with_persistence(mut self, persistence: impl Persistence + 'static) -> Self {
        self.persistence = Some(Box::new(persistence));
        self
    }

    pub fn registry(&self) -> &SpecificationRegistry {
        &self.registry
    }

    /// Load previously granted permissions without writing them back.
    ///
    /// Each permission must still resolve to a registered target and
    /// satisfy its caveat allow-list.
    pub fn restore(&self, permissions: impl IntoIterator<Item = Permission>) -> Result<usize> {
        let mut restored = Vec::new();
        for permission in permissions {
            validate_target_name(permission.target())?;
            self.registry
                .resolve(permission.target())
                .ok_or_else(|| Error::UnknownTarget(permission.target().to_string()))?
                .check_caveats(&permission)?;
            restored.push(permission);
        }

        let count = restored.len();
        let mut subjects = self.write();
        for permission in restored {
            subjects
                .entry(permission.invoker().to_string())
                .or_default()
                .insert(permission.target().to_string(), permission);
        }
        debug!(count, "restored permissions");
        Ok(count)
    }

    /// Grant `target` to `subject`, replacing any existing grant for it.
    pub fn grant(
        &self,
        subject: &str,
        target: &str,
        caveats: Option<Vec<Caveat>>,
    ) -> Result<Permission> {
        let mut options = PermissionOptions::new(target, subject);
        options.caveats = caveats;
        let permission = self.registry.construct(options)?.into_permission();

        let mut subjects = self.write();
        if let Some(persistence) = &self.persistence {
            persistence.save(&permission)?;
        }
        subjects
            .entry(subject.to_string())
            .or_default()
            .insert(target.to_string(), permission.clone());

        info!(subject, target, id = %permission.id(), "granted permission");
        Ok(permission)
    }

    pub fn get_permission(&self, subject: &str, target: &str) -> Option<Permission> {
        self.read()
            .get(subject)
            .and_then(|permissions| permissions.get(target))
            .cloned()
    }

    /// Replace the caveats of an existing permission.
    ///
    /// The replacement is validated as a whole; on failure the permission is
    /// left untouched.
    pub fn update_caveats(
        &self,
        subject: &str,
        target: &str,
        caveats: Option<Vec<Caveat>>,
    ) -> Result<Permission> {
        let mut subjects = self.write();
        let current = subjects
            .get(subject)
            .and_then(|permissions| permissions.get(target))
            .ok_or(Error::Unauthorized)?;

        let mut updated = current.clone();
        updated.replace_caveats(caveats);
        self.registry.validate_permission(target, &updated)?;

        if let Some(persistence) = &self.persistence {
            persistence.save(&updated)?;
        }
        if let Some(slot) = subjects
            .get_mut(subject)
            .and_then(|permissions| permissions.get_mut(target))
        {
            *slot = updated.clone();
        }

        debug!(subject, target, "updated caveats");
        Ok(updated)
    }

    /// Revoke one permission. Returns whether it existed.
    pub fn revoke(&self, subject: &str, target: &str) -> Result<bool> {
        let mut subjects = self.write();
        let held = subjects
            .get(subject)
            .is_some_and(|permissions| permissions.contains_key(target));
        if !held {
            return Ok(false);
        }

        if let Some(persistence) = &self.persistence {
            persistence.remove(subject, target)?;
        }
        if let Some(permissions) = subjects.get_mut(subject) {
            permissions.shift_remove(target);
            if permissions.is_empty() {
                subjects.shift_remove(subject);
            }
        }

        info!(subject, target, "revoked permission");
        Ok(true)
    }

    /// Drop every permission of a subject.
    pub fn remove_subject(&self, subject: &str) -> Result<()> {
        let mut subjects = self.write();
        if let Some(persistence) = &self.persistence {
            persistence.remove_subject(subject)?;
        }
        if subjects.shift_remove(subject).is_some() {
            info!(subject, "removed subject");
        }
        Ok(())
    }

    /// Subjects holding at least one permission.
    pub fn subjects(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Invoke a restricted method on behalf of `subject`.
    pub fn execute_restricted_method(
        &self,
        subject: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value> {
        let permission = self.authorize(subject, method)?;
        let spec = self
            .registry
            .resolve(method)
            .ok_or_else(|| Error::UnknownTarget(method.to_string()))?;

        let Implementation::Method(implementation) = &spec.implementation else {
            return Err(Error::NotAMethod(method.to_string()));
        };

        debug!(subject, method, "invoking restricted method");
        implementation.call(RestrictedMethodArgs {
            method: method.to_string(),
            params,
            origin: subject.to_string(),
            caveats: permission.caveats().map(<[Caveat]>::to_vec),
        })
    }

    /// Get the endowment payload `subject` holds for `target`.
    ///
    /// `Ok(None)` means a flag endowment: holding it is the signal.
    pub fn get_endowments(&self, subject: &str, target: &str) -> Result<Option<Value>> {
        let permission = self.authorize(subject, target)?;
        let spec = self
            .registry
            .resolve(target)
            .ok_or_else(|| Error::UnknownTarget(target.to_string()))?;

        match &spec.implementation {
            Implementation::Endowment(kind) => kind.get(&permission),
            Implementation::Method(_) => Err(Error::NotAnEndowment(target.to_string())),
        }
    }

    fn authorize(&self, subject: &str, target: &str) -> Result<Permission> {
        self.get_permission(subject, target).ok_or_else(|| {
            debug!(subject, target, "denied: permission not held");
            Error::Unauthorized
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, SubjectPermissions>> {
        self.subjects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, SubjectPermissions>> {
        self.subjects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PermissionStore for PermissionController {
    fn has_permission(&self, subject: &str, target: &str) -> bool {
        self.read()
            .get(subject)
            .is_some_and(|permissions| permissions.contains_key(target))
    }

    fn get_permissions(&self, subject: &str) -> SubjectPermissions {
        self.read().get(subject).cloned().unwrap_or_default()
    }
}
