//! Permission specifications and the registry that resolves them.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::endowments::{EndowmentKind, EndowmentSpecification};
use crate::target::{validate_target_name, TargetKey};
use crate::{construct_permission, Caveat, Error, Permission, PermissionOptions, Result};

/// Custom validation run on new and mutated permissions.
pub type Validator = Arc<dyn Fn(&Permission) -> Result<()> + Send + Sync>;

/// A permission factory. Its output is trusted and not passed to the validator.
pub type Factory = Arc<dyn Fn(PermissionOptions) -> Result<Permission> + Send + Sync>;

/// Arguments handed to a restricted method implementation.
#[derive(Debug, Clone)]
pub struct RestrictedMethodArgs {
    pub method: String,
    pub params: Option<Value>,
    /// Origin of the calling subject.
    pub origin: String,
    /// Caveats of the permission that authorized the call.
    pub caveats: Option<Vec<Caveat>>,
}

/// Implementation of a restricted method.
///
/// Caveat enforcement is the implementation's job; the engine only
/// forwards the caveats of the authorizing permission.
pub trait RestrictedMethod: Send + Sync {
    fn call(&self, args: RestrictedMethodArgs) -> Result<Value>;
}

impl<F> RestrictedMethod for F
where
    F: Fn(RestrictedMethodArgs) -> Result<Value> + Send + Sync,
{
    fn call(&self, args: RestrictedMethodArgs) -> Result<Value> {
        self(args)
    }
}

/// What a permission grants once the enforcement gate allows it.
#[derive(Clone)]
pub enum Implementation {
    /// An invocable method.
    Method(Arc<dyn RestrictedMethod>),
    /// A flag or data payload.
    Endowment(EndowmentKind),
}

impl std::fmt::Debug for Implementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Method(_) => f.write_str("Method(..)"),
            Self::Endowment(kind) => f.debug_tuple("Endowment").field(kind).finish(),
        }
    }
}

/// The rules for a target or target family.
#[derive(Clone)]
pub struct PermissionSpecification {
    pub target_key: String,
    pub implementation: Implementation,
    /// Caveat types permitted on the target. `None` permits no caveats.
    pub allowed_caveats: Option<Vec<String>>,
    pub factory: Option<Factory>,
    pub validator: Option<Validator>,
}

impl std::fmt::Debug for PermissionSpecification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionSpecification")
            .field("target_key", &self.target_key)
            .field("implementation", &self.implementation)
            .field("allowed_caveats", &self.allowed_caveats)
            .field("factory", &self.factory.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl PermissionSpecification {
    /// A restricted method specification with no caveats, factory or validator.
    pub fn restricted_method(
        target_key: impl Into<String>,
        method: impl RestrictedMethod + 'static,
    ) -> Self {
        Self {
            target_key: target_key.into(),
            implementation: Implementation::Method(Arc::new(method)),
            allowed_caveats: None,
            factory: None,
            validator: None,
        }
    }

    pub fn with_allowed_caveats<I, S>(mut self, caveats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_caveats = Some(caveats.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_factory(
        mut self,
        factory: impl Fn(PermissionOptions) -> Result<Permission> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&Permission) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Full validation: caveat allow-list, endowment payload shape, validator.
    pub fn validate(&self, permission: &Permission) -> Result<()> {
        self.check_caveats(permission)?;
        if let Implementation::Endowment(kind) = &self.implementation {
            kind.validate(permission)?;
        }
        if let Some(validator) = &self.validator {
            validator(permission)?;
        }
        Ok(())
    }

    /// Reject caveat types outside the allow-list, and repeated types.
    pub fn check_caveats(&self, permission: &Permission) -> Result<()> {
        let Some(caveats) = permission.caveats() else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        for caveat in caveats {
            let allowed = self
                .allowed_caveats
                .as_ref()
                .is_some_and(|allowed| allowed.iter().any(|kind| *kind == caveat.kind));
            if !allowed {
                return Err(Error::CaveatNotAllowed {
                    target: permission.target().to_string(),
                    caveat: caveat.kind.clone(),
                });
            }
            if !seen.insert(caveat.kind.as_str()) {
                return Err(Error::DuplicateCaveat {
                    target: permission.target().to_string(),
                    caveat: caveat.kind.clone(),
                });
            }
        }
        Ok(())
    }
}

impl From<EndowmentSpecification> for PermissionSpecification {
    fn from(spec: EndowmentSpecification) -> Self {
        Self {
            target_key: spec.target_key,
            implementation: Implementation::Endowment(spec.getter),
            allowed_caveats: spec.allowed_caveats,
            factory: None,
            validator: None,
        }
    }
}

/// A newly built permission, tagged by how much it has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Constructed {
    /// Built by the default constructor and fully validated.
    Default(Permission),
    /// Built by a specification factory. Only the caveat allow-list was
    /// checked; the validator first runs on the next caveat mutation.
    ViaFactory(Permission),
}

impl Constructed {
    pub fn permission(&self) -> &Permission {
        match self {
            Self::Default(permission) | Self::ViaFactory(permission) => permission,
        }
    }

    pub fn into_permission(self) -> Permission {
        match self {
            Self::Default(permission) | Self::ViaFactory(permission) => permission,
        }
    }
}

/// Maps target keys to specifications.
#[derive(Debug, Default)]
pub struct SpecificationRegistry {
    specs: IndexMap<TargetKey, PermissionSpecification>,
}

impl SpecificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specification under its target key.
    ///
    /// Nothing is installed when the key is malformed, already present, or
    /// overlaps the names governed by an existing key.
    pub fn register(&mut self, spec: impl Into<PermissionSpecification>) -> Result<()> {
        let spec = spec.into();
        let key = TargetKey::parse(&spec.target_key)?;

        if self.specs.contains_key(&key) {
            return Err(Error::DuplicateTarget(spec.target_key));
        }
        if let Some(existing) = self.specs.keys().find(|existing| existing.overlaps(&key)) {
            return Err(Error::InvalidTargetKey {
                key: spec.target_key,
                reason: format!("overlaps registered key '{existing}'"),
            });
        }

        tracing::debug!(target_key = %key, "registered permission specification");
        self.specs.insert(key, spec);
        Ok(())
    }

    /// Resolve the specification governing a concrete target name.
    ///
    /// Exact keys win; otherwise the family with the longest base matching
    /// the name is used.
    pub fn resolve(&self, target: &str) -> Option<&PermissionSpecification> {
        if let Some(spec) = self.specs.get(&TargetKey::Concrete(target.to_string())) {
            return Some(spec);
        }

        self.specs
            .iter()
            .filter_map(|(key, spec)| match key {
                TargetKey::Family { base } if key.matches(target) => Some((base.len(), spec)),
                _ => None,
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, spec)| spec)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.resolve(target).is_some()
    }

    /// Registered keys, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &TargetKey> {
        self.specs.keys()
    }

    /// Build a permission for `options.target`.
    pub fn construct(&self, options: PermissionOptions) -> Result<Constructed> {
        validate_target_name(&options.target)?;
        let target = options.target.clone();
        let spec = self
            .resolve(&target)
            .ok_or_else(|| Error::UnknownTarget(target.clone()))?;

        match &spec.factory {
            Some(factory) => {
                let invoker = options.invoker.clone();
                let permission = factory(options)?;
                if permission.target() != target || permission.invoker() != invoker {
                    return Err(Error::Validation(format!(
                        "factory for '{}' produced a permission for another target or invoker",
                        spec.target_key
                    )));
                }
                spec.check_caveats(&permission)?;
                Ok(Constructed::ViaFactory(permission))
            }
            None => {
                let permission = construct_permission(options);
                spec.validate(&permission)?;
                Ok(Constructed::Default(permission))
            }
        }
    }

    /// Validate a permission against the specification for `target`.
    pub fn validate_permission(&self, target: &str, permission: &Permission) -> Result<()> {
        self.resolve(target)
            .ok_or_else(|| Error::UnknownTarget(target.to_string()))?
            .validate(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(_: RestrictedMethodArgs) -> Result<Value> {
        Ok(Value::Null)
    }

    #[test]
    fn register_accepts_family_keys() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(PermissionSpecification::restricted_method("wallet_plugin_*", noop))
            .unwrap();
        registry
            .register(PermissionSpecification::restricted_method("snap_confirm", noop))
            .unwrap();
        assert_eq!(registry.keys().count(), 2);
    }

    #[test]
    fn register_rejects_bare_suffixes() {
        let mut registry = SpecificationRegistry::new();
        for key in ["snap_", "snap*", "snap_confirm*"] {
            let result = registry.register(PermissionSpecification::restricted_method(key, noop));
            assert!(matches!(result, Err(Error::InvalidTargetKey { .. })), "{key}");
        }
        assert_eq!(registry.keys().count(), 0);
    }

    #[test]
    fn register_rejects_shadowed_and_duplicate_keys() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(PermissionSpecification::restricted_method("wallet_plugin_*", noop))
            .unwrap();

        let shadowed = PermissionSpecification::restricted_method("wallet_plugin_foo", noop);
        let shadowed = registry.register(shadowed);
        assert!(matches!(shadowed, Err(Error::InvalidTargetKey { .. })));

        let nested = PermissionSpecification::restricted_method("wallet_plugin_x_*", noop);
        let nested = registry.register(nested);
        assert!(matches!(nested, Err(Error::InvalidTargetKey { .. })));

        let duplicate =
            registry.register(PermissionSpecification::restricted_method("wallet_plugin_*", noop));
        assert!(matches!(duplicate, Err(Error::DuplicateTarget(_))));
    }

    #[test]
    fn resolves_family_members() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(PermissionSpecification::restricted_method("wallet_plugin_*", noop))
            .unwrap();

        let spec = registry.resolve("wallet_plugin_npm:foo").unwrap();
        assert_eq!(spec.target_key, "wallet_plugin_*");
        assert!(registry.resolve("wallet_other").is_none());
        assert!(matches!(
            registry.validate_permission(
                "wallet_other",
                &construct_permission(PermissionOptions::new("wallet_other", "a"))
            ),
            Err(Error::UnknownTarget(_))
        ));
    }

    #[test]
    fn construct_unknown_target_fails() {
        let registry = SpecificationRegistry::new();
        let result = registry.construct(PermissionOptions::new("nope", "npm:foo"));
        assert!(matches!(result, Err(Error::UnknownTarget(_))));
    }

    #[test]
    fn construct_rejects_wildcard_names() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(PermissionSpecification::restricted_method("wallet_plugin_*", noop))
            .unwrap();
        let result = registry.construct(PermissionOptions::new("wallet_plugin_*", "npm:foo"));
        assert!(matches!(result, Err(Error::InvalidTargetName(_))));
    }

    #[test]
    fn default_construction_runs_validator() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(
                PermissionSpecification::restricted_method("snap_confirm", noop)
                    .with_allowed_caveats(["limit"])
                    .with_validator(|permission| match permission.find_caveat("limit") {
                        Some(_) => Ok(()),
                        None => Err(Error::Validation("limit caveat required".into())),
                    }),
            )
            .unwrap();

        let missing = registry.construct(PermissionOptions::new("snap_confirm", "npm:foo"));
        assert!(matches!(missing, Err(Error::Validation(_))));

        let constructed = registry
            .construct(
                PermissionOptions::new("snap_confirm", "npm:foo")
                    .with_caveats(vec![Caveat::new("limit", json!(3))]),
            )
            .unwrap();
        assert!(matches!(constructed, Constructed::Default(_)));
    }

    #[test]
    fn factory_construction_skips_validator() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(
                PermissionSpecification::restricted_method("snap_confirm", noop)
                    .with_factory(|options| Ok(construct_permission(options)))
                    .with_validator(|_| Err(Error::Validation("always".into()))),
            )
            .unwrap();

        let constructed = registry
            .construct(PermissionOptions::new("snap_confirm", "npm:foo"))
            .unwrap();
        assert!(matches!(constructed, Constructed::ViaFactory(_)));

        let permission = constructed.into_permission();
        assert!(registry.validate_permission("snap_confirm", &permission).is_err());
    }

    #[test]
    fn factory_output_still_respects_allow_list() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(
                PermissionSpecification::restricted_method("snap_confirm", noop)
                    .with_factory(|options| Ok(construct_permission(options))),
            )
            .unwrap();

        let result = registry.construct(
            PermissionOptions::new("snap_confirm", "npm:foo")
                .with_caveats(vec![Caveat::new("limit", json!(1))]),
        );
        assert!(matches!(result, Err(Error::CaveatNotAllowed { .. })));
    }

    #[test]
    fn duplicate_caveat_types_are_rejected() {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(
                PermissionSpecification::restricted_method("snap_confirm", noop)
                    .with_allowed_caveats(["limit"]),
            )
            .unwrap();

        let result = registry.construct(
            PermissionOptions::new("snap_confirm", "npm:foo").with_caveats(vec![
                Caveat::new("limit", json!(1)),
                Caveat::new("limit", json!(2)),
            ]),
        );
        assert!(matches!(result, Err(Error::DuplicateCaveat { .. })));
    }
}
