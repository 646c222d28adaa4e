//! Static policy checks on the merged configuration (spec.md §4.4).
//!
//! These run after the Merge Engine and before any adapter is touched: a
//! policy failure means the declared configuration itself is invalid for
//! this platform, independent of whether any backend could actually
//! provision it.

use crate::model::{EnvironmentConfig, Manifest, PlatformConfig, SecretsStrategy, ValidationResult};
use crate::reference;
use crate::ErrorKind;

/// Runs every policy check against a loaded-and-merged configuration.
/// Registered resource types are passed in so the reference check can flag
/// not just "undeclared" but "declared yet unprovidable" references
/// consistently with the engine's `NoProvider` failure mode.
pub fn validate(
    manifest: &Manifest,
    platform: &PlatformConfig,
    environment: &EnvironmentConfig,
    resolved_region: &str,
    resolved_secrets_strategy: SecretsStrategy,
    resolved_external_secrets_store: Option<&str>,
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    check_name(manifest, &mut result);
    check_references(manifest, &mut result);
    check_backend_coverage(manifest, platform, environment, &mut result);
    check_allowed_regions(platform, resolved_region, &mut result);
    check_secrets_store(resolved_secrets_strategy, resolved_external_secrets_store, &mut result);

    result
}

/// I-prefixed references in DESIGN.md: the manifest's name must be set.
fn check_name(manifest: &Manifest, result: &mut ValidationResult) {
    if manifest.name.trim().is_empty() {
        result.push_error(ErrorKind::PolicyMissingName.to_string());
    }
}

/// Every `@resource(...)` reference in the primary service's env must name
/// a resource type the manifest actually declares.
fn check_references(manifest: &Manifest, result: &mut ValidationResult) {
    let declared: Vec<&str> = manifest.resource_types();
    if let Some(service) = manifest.primary_service() {
        result.merge_in(reference::validate_declared(&service.env, &declared));
    }
}

/// Every declared resource type must route to a backend, either at the
/// platform level or via the environment's override (`PolicyNoBackend` in
/// spec.md §7 is a warning, not a hard failure: the plan is still useful
/// for inspection even if Apply would later fail with `NoProvider`).
fn check_backend_coverage(
    manifest: &Manifest,
    platform: &PlatformConfig,
    environment: &EnvironmentConfig,
    result: &mut ValidationResult,
) {
    for ty in manifest.resource_types() {
        if !platform.backends.contains_key(ty) && !environment.backends.contains_key(ty) {
            result.push_warning(format!(
                "resource type '{}' has no backend configured in platform or environment backends",
                ty
            ));
        }
    }
}

/// The resolved region must be in the platform's `allowedRegions` policy,
/// when that policy is non-empty. An empty `allowedRegions` list means the
/// platform imposes no region restriction.
fn check_allowed_regions(platform: &PlatformConfig, resolved_region: &str, result: &mut ValidationResult) {
    let allowed = &platform.policies.allowed_regions;
    if !allowed.is_empty() && !allowed.iter().any(|r| r == resolved_region) {
        result.push_error(ErrorKind::PolicyRegionNotAllowed(resolved_region.to_string()).to_string());
    }
}

/// `external-secrets` strategy requires an external secrets store to be
/// configured somewhere in the merged configuration.
fn check_secrets_store(
    strategy: SecretsStrategy,
    external_secrets_store: Option<&str>,
    result: &mut ValidationResult,
) {
    if strategy == SecretsStrategy::ExternalSecrets && external_secrets_store.is_none() {
        result.push_error(ErrorKind::PolicyMissingSecretsStore.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlatformPolicies, Service};
    use maplit::btreemap;

    fn manifest_with_name(name: &str) -> Manifest {
        Manifest {
            name: name.to_string(),
            resources: vec![],
            services: vec![Service::default()],
        }
    }

    #[test]
    fn blank_name_fails() {
        let manifest = manifest_with_name("  ");
        let platform = PlatformConfig::default();
        let env = EnvironmentConfig::blank("dev");
        let result = validate(&manifest, &platform, &env, "eu-west-1", SecretsStrategy::Opaque, None);
        assert!(!result.is_valid);
    }

    #[test]
    fn region_outside_policy_fails() {
        let manifest = manifest_with_name("checkout");
        let mut platform = PlatformConfig::default();
        platform.policies = PlatformPolicies {
            allowed_regions: vec!["eu-west-1".into()],
            enforce_tls: true,
        };
        let env = EnvironmentConfig::blank("dev");
        let result = validate(&manifest, &platform, &env, "us-east-1", SecretsStrategy::Opaque, None);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn empty_allowed_regions_imposes_no_restriction() {
        let manifest = manifest_with_name("checkout");
        let platform = PlatformConfig::default();
        let env = EnvironmentConfig::blank("dev");
        let result = validate(&manifest, &platform, &env, "anywhere", SecretsStrategy::Opaque, None);
        assert!(result.is_valid);
    }

    #[test]
    fn external_secrets_without_store_fails() {
        let manifest = manifest_with_name("checkout");
        let platform = PlatformConfig::default();
        let env = EnvironmentConfig::blank("dev");
        let result = validate(
            &manifest,
            &platform,
            &env,
            "eu-west-1",
            SecretsStrategy::ExternalSecrets,
            None,
        );
        assert!(!result.is_valid);
    }

    #[test]
    fn resource_without_backend_warns_but_stays_valid() {
        let mut manifest = manifest_with_name("checkout");
        manifest.resources.push(crate::model::Resource::Postgres(Default::default()));
        let platform = PlatformConfig::default();
        let env = EnvironmentConfig::blank("dev");
        let result = validate(&manifest, &platform, &env, "eu-west-1", SecretsStrategy::Opaque, None);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn undeclared_reference_fails() {
        let mut manifest = manifest_with_name("checkout");
        manifest.services[0].env = btreemap! { "DB_HOST".to_string() => "@resource(postgres).host".to_string() };
        let platform = PlatformConfig::default();
        let env = EnvironmentConfig::blank("dev");
        let result = validate(&manifest, &platform, &env, "eu-west-1", SecretsStrategy::Opaque, None);
        assert!(!result.is_valid);
    }
}
