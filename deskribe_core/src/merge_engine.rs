//! Layered-overwrite merge of platform defaults, environment overlay and
//! per-environment developer overrides into a [`WorkloadPlan`] (spec.md
//! §4.5).
//!
//! Grounded on `shipcat_filebacked`'s defaults-then-overrides merge chain
//! (`ManifestDefaults::merge(ManifestOverrides)`), but expressed through
//! the `merge` crate's `Option<T>` "present wins" semantics instead of
//! sentinel/zero-value comparisons — the spec's own closing note on tie-break
//! policy recommends exactly this ("An implementer should adopt an explicit
//! 'unset' representation... rather than sentinel literals").
//!
//! `runtime` and `namespace_pattern` are platform-only: they are read from
//! `platform.defaults` and never overridden by the environment overlay or a
//! per-environment service override, matching the spec's explicit
//! "platform-only" fields (`runtime`, `namespacePattern`, `backends`,
//! `secretsStrategy`'s *routing*, `policies`) and I5 (`namespace` is always
//! derived from `platform.namespacePattern`).

use crate::model::{EnvironmentConfig, Manifest, PartialDefaults, PlatformConfig, WorkloadPlan};
use merge::Merge;
use std::collections::BTreeMap;

/// Produces the environment-specialized [`WorkloadPlan`] for the
/// manifest's primary service (spec.md §9 Open Question 1: only
/// `services[0]` is processed; additional services are ignored).
///
/// `images` is the caller-supplied `serviceName -> image` mapping (the
/// `images?` parameter on `Plan` in spec.md §6); absent entries leave
/// `image` unset.
pub fn merge(
    manifest: &Manifest,
    platform: &PlatformConfig,
    environment_config: &EnvironmentConfig,
    environment: &str,
    images: &BTreeMap<String, String>,
) -> WorkloadPlan {
    let defaults = &platform.defaults;

    // The platform's concrete defaults, lifted into `PartialDefaults` so the
    // overlay and developer override can be folded in with the same
    // "present wins" `Merge` the rest of the workspace uses for layered
    // config. `runtime`/`namespace_pattern` are platform-only (I5) and are
    // deliberately left unset here and stripped from the overlay below, so
    // they can never be won away from the platform's own value.
    let seed = PartialDefaults {
        runtime: None,
        region: Some(defaults.region.clone()),
        replicas: Some(defaults.replicas),
        cpu: Some(defaults.cpu.clone()),
        memory: Some(defaults.memory.clone()),
        namespace_pattern: None,
        ha: defaults.ha,
        secrets_strategy: Some(defaults.secrets_strategy),
        external_secrets_store: defaults.external_secrets_store.clone(),
    };

    let mut environment_overlay = environment_config.defaults.clone();
    environment_overlay.runtime = None;
    environment_overlay.namespace_pattern = None;

    let mut merged = seed.merge(environment_overlay);

    let service = manifest.primary_service();
    if let Some(svc) = service {
        if let Some(ov) = svc.overrides.get(environment) {
            let developer_override = PartialDefaults {
                replicas: ov.replicas,
                cpu: ov.cpu.clone(),
                memory: ov.memory.clone(),
                ..PartialDefaults::default()
            };
            merged = merged.merge(developer_override);
        }
    }

    let namespace = defaults
        .namespace_pattern
        .replace("{app}", &manifest.name)
        .replace("{env}", environment);

    let image = service.and_then(|svc| images.get(svc.image_lookup_key()).cloned());

    let environment_variables = service.map(|svc| svc.env.clone()).unwrap_or_default();

    WorkloadPlan {
        app_name: manifest.name.clone(),
        environment: environment.to_string(),
        namespace,
        image,
        replicas: merged.replicas.unwrap_or(defaults.replicas),
        cpu: merged.cpu.unwrap_or_else(|| defaults.cpu.clone()),
        memory: merged.memory.unwrap_or_else(|| defaults.memory.clone()),
        environment_variables,
        secrets_strategy: merged.secrets_strategy.unwrap_or(defaults.secrets_strategy),
        external_secrets_store: merged.external_secrets_store,
    }
}

/// The merged region, used by the Policy Validator's `allowedRegions`
/// check (spec.md §4.4). Kept separate from [`WorkloadPlan`] since region
/// does not flow into the runtime deploy, only into policy.
pub fn merged_region(platform: &PlatformConfig, environment_config: &EnvironmentConfig) -> String {
    environment_config
        .defaults
        .region
        .clone()
        .unwrap_or_else(|| platform.defaults.region.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PartialDefaults, PlatformDefaults, SecretsStrategy, Service, ServiceOverride};
    use maplit::btreemap;

    fn manifest(name: &str) -> Manifest {
        Manifest {
            name: name.to_string(),
            resources: vec![],
            services: vec![Service {
                name: None,
                env: btreemap! { "PORT".to_string() => "8080".to_string() },
                overrides: BTreeMap::new(),
            }],
        }
    }

    fn platform() -> PlatformConfig {
        let mut p = PlatformConfig::default();
        p.defaults = PlatformDefaults {
            runtime: "kubernetes".into(),
            region: "eu-west-1".into(),
            replicas: 2,
            cpu: "250m".into(),
            memory: "512Mi".into(),
            namespace_pattern: "{app}-{env}".into(),
            ha: None,
            secrets_strategy: SecretsStrategy::Opaque,
            external_secrets_store: None,
        };
        p
    }

    #[test]
    fn namespace_is_expanded_from_platform_pattern() {
        let m = manifest("checkout");
        let p = platform();
        let env = EnvironmentConfig::blank("dev");
        let plan = merge(&m, &p, &env, "dev", &BTreeMap::new());
        assert_eq!(plan.namespace, "checkout-dev");
    }

    #[test]
    fn platform_defaults_are_used_when_no_overlay() {
        let m = manifest("checkout");
        let p = platform();
        let env = EnvironmentConfig::blank("dev");
        let plan = merge(&m, &p, &env, "dev", &BTreeMap::new());
        assert_eq!(plan.replicas, 2);
        assert_eq!(plan.cpu, "250m");
    }

    #[test]
    fn environment_overlay_overrides_platform_defaults() {
        let m = manifest("checkout");
        let p = platform();
        let mut env = EnvironmentConfig::blank("prod");
        env.defaults = PartialDefaults {
            replicas: Some(5),
            ..PartialDefaults::default()
        };
        let plan = merge(&m, &p, &env, "prod", &BTreeMap::new());
        assert_eq!(plan.replicas, 5);
        assert_eq!(plan.cpu, "250m");
    }

    #[test]
    fn developer_override_wins_over_environment_and_platform() {
        let mut m = manifest("checkout");
        m.services[0].overrides.insert(
            "prod".to_string(),
            ServiceOverride {
                replicas: Some(9),
                cpu: None,
                memory: None,
            },
        );
        let p = platform();
        let mut env = EnvironmentConfig::blank("prod");
        env.defaults = PartialDefaults {
            replicas: Some(5),
            ..PartialDefaults::default()
        };
        let plan = merge(&m, &p, &env, "prod", &BTreeMap::new());
        assert_eq!(plan.replicas, 9);
    }

    #[test]
    fn image_falls_back_to_api_lookup_key_when_service_unnamed() {
        let m = manifest("checkout");
        let p = platform();
        let env = EnvironmentConfig::blank("dev");
        let images = btreemap! { "api".to_string() => "registry/checkout:1.2.3".to_string() };
        let plan = merge(&m, &p, &env, "dev", &images);
        assert_eq!(plan.image.as_deref(), Some("registry/checkout:1.2.3"));
    }

    #[test]
    fn merged_region_prefers_environment_overlay() {
        let p = platform();
        let mut env = EnvironmentConfig::blank("prod");
        env.defaults = PartialDefaults {
            region: Some("us-east-1".into()),
            ..PartialDefaults::default()
        };
        assert_eq!(merged_region(&p, &env), "us-east-1");
    }

    #[test]
    fn merged_region_falls_back_to_platform() {
        let p = platform();
        let env = EnvironmentConfig::blank("dev");
        assert_eq!(merged_region(&p, &env), "eu-west-1");
    }
}
