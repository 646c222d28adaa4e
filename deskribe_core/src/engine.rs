//! The four entry points (`validate`, `plan`, `apply`, `destroy`) and the
//! state machine that sequences the pipeline (spec.md §4.6).
//!
//! ```text
//! Loaded -> Merged -> Validated -> Planned -> InfraApplied -> Resolved -> RuntimeApplied -> Done
//!        \_ any step may transition to Failed; remaining steps are skipped
//! ```
//!
//! Grounded on `shipcat_definitions::states::ManifestType`'s explicit
//! state-enum pattern, generalized from a compile-time type tag to a
//! runtime value since the pipeline here branches on I/O outcomes rather
//! than on which CLI subcommand ran.

use std::collections::BTreeMap;
use std::path::Path;

use crate::adapters::{PlanContext, ValidateContext};
use crate::cancel::CancelToken;
use crate::model::{DeskribePlan, EnvironmentConfig, PlatformConfig, Resource, ValidationResult};
use crate::registry::Registry;
use crate::{merge_engine, policy, reference, Error, ErrorKind, Result};

/// Platform backend keys overridden per environment (spec.md §4.6's "Apply
/// uses the environment's backend override, not the platform's").
fn effective_backends(platform: &PlatformConfig, environment: &EnvironmentConfig) -> BTreeMap<String, String> {
    let mut backends = platform.backends.clone();
    backends.extend(environment.backends.clone());
    backends
}

/// Snapshot of where a single command currently is in the pipeline.
/// Exposed for diagnostics and logging; the engine itself just threads
/// ordinary `Result`s and doesn't hold this across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    Merged,
    Validated,
    Planned,
    InfraApplied,
    Resolved,
    RuntimeApplied,
    Done,
    Failed,
}

/// `Validate(manifestPath, platformPath, env)` (spec.md §4.6).
pub fn validate(
    registry: &Registry,
    manifest_path: &Path,
    platform_path: &Path,
    environment: &str,
) -> Result<ValidationResult> {
    let loaded = crate::loader::load(manifest_path, platform_path, environment)?;
    debug!("loaded manifest '{}' for environment '{}'", loaded.manifest.name, environment);

    let region = merge_engine::merged_region(&loaded.platform, &loaded.environment);
    let secrets_strategy = loaded
        .environment
        .defaults
        .secrets_strategy
        .unwrap_or(loaded.platform.defaults.secrets_strategy);
    let external_secrets_store = loaded
        .environment
        .defaults
        .external_secrets_store
        .clone()
        .or_else(|| loaded.platform.defaults.external_secrets_store.clone());

    let mut result = policy::validate(
        &loaded.manifest,
        &loaded.platform,
        &loaded.environment,
        &region,
        secrets_strategy,
        external_secrets_store.as_deref(),
    );
    for warning in loaded.warnings {
        result.push_warning(warning);
    }

    if !result.is_valid {
        info!("validation failed for '{}': {} error(s)", loaded.manifest.name, result.errors.len());
        return Ok(result);
    }

    let declared: Vec<&str> = loaded.manifest.resource_types();
    if let Some(service) = loaded.manifest.primary_service() {
        result.merge_in(reference::validate_declared(&service.env, &declared));
    }

    let ctx = ValidateContext {
        platform: &loaded.platform,
        environment,
    };
    let backends = effective_backends(&loaded.platform, &loaded.environment);
    for resource in &loaded.manifest.resources {
        match registry.resource_provider(resource.resource_type()) {
            None => result.push_error(ErrorKind::NoProvider(resource.resource_type().to_string()).to_string()),
            Some(provider) => {
                let provider_result = provider.validate(resource, &ctx);
                for warning in provider_result.warnings {
                    result.push_warning(warning);
                }
                for error in provider_result.errors {
                    result.push_error(
                        ErrorKind::ProviderValidation(resource.resource_type().to_string(), error).to_string(),
                    );
                }
            }
        }
        if let Resource::KafkaMessaging(topics) = resource {
            if let Some(messaging) = backends.get(resource.resource_type()).and_then(|name| registry.messaging_provider(name)) {
                result.merge_in(messaging.validate_topics(topics));
            }
        }
    }

    info!(
        "validated '{}' for '{}': {} error(s), {} warning(s)",
        loaded.manifest.name,
        environment,
        result.errors.len(),
        result.warnings.len()
    );
    Ok(result)
}

/// `Plan(manifestPath, platformPath, env, images?)` (spec.md §4.6). Planning
/// is a pure projection: it never contacts an external system.
pub fn plan(
    registry: &Registry,
    manifest_path: &Path,
    platform_path: &Path,
    environment: &str,
    images: &BTreeMap<String, String>,
) -> Result<DeskribePlan> {
    let loaded = crate::loader::load(manifest_path, platform_path, environment)?;

    let workload = merge_engine::merge(
        &loaded.manifest,
        &loaded.platform,
        &loaded.environment,
        environment,
        images,
    );

    let mut warnings = loaded.warnings;
    let ctx = PlanContext {
        platform: &loaded.platform,
        environment_config: &loaded.environment,
        environment,
        app_name: &loaded.manifest.name,
    };

    let backends = effective_backends(&loaded.platform, &loaded.environment);
    let mut resource_plans = Vec::with_capacity(loaded.manifest.resources.len());
    for resource in &loaded.manifest.resources {
        match registry.resource_provider(resource.resource_type()) {
            None => warnings.push(format!(
                "no resource provider registered for type '{}'; skipped in plan",
                resource.resource_type()
            )),
            Some(provider) => {
                let mut resource_plan = provider.plan(resource, &ctx);
                if let Resource::KafkaMessaging(topics) = resource {
                    if let Some(messaging) = backends.get(resource.resource_type()).and_then(|name| registry.messaging_provider(name)) {
                        let acls = messaging.plan_acls(topics);
                        if !acls.is_empty() {
                            resource_plan.configuration.insert("acls".to_string(), serde_json::Value::from(acls));
                        }
                    }
                }
                resource_plans.push(resource_plan);
            }
        }
    }

    info!(
        "planned '{}' for '{}': {} resource(s), {} warning(s)",
        loaded.manifest.name,
        environment,
        resource_plans.len(),
        warnings.len()
    );

    Ok(DeskribePlan {
        app_name: loaded.manifest.name,
        environment: environment.to_string(),
        platform: loaded.platform,
        environment_config: loaded.environment,
        resource_plans,
        workload: Some(workload),
        warnings,
    })
}

/// `Apply(plan)` (spec.md §4.6). Infra apply is sequential and short-circuits
/// on the first backend failure; runtime apply only ever observes a plan
/// whose infra phase fully succeeded (I6).
pub async fn apply(registry: &Registry, deskribe_plan: &DeskribePlan, cancel: &CancelToken) -> Result<()> {
    let effective_backends = effective_backends(&deskribe_plan.platform, &deskribe_plan.environment_config);

    let mut resource_outputs: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for resource_plan in &deskribe_plan.resource_plans {
        let backend_name = effective_backends.get(&resource_plan.resource_type).ok_or_else(|| {
            Error::from(ErrorKind::NoProvider(resource_plan.resource_type.clone()))
        })?;
        let backend = registry.backend_adapter(backend_name).ok_or_else(|| {
            Error::from(ErrorKind::NoProvider(backend_name.clone()))
        })?;

        if cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled("apply".into()).into());
        }

        let outcome = backend.apply(&resource_plan.resource, resource_plan, cancel).await?;
        if !outcome.success {
            return Err(ErrorKind::BackendApplyFailed(
                resource_plan.resource_type.clone(),
                outcome.errors.join("; "),
            )
            .into());
        }
        for (ty, props) in outcome.resource_outputs {
            resource_outputs.entry(ty).or_default().extend(props);
        }
    }

    let workload = match &deskribe_plan.workload {
        Some(w) => w,
        None => return Ok(()),
    };

    let (resolved_env, resolve_warnings) = reference::resolve_env(&workload.environment_variables, &resource_outputs);
    for warning in &resolve_warnings {
        warn!("{}", warning);
    }

    let mut resolved_workload = workload.clone();
    resolved_workload.environment_variables = resolved_env;

    match registry.runtime_adapter(&deskribe_plan.platform.defaults.runtime) {
        None => {
            warn!(
                "no runtime adapter registered for '{}'; skipping workload deploy",
                deskribe_plan.platform.defaults.runtime
            );
            Ok(())
        }
        Some(runtime) => {
            if cancel.is_cancelled() {
                return Err(ErrorKind::Cancelled("apply".into()).into());
            }
            let manifest = runtime.render(&resolved_workload);
            runtime.apply(&manifest, cancel).await?;
            info!("runtime apply complete for '{}'", deskribe_plan.app_name);
            Ok(())
        }
    }
}

/// `Destroy(manifestPath, platformPath, env)` (spec.md §4.6). Reverses the
/// deploy order: runtime first, then infra. Backend destroy errors are
/// logged and swallowed so one failing resource does not block teardown of
/// the rest.
pub async fn destroy(
    registry: &Registry,
    manifest_path: &Path,
    platform_path: &Path,
    environment: &str,
    cancel: &CancelToken,
) -> Result<()> {
    let loaded = crate::loader::load(manifest_path, platform_path, environment)?;
    let namespace = loaded
        .platform
        .defaults
        .namespace_pattern
        .replace("{app}", &loaded.manifest.name)
        .replace("{env}", environment);

    if let Some(runtime) = registry.runtime_adapter(&loaded.platform.defaults.runtime) {
        if let Err(e) = runtime.destroy(&namespace, cancel).await {
            warn!("runtime destroy failed for namespace '{}': {}", namespace, e);
        }
    } else {
        warn!("no runtime adapter registered for '{}'; skipping runtime destroy", loaded.platform.defaults.runtime);
    }

    for (resource_type, backend_name) in &loaded.platform.backends {
        let backend = match registry.backend_adapter(backend_name) {
            Some(b) => b,
            None => {
                warn!("no backend adapter registered for '{}'; skipping destroy of '{}'", backend_name, resource_type);
                continue;
            }
        };
        if let Err(e) = backend
            .destroy(&loaded.manifest.name, environment, &loaded.platform, cancel)
            .await
        {
            warn!("backend destroy failed for resource type '{}' via '{}': {}", resource_type, backend_name, e);
        }
    }

    info!("destroy complete for '{}' in '{}'", loaded.manifest.name, environment);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{BackendAdapter, RuntimeAdapter};
    use crate::model::{BackendApplyResult, DeskribePlan, PlanAction, PlatformConfig, Resource, ResourcePlanResult, WorkloadManifest, WorkloadPlan};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeBackend {
        outputs: BTreeMap<String, String>,
        fail: bool,
    }

    #[async_trait]
    impl BackendAdapter for FakeBackend {
        fn name(&self) -> &str {
            "fake-backend"
        }

        async fn apply(
            &self,
            _resource: &Resource,
            plan: &ResourcePlanResult,
            _cancel: &CancelToken,
        ) -> Result<BackendApplyResult> {
            if self.fail {
                return Ok(BackendApplyResult {
                    success: false,
                    resource_outputs: BTreeMap::new(),
                    errors: vec!["simulated failure".into()],
                });
            }
            let mut resource_outputs = BTreeMap::new();
            resource_outputs.insert(plan.resource_type.clone(), self.outputs.clone());
            Ok(BackendApplyResult {
                success: true,
                resource_outputs,
                errors: vec![],
            })
        }

        async fn destroy(&self, _app_name: &str, _environment: &str, _platform: &PlatformConfig, _cancel: &CancelToken) -> Result<()> {
            Ok(())
        }
    }

    struct FakeRuntime {
        applied: Mutex<Vec<String>>,
    }

    impl FakeRuntime {
        fn new() -> Self {
            FakeRuntime { applied: Mutex::new(vec![]) }
        }
    }

    #[async_trait]
    impl RuntimeAdapter for FakeRuntime {
        fn name(&self) -> &str {
            "fake-runtime"
        }

        fn render(&self, workload: &WorkloadPlan) -> WorkloadManifest {
            WorkloadManifest {
                namespace: workload.namespace.clone(),
                yaml: format!("namespace: {}", workload.namespace),
                resource_names: vec![workload.app_name.clone()],
            }
        }

        async fn apply(&self, manifest: &WorkloadManifest, _cancel: &CancelToken) -> Result<()> {
            self.applied.lock().unwrap().push(manifest.namespace.clone());
            Ok(())
        }

        async fn destroy(&self, _namespace: &str, _cancel: &CancelToken) -> Result<()> {
            Ok(())
        }
    }

    fn sample_plan() -> DeskribePlan {
        let mut platform = PlatformConfig::default();
        platform.defaults.runtime = "fake-runtime".into();
        platform.backends.insert("postgres".to_string(), "fake-backend".to_string());

        let mut env_vars = BTreeMap::new();
        env_vars.insert("DB_HOST".to_string(), "@resource(postgres).host".to_string());

        DeskribePlan {
            app_name: "checkout".into(),
            environment: "dev".into(),
            environment_config: crate::model::EnvironmentConfig::blank("dev"),
            resource_plans: vec![ResourcePlanResult {
                resource: Resource::Postgres(Default::default()),
                resource_type: "postgres".into(),
                action: PlanAction::Create,
                planned_outputs: BTreeMap::new(),
                configuration: BTreeMap::new(),
            }],
            workload: Some(WorkloadPlan {
                app_name: "checkout".into(),
                environment: "dev".into(),
                namespace: "checkout-dev".into(),
                image: None,
                replicas: 1,
                cpu: "100m".into(),
                memory: "128Mi".into(),
                environment_variables: env_vars,
                secrets_strategy: crate::model::SecretsStrategy::Opaque,
                external_secrets_store: None,
            }),
            warnings: vec![],
            platform,
        }
    }

    #[tokio::test]
    async fn apply_resolves_references_and_deploys_runtime() {
        let mut registry = Registry::new();
        let mut host_output = BTreeMap::new();
        host_output.insert("host".to_string(), "db.internal".to_string());
        registry.register_backend_adapter(std::sync::Arc::new(FakeBackend {
            outputs: host_output,
            fail: false,
        }));
        let runtime = std::sync::Arc::new(FakeRuntime::new());
        registry.register_runtime_adapter(runtime.clone());

        let plan = sample_plan();
        let cancel = CancelToken::new();
        apply(&registry, &plan, &cancel).await.unwrap();
        assert_eq!(runtime.applied.lock().unwrap().as_slice(), ["checkout-dev"]);
    }

    #[tokio::test]
    async fn apply_aborts_before_runtime_on_backend_failure() {
        let mut registry = Registry::new();
        registry.register_backend_adapter(std::sync::Arc::new(FakeBackend {
            outputs: BTreeMap::new(),
            fail: true,
        }));
        let runtime = std::sync::Arc::new(FakeRuntime::new());
        registry.register_runtime_adapter(runtime.clone());

        let plan = sample_plan();
        let cancel = CancelToken::new();
        let err = apply(&registry, &plan, &cancel).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::BackendApplyFailed(_, _)));
    }

    #[tokio::test]
    async fn apply_without_registered_runtime_warns_and_succeeds() {
        let mut registry = Registry::new();
        let mut host_output = BTreeMap::new();
        host_output.insert("host".to_string(), "db.internal".to_string());
        registry.register_backend_adapter(std::sync::Arc::new(FakeBackend {
            outputs: host_output,
            fail: false,
        }));

        let plan = sample_plan();
        let cancel = CancelToken::new();
        apply(&registry, &plan, &cancel).await.unwrap();
    }
}
