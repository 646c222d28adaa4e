//! In-memory, no-op adapter implementations: no real backend or runtime is
//! contacted, every operation returns deterministic canned data.
//!
//! Grounded on `shipcat_definitions::vault::Vault`'s `Mode::Mocked`: rather
//! than a HTTP round trip, a mocked call returns a fixed, harmless value
//! (`"aGVsbG8gd29ybGQ="`) so callers exercising the rest of the pipeline
//! don't need live infrastructure. The same idea generalizes here to all
//! four adapter kinds, useful for local trials of the CLI and for the
//! integration tests in `deskribe_core`.

#[macro_use]
extern crate log;

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;

use deskribe_core::adapters::{
    BackendAdapter, MessagingProvider, PlanContext, ResourceProvider, RuntimeAdapter,
    ValidateContext,
};
use deskribe_core::cancel::CancelToken;
use deskribe_core::model::{
    BackendApplyResult, KafkaMessagingResource, PlanAction, PlatformConfig, Resource,
    ResourcePlanResult, ValidationResult, WorkloadManifest, WorkloadPlan,
};
use deskribe_core::Result;

/// Optional artificial latency for demo backend/runtime applies, read once
/// per call from `DESKRIBE_DEMO_LATENCY_MS`. Absent or unparsable means no
/// delay. This is the only environment read anywhere in the demo adapters
/// or core (see SPEC_FULL.md §10.4).
fn demo_latency() -> Duration {
    env::var("DESKRIBE_DEMO_LATENCY_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_default()
}

/// Accepts any resource of its declared type; plans a `Create` with a
/// single mock output keyed `host`.
pub struct DemoResourceProvider {
    resource_type: String,
}

impl DemoResourceProvider {
    pub fn new(resource_type: impl Into<String>) -> Self {
        DemoResourceProvider { resource_type: resource_type.into() }
    }
}

impl ResourceProvider for DemoResourceProvider {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn validate(&self, resource: &Resource, _ctx: &ValidateContext) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if let Resource::KafkaMessaging(kafka) = resource {
            for topic in &kafka.topics {
                if topic.name.trim().is_empty() {
                    result.push_error("kafka.messaging topic must have a non-blank name");
                }
            }
        }
        result
    }

    fn plan(&self, resource: &Resource, _ctx: &PlanContext) -> ResourcePlanResult {
        let mut planned_outputs = BTreeMap::new();
        planned_outputs.insert(
            "host".to_string(),
            format!("{}.mock.internal", self.resource_type),
        );
        ResourcePlanResult {
            resource: resource.clone(),
            resource_type: self.resource_type.clone(),
            action: PlanAction::Create,
            planned_outputs,
            configuration: BTreeMap::new(),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Returns a fixed output map per resource type instead of provisioning
/// anything. Never fails.
pub struct DemoBackendAdapter {
    name: String,
}

impl DemoBackendAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        DemoBackendAdapter { name: name.into() }
    }
}

#[async_trait]
impl BackendAdapter for DemoBackendAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(
        &self,
        resource: &Resource,
        plan: &ResourcePlanResult,
        cancel: &CancelToken,
    ) -> Result<BackendApplyResult> {
        let latency = demo_latency();
        if !latency.is_zero() {
            tokio::time::delay_for(latency).await;
        }
        if cancel.is_cancelled() {
            return Err(deskribe_core::ErrorKind::Cancelled(format!("{}::apply", self.name)).into());
        }

        debug!("demo backend '{}' applying resource type '{}'", self.name, plan.resource_type);
        let mut outputs = BTreeMap::new();
        outputs.insert("host".to_string(), format!("{}.mock.internal", plan.resource_type));
        outputs.insert("port".to_string(), "5432".to_string());
        if let Resource::Postgres(pg) = resource {
            if let Some(ver) = &pg.version {
                outputs.insert("version".to_string(), ver.clone());
            }
        }
        let mut resource_outputs = BTreeMap::new();
        resource_outputs.insert(plan.resource_type.clone(), outputs);

        Ok(BackendApplyResult {
            success: true,
            resource_outputs,
            errors: vec![],
        })
    }

    async fn destroy(
        &self,
        app_name: &str,
        environment: &str,
        _platform: &PlatformConfig,
        _cancel: &CancelToken,
    ) -> Result<()> {
        info!("demo backend '{}' destroying resources for '{}' in '{}'", self.name, app_name, environment);
        Ok(())
    }
}

/// Renders a trivial textual manifest and logs the apply/destroy instead of
/// contacting a real cluster.
pub struct DemoRuntimeAdapter {
    name: String,
}

impl DemoRuntimeAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        DemoRuntimeAdapter { name: name.into() }
    }
}

#[async_trait]
impl RuntimeAdapter for DemoRuntimeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, workload: &WorkloadPlan) -> WorkloadManifest {
        let yaml = format!(
            "namespace: {}\napp: {}\nreplicas: {}\ncpu: {}\nmemory: {}\n",
            workload.namespace, workload.app_name, workload.replicas, workload.cpu, workload.memory
        );
        WorkloadManifest {
            namespace: workload.namespace.clone(),
            yaml,
            resource_names: vec![format!("{}-deployment", workload.app_name)],
        }
    }

    async fn apply(&self, manifest: &WorkloadManifest, cancel: &CancelToken) -> Result<()> {
        let latency = demo_latency();
        if !latency.is_zero() {
            tokio::time::delay_for(latency).await;
        }
        if cancel.is_cancelled() {
            return Err(deskribe_core::ErrorKind::Cancelled(format!("{}::apply", self.name)).into());
        }
        info!("demo runtime '{}' applied manifest for namespace '{}'", self.name, manifest.namespace);
        Ok(())
    }

    async fn destroy(&self, namespace: &str, _cancel: &CancelToken) -> Result<()> {
        info!("demo runtime '{}' destroyed namespace '{}'", self.name, namespace);
        Ok(())
    }
}

/// Accepts every topic unconditionally; used as the default messaging
/// provider for `kafka.messaging` resources.
pub struct DemoMessagingProvider {
    provider_type: String,
}

impl DemoMessagingProvider {
    pub fn new(provider_type: impl Into<String>) -> Self {
        DemoMessagingProvider { provider_type: provider_type.into() }
    }
}

impl MessagingProvider for DemoMessagingProvider {
    fn provider_type(&self) -> &str {
        &self.provider_type
    }

    fn validate_topics(&self, resource: &KafkaMessagingResource) -> ValidationResult {
        let mut result = ValidationResult::ok();
        for topic in &resource.topics {
            match topic.partitions {
                Some(0) => result.push_error(format!("topic '{}' must declare at least 1 partition", topic.name)),
                None => result.push_warning(format!("topic '{}' has no explicit partition count; backend default will apply", topic.name)),
                _ => {}
            }
        }
        result
    }
}
