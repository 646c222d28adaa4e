//! The four pluggable adapter contracts the engine dispatches to.
//!
//! Grounded on `shipcat_definitions::traits::Backend`: a small trait per
//! concern, object-safe, registered by string key in [`crate::registry`].
//! Async methods use `async-trait` since the engine dispatches to adapters
//! concurrently with file I/O (the teacher only ever needed concrete
//! `async fn`s, never async trait methods, so this is new relative to it);
//! cancellation is cooperative via [`crate::cancel::CancelToken`] rather
//! than an imposed timeout (spec.md §5).

use crate::cancel::CancelToken;
use crate::model::{
    BackendApplyResult, KafkaMessagingResource, PlatformConfig, Resource, ResourcePlanResult,
    ValidationResult, WorkloadManifest, WorkloadPlan,
};
use crate::Result;
use async_trait::async_trait;

/// Context a [`ResourceProvider`] needs to validate one resource: the
/// platform config and the environment name, exactly the inputs spec.md
/// §4.7 names (`{platform, env}`).
pub struct ValidateContext<'a> {
    pub platform: &'a PlatformConfig,
    pub environment: &'a str,
}

/// Context a [`ResourceProvider`] needs to plan one resource.
pub struct PlanContext<'a> {
    pub platform: &'a PlatformConfig,
    pub environment_config: &'a crate::model::EnvironmentConfig,
    pub environment: &'a str,
    pub app_name: &'a str,
}

/// Validates and plans a single declared resource type (spec.md §4.7).
/// Both operations are pure: no I/O, deterministic for identical inputs.
pub trait ResourceProvider: Send + Sync {
    /// The `type` tag this provider handles, e.g. `"postgres"`.
    fn resource_type(&self) -> &str;

    /// Provider-specific constraints the core data model can't express.
    fn validate(&self, resource: &Resource, ctx: &ValidateContext) -> ValidationResult;

    /// Projects a resource into a planned action and provider-specific
    /// configuration, without contacting any external system.
    fn plan(&self, resource: &Resource, ctx: &PlanContext) -> ResourcePlanResult;

    /// Downcast support for callers (tests, diagnostics) that need to
    /// recover the concrete provider behind a registry lookup.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Provisions (or destroys) the infrastructure for one declared resource
/// through one backend, e.g. a specific IaC tool or cloud API.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// The backend key used in `platform.backends`, e.g. `"pulumi"`.
    fn name(&self) -> &str;

    /// Apply a single resource's plan (spec.md §4.6 step "InfraApplied").
    /// The engine calls this once per resource, in declared order, and
    /// aborts the command on the first failure.
    async fn apply(
        &self,
        resource: &Resource,
        plan: &ResourcePlanResult,
        cancel: &CancelToken,
    ) -> Result<BackendApplyResult>;

    /// Best-effort, idempotent teardown of everything this backend owns
    /// for `app_name` in `environment`. Errors are logged and swallowed by
    /// the engine, not propagated.
    async fn destroy(
        &self,
        app_name: &str,
        environment: &str,
        platform: &PlatformConfig,
        cancel: &CancelToken,
    ) -> Result<()>;
}

/// Deploys a resolved workload into a target runtime, e.g. a container
/// orchestrator. Absence of a registered runtime adapter for
/// `platform.defaults.runtime` is a warning, not a hard error.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// The runtime key used in `platform.defaults.runtime`, e.g.
    /// `"kubernetes"`.
    fn name(&self) -> &str;

    /// Pure transformation of a reference-resolved [`WorkloadPlan`] into a
    /// deployable artifact description.
    fn render(&self, workload: &WorkloadPlan) -> WorkloadManifest;

    /// Create-or-update apply; idempotent on repeated calls with the same
    /// manifest.
    async fn apply(&self, manifest: &WorkloadManifest, cancel: &CancelToken) -> Result<()>;

    /// Idempotent teardown of whatever `apply` created for `namespace`.
    async fn destroy(&self, namespace: &str, cancel: &CancelToken) -> Result<()>;
}

/// Parallel to [`ResourceProvider`], specialized for `kafka.messaging`
/// resources: additional policy checks (minimum partition counts) and ACL
/// planning that a flat key-value output map can't express.
pub trait MessagingProvider: Send + Sync {
    /// The messaging backend key, e.g. `"kafka"`.
    fn provider_type(&self) -> &str;

    /// Topic-specific checks beyond what the core schema enforces, e.g. a
    /// minimum partition count or a required owners list.
    fn validate_topics(&self, resource: &KafkaMessagingResource) -> ValidationResult;

    /// One ACL planning line per (topic, consumer) pair, in declared order.
    fn plan_acls(&self, resource: &KafkaMessagingResource) -> Vec<String> {
        let mut acls = Vec::new();
        for topic in &resource.topics {
            for consumer in &topic.consumers {
                acls.push(format!("grant READ on topic '{}' to '{}'", topic.name, consumer));
            }
            for owner in &topic.owners {
                acls.push(format!("grant WRITE on topic '{}' to '{}'", topic.name, owner));
            }
        }
        acls
    }
}
