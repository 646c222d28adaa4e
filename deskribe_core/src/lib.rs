#![allow(non_snake_case)]

//! The Manifest Orchestration Engine: loads a developer manifest and a
//! platform configuration, merges them into a concrete workload plan,
//! validates the result, and drives the four-phase pipeline
//! (Validate -> Plan -> Apply -> Destroy) against pluggable backend and
//! runtime adapters.
//!
//! This crate owns no infrastructure state and performs no I/O of its own
//! beyond reading the three on-disk JSON documents it is pointed at; all
//! provisioning and deployment happens through the adapters in
//! [`adapters`], which are supplied by the caller.

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate merge_derive;

#[macro_use]
extern crate log;

#[macro_use]
extern crate error_chain;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Io(::std::io::Error);
        SerdeJ(::serde_json::Error);
        Regex(::regex::Error);
    }
    errors {
        /// A required on-disk document is missing.
        ConfigMissing(path: String) {
            description("required configuration file is missing")
            display("required configuration file is missing: {}", path)
        }
        /// A document exists but is not valid JSON.
        ConfigParse(path: String, reason: String) {
            description("configuration file failed to parse")
            display("configuration file {} failed to parse: {}", path, reason)
        }
        /// A document parsed as JSON but is missing a required field.
        ConfigSchema(path: String, reason: String) {
            description("configuration file does not match the expected schema")
            display("configuration file {} does not match the expected schema: {}", path, reason)
        }
        /// A resource's `type` tag does not match any known variant.
        UnknownResourceType(ty: String, path: String) {
            description("unknown resource type")
            display("unknown resource type '{}' in {}", ty, path)
        }
        /// The manifest's `name` is unset or blank.
        PolicyMissingName {
            description("manifest name is missing")
            display("manifest 'name' must be set and non-blank")
        }
        /// A reference expression names a resource type not declared by the manifest.
        ReferenceUnknownType(env_var: String, ty: String) {
            description("reference names an undeclared resource type")
            display("env var '{}' references undeclared resource type '{}'", env_var, ty)
        }
        /// No Resource Provider is registered for a declared resource type.
        NoProvider(ty: String) {
            description("no resource provider registered for type")
            display("no resource provider registered for type '{}'", ty)
        }
        /// A Backend Adapter's `Apply` returned failure.
        BackendApplyFailed(ty: String, errors: String) {
            description("backend apply failed")
            display("backend apply failed for resource type '{}': {}", ty, errors)
        }
        /// The merged region is not in the platform's allowed-regions policy.
        PolicyRegionNotAllowed(region: String) {
            description("region is not in the allowed regions policy")
            display("region '{}' is not in the allowed regions policy", region)
        }
        /// `secretsStrategy` is `external-secrets` but no store was configured.
        PolicyMissingSecretsStore {
            description("external-secrets strategy requires externalSecretsStore")
            display("secretsStrategy is 'external-secrets' but externalSecretsStore is not set")
        }
        /// A Resource Provider rejected a resource during validation.
        ProviderValidation(ty: String, reason: String) {
            description("resource provider validation failed")
            display("resource provider for '{}' rejected the resource: {}", ty, reason)
        }
        /// The caller cancelled an in-flight I/O-bound operation.
        Cancelled(op: String) {
            description("operation was cancelled")
            display("operation '{}' was cancelled", op)
        }
        /// `validate` completed but the manifest does not pass.
        ManifestInvalid(errors: String) {
            description("manifest does not validate")
            display("manifest does not validate: {}", errors)
        }
    }
}

/// Value records shared across every phase: Manifest, Resource, Service,
/// PlatformConfig, EnvironmentConfig, WorkloadPlan, ResourcePlanResult,
/// DeskribePlan and friends.
pub mod model;

/// Reads the three on-disk JSON documents into typed, immutable records.
pub mod loader;

/// Process-wide registry of the four adapter kinds.
pub mod registry;

/// `@resource(<type>).<property>` expression grammar: extract, validate,
/// resolve.
pub mod reference;

/// Static policy checks on the merged configuration.
pub mod policy;

/// Layered-overwrite merge of platform defaults, environment overlay and
/// developer per-env overrides into a WorkloadPlan.
pub mod merge_engine;

/// The four adapter contracts the engine dispatches to.
pub mod adapters;

/// The four entry points (Validate, Plan, Apply, Destroy) and the state
/// machine that sequences them.
pub mod engine;

/// Cancellation token threaded through every adapter boundary.
pub mod cancel;

pub use model::{
    BackendApplyResult, DeskribePlan, EnvironmentConfig, Manifest, PlatformConfig, Resource,
    ResourcePlanResult, Service, ServiceOverride, WorkloadManifest, WorkloadPlan,
};
pub use registry::Registry;
