//! Immutable value records shared across every phase of the pipeline.
//!
//! Every record here is frozen after construction: phases produce new
//! records rather than mutating their inputs (spec invariant: "All records
//! are frozen after construction; phases produce new records rather than
//! mutating inputs").

use merge::Merge;
use std::collections::BTreeMap;

/// Developer-authored manifest: what a service needs and how it runs.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    /// Non-empty; used in naming and namespace expansion.
    pub name: String,
    /// Order is preserved and significant for deterministic planning output.
    pub resources: Vec<Resource>,
    /// Only `services[0]` is consumed by the core (see DESIGN.md Open Question 1).
    pub services: Vec<Service>,
}

impl Manifest {
    /// The single service the engine operates on, if any were declared.
    pub fn primary_service(&self) -> Option<&Service> {
        self.services.first()
    }

    /// All declared resource type tags, in declaration order.
    pub fn resource_types(&self) -> Vec<&str> {
        self.resources.iter().map(Resource::resource_type).collect()
    }
}

/// A declared infrastructure dependency, tagged by `type`.
///
/// The set of variants recognized at load time is closed (`postgres`,
/// `redis`, `kafka.messaging`); any other `type` string fails to load with
/// `UnknownResourceType` rather than falling back to a generic shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Resource {
    Postgres(PostgresResource),
    Redis(RedisResource),
    #[serde(rename = "kafka.messaging")]
    KafkaMessaging(KafkaMessagingResource),
}

impl Resource {
    /// The registry key / tag this resource was declared with.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Resource::Postgres(_) => "postgres",
            Resource::Redis(_) => "redis",
            Resource::KafkaMessaging(_) => "kafka.messaging",
        }
    }

    /// The free-form, provider-interpreted size tag, if any.
    pub fn size(&self) -> Option<&str> {
        match self {
            Resource::Postgres(r) => r.size.as_deref(),
            Resource::Redis(r) => r.size.as_deref(),
            Resource::KafkaMessaging(r) => r.size.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresResource {
    pub size: Option<String>,
    pub version: Option<String>,
    pub ha: Option<bool>,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisResource {
    pub size: Option<String>,
    pub version: Option<String>,
    pub ha: Option<bool>,
    #[serde(rename = "maxMemoryMb")]
    pub max_memory_mb: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaMessagingResource {
    pub size: Option<String>,
    pub topics: Vec<KafkaTopic>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaTopic {
    pub name: String,
    pub partitions: Option<u32>,
    #[serde(rename = "retentionHours")]
    pub retention_hours: Option<u32>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub consumers: Vec<String>,
}

/// A workload the developer declares in the manifest.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Service {
    /// Logical name used to match CLI-provided image overrides.
    pub name: Option<String>,
    /// May contain `@resource(...)` reference expressions.
    pub env: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, ServiceOverride>,
}

impl Service {
    /// The key this service is looked up under in a `serviceName -> image` map
    /// (falls back to the literal `"api"` when unnamed, per the merge spec).
    pub fn image_lookup_key(&self) -> &str {
        self.name.as_deref().unwrap_or("api")
    }
}

/// Per-environment override of a service's workload shape. Only these three
/// fields are developer-overridable (see DESIGN.md merge-engine decision).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceOverride {
    pub replicas: Option<u32>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

/// One of three serialization conventions for workload env vars when handed
/// to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretsStrategy {
    Opaque,
    ExternalSecrets,
    SealedSecrets,
}

impl Default for SecretsStrategy {
    fn default() -> Self {
        SecretsStrategy::Opaque
    }
}

/// Platform-team-authored base config: organization-wide defaults, backend
/// routing, and policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub organization: Option<String>,
    pub defaults: PlatformDefaults,
    pub backends: BTreeMap<String, String>,
    pub policies: PlatformPolicies,
    /// Informational; compared to the running engine version (see SPEC_FULL.md §10.6).
    #[serde(rename = "engineVersion")]
    pub engine_version: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            organization: None,
            defaults: PlatformDefaults::default(),
            backends: BTreeMap::new(),
            policies: PlatformPolicies::default(),
            engine_version: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformDefaults {
    pub runtime: String,
    pub region: String,
    pub replicas: u32,
    pub cpu: String,
    pub memory: String,
    pub namespace_pattern: String,
    pub ha: Option<bool>,
    pub secrets_strategy: SecretsStrategy,
    pub external_secrets_store: Option<String>,
}

impl Default for PlatformDefaults {
    fn default() -> Self {
        PlatformDefaults {
            runtime: String::new(),
            region: String::new(),
            replicas: 0,
            cpu: String::new(),
            memory: String::new(),
            namespace_pattern: "{app}-{env}".into(),
            ha: None,
            secrets_strategy: SecretsStrategy::Opaque,
            external_secrets_store: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformPolicies {
    pub allowed_regions: Vec<String>,
    pub enforce_tls: bool,
}

/// Explicit-optional overlay of [`PlatformDefaults`], "present wins" under
/// `merge`. Only `region`, `replicas`, `cpu`, `memory`, `ha`,
/// `secrets_strategy` and `external_secrets_store` are actually applied by
/// the Merge Engine; `runtime` and `namespace_pattern` are platform-only
/// (see DESIGN.md) and, if set here, are ignored with a warning.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Merge)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialDefaults {
    pub runtime: Option<String>,
    pub region: Option<String>,
    pub replicas: Option<u32>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub namespace_pattern: Option<String>,
    pub ha: Option<bool>,
    pub secrets_strategy: Option<SecretsStrategy>,
    pub external_secrets_store: Option<String>,
}

/// Per-environment overlay on the platform defaults and backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Must equal the environment name passed in at invocation.
    pub name: String,
    pub defaults: PartialDefaults,
    pub alert_routing: BTreeMap<String, Vec<String>>,
    pub backends: BTreeMap<String, String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            name: String::new(),
            defaults: PartialDefaults::default(),
            alert_routing: BTreeMap::new(),
            backends: BTreeMap::new(),
        }
    }
}

impl EnvironmentConfig {
    /// The overlay produced when `<platformPath>/envs/<env>.json` does not exist.
    pub fn blank(env: &str) -> Self {
        EnvironmentConfig {
            name: env.to_string(),
            ..EnvironmentConfig::default()
        }
    }
}

/// Merge output / runtime input: the concrete, environment-specialized
/// description of how the service's container runs.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadPlan {
    pub app_name: String,
    pub environment: String,
    pub namespace: String,
    pub image: Option<String>,
    pub replicas: u32,
    pub cpu: String,
    pub memory: String,
    /// May still contain unresolved `@resource(...)` references.
    pub environment_variables: BTreeMap<String, String>,
    pub secrets_strategy: SecretsStrategy,
    pub external_secrets_store: Option<String>,
}

/// What the engine decided to do with a single declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanAction {
    Create,
    Update,
    NoChange,
}

/// Planner output for a single resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePlanResult {
    /// The declared resource this plan was produced for, carried along so
    /// Apply can hand the original resource body to the Backend Adapter
    /// without re-deriving it from `resource_type` alone.
    pub resource: Resource,
    pub resource_type: String,
    pub action: PlanAction,
    /// property -> placeholder/string, filled in for real after Backend Apply.
    pub planned_outputs: BTreeMap<String, String>,
    /// Provider-specific key -> arbitrary value.
    pub configuration: BTreeMap<String, serde_json::Value>,
}

/// Full engine plan output.
#[derive(Debug, Clone, Serialize)]
pub struct DeskribePlan {
    pub app_name: String,
    pub environment: String,
    pub platform: PlatformConfig,
    pub environment_config: EnvironmentConfig,
    pub resource_plans: Vec<ResourcePlanResult>,
    pub workload: Option<WorkloadPlan>,
    pub warnings: Vec<String>,
}

/// Outcome of a Backend Adapter's `Apply`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendApplyResult {
    pub success: bool,
    pub resource_outputs: BTreeMap<String, BTreeMap<String, String>>,
    pub errors: Vec<String>,
}

/// Outcome of a Runtime Adapter's `Render`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadManifest {
    pub namespace: String,
    /// Opaque serialized payload (the runtime's own wire format).
    pub yaml: String,
    pub resource_names: Vec<String>,
}

/// Aggregate result of a validation pass. Errors are fatal; warnings are not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DeskribePlan {
    /// Prints the plan as JSON, mirroring `shipcat_definitions::Config::print`.
    pub fn print(&self) -> crate::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

impl ValidationResult {
    /// Prints the result as JSON, mirroring `shipcat_definitions::Config::print`.
    pub fn print(&self) -> crate::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }

    pub fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            errors: vec![],
            warnings: vec![],
        }
    }

    pub fn push_error(&mut self, e: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(e.into());
    }

    pub fn push_warning(&mut self, w: impl Into<String>) {
        self.warnings.push(w.into());
    }

    pub fn merge_in(&mut self, other: ValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}
