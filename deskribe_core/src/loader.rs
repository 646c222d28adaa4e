//! Reads the three on-disk JSON documents into typed, immutable records.
//!
//! Resource dispatch is hand-rolled rather than a plain `#[serde(tag)]`
//! derive: an unrecognized `type` must fail with [`ErrorKind::UnknownResourceType`]
//! naming the offending tag and the file it came from, which a bare serde
//! enum error can't carry through to our own error taxonomy (grounded on
//! `shipcat_definitions::deserializers`'s hand-written `Visitor` impls).

use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::model::{
    KafkaMessagingResource, Manifest, PlatformConfig, PostgresResource, RedisResource, Resource,
    Service,
};
use crate::{Error, ErrorKind, Result, ResultExt};

/// The three loaded documents plus any non-fatal diagnostics produced while
/// reading them (e.g. a missing environment overlay).
pub struct LoadedConfig {
    pub manifest: Manifest,
    pub platform: PlatformConfig,
    pub environment: crate::model::EnvironmentConfig,
    pub warnings: Vec<String>,
}

/// Read `manifest_path`, `<platform_path>/base.json` and
/// `<platform_path>/envs/<environment>.json` (spec.md §4.1).
pub fn load(manifest_path: &Path, platform_path: &Path, environment: &str) -> Result<LoadedConfig> {
    let manifest = load_manifest(manifest_path)?;

    let base_path = platform_path.join("base.json");
    let platform: PlatformConfig = read_json(&base_path)?;

    let mut warnings = Vec::new();
    let env_path = platform_path.join("envs").join(format!("{}.json", environment));
    let environment_config = if env_path.is_file() {
        read_json(&env_path)?
    } else {
        let msg = format!(
            "environment overlay {} does not exist; proceeding with platform defaults only",
            env_path.display()
        );
        warn!("{}", msg);
        warnings.push(msg);
        crate::model::EnvironmentConfig::blank(environment)
    };

    Ok(LoadedConfig {
        manifest,
        platform,
        environment: environment_config,
        warnings,
    })
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let raw = read_to_string(path)?;
    let doc: Value = serde_json::from_str(&raw).chain_err(|| {
        ErrorKind::ConfigParse(path.display().to_string(), "invalid JSON".into())
    })?;

    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            Error::from(ErrorKind::ConfigSchema(
                path.display().to_string(),
                "'name' is required and must be non-blank".into(),
            ))
        })?
        .to_string();

    let resources = match doc.get("resources") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| parse_resource(item, path))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(ErrorKind::ConfigSchema(
                path.display().to_string(),
                "'resources' must be an array".into(),
            )
            .into())
        }
        None => Vec::new(),
    };

    let services: Vec<Service> = match doc.get("services") {
        Some(v) => serde_json::from_value(v.clone()).chain_err(|| {
            ErrorKind::ConfigSchema(path.display().to_string(), "'services' is malformed".into())
        })?,
        None => Vec::new(),
    };

    Ok(Manifest { name, resources, services })
}

const POSTGRES_FIELDS: &[&str] = &["type", "size", "version", "ha", "sku"];
const REDIS_FIELDS: &[&str] = &["type", "size", "version", "ha", "maxMemoryMb"];
const KAFKA_MESSAGING_FIELDS: &[&str] = &["type", "size", "topics"];
const KAFKA_TOPIC_FIELDS: &[&str] = &["name", "partitions", "retentionHours", "owners", "consumers"];

/// Case-folds the keys of a JSON object against a list of canonically-cased
/// field names: a key matching one of `fields` under ASCII case folding is
/// rewritten to that canonical spelling, any other key is left as-is (and
/// harmlessly ignored, since none of the resource structs `deny_unknown_fields`).
fn canonicalize_keys(value: Value, fields: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                let canonical = fields.iter().find(|f| f.eq_ignore_ascii_case(&key));
                out.insert(canonical.map(|f| f.to_string()).unwrap_or(key), v);
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// As [`canonicalize_keys`], but also folds each element of the `topics`
/// array against [`KAFKA_TOPIC_FIELDS`].
fn canonicalize_kafka_messaging(item: Value) -> Value {
    let mut item = canonicalize_keys(item, KAFKA_MESSAGING_FIELDS);
    if let Value::Object(ref mut map) = item {
        if let Some(Value::Array(topics)) = map.get_mut("topics") {
            for topic in topics.iter_mut() {
                *topic = canonicalize_keys(std::mem::take(topic), KAFKA_TOPIC_FIELDS);
            }
        }
    }
    item
}

/// Dispatches one `resources[]` entry by its `type` tag. Matching is
/// case-insensitive both on the tag and on the property names inside the
/// resource body (spec.md §4.1: "Property-name matching is case-insensitive;
/// unknown properties are ignored").
fn parse_resource(item: &Value, path: &Path) -> Result<Resource> {
    let ty = item
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::from(ErrorKind::ConfigSchema(
                path.display().to_string(),
                "resource entry is missing 'type'".into(),
            ))
        })?
        .to_string();

    let schema_err = |reason: String| {
        Error::from(ErrorKind::ConfigSchema(path.display().to_string(), reason))
    };

    match ty.to_lowercase().as_str() {
        "postgres" => {
            let folded = canonicalize_keys(item.clone(), POSTGRES_FIELDS);
            let r: PostgresResource = serde_json::from_value(folded)
                .map_err(|e| schema_err(e.to_string()))?;
            Ok(Resource::Postgres(r))
        }
        "redis" => {
            let folded = canonicalize_keys(item.clone(), REDIS_FIELDS);
            let r: RedisResource = serde_json::from_value(folded)
                .map_err(|e| schema_err(e.to_string()))?;
            Ok(Resource::Redis(r))
        }
        "kafka.messaging" => {
            let folded = canonicalize_kafka_messaging(item.clone());
            let r: KafkaMessagingResource = serde_json::from_value(folded)
                .map_err(|e| schema_err(e.to_string()))?;
            Ok(Resource::KafkaMessaging(r))
        }
        other => Err(ErrorKind::UnknownResourceType(other.to_string(), path.display().to_string()).into()),
    }
}

fn read_to_string(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(ErrorKind::ConfigMissing(path.display().to_string()).into());
    }
    let mut f = File::open(path)?;
    let mut data = String::new();
    f.read_to_string(&mut data)?;
    Ok(data)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_to_string(path)?;
    serde_json::from_str(&raw)
        .chain_err(|| ErrorKind::ConfigParse(path.display().to_string(), "invalid JSON".into()))
}
