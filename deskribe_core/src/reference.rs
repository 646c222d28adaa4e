//! The `@resource(<type>).<property>` expression grammar: extract the
//! references a service's environment variables contain, validate them
//! against the resource types a manifest actually declares, and resolve
//! them against the outputs a Backend Adapter produced.
//!
//! Resolved values are never logged at their real value — only a redacted
//! placeholder — since they may carry connection strings or credentials.

use std::collections::BTreeMap;

use regex::Regex;

use crate::model::ValidationResult;
use crate::ErrorKind;

/// A single `@resource(type).property` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceExpr {
    pub resource_type: String,
    pub property: String,
}

impl ReferenceExpr {
    fn pattern() -> Regex {
        Regex::new(r"@resource\(([A-Za-z0-9_.]+)\)\.([A-Za-z0-9_]+)")
            .expect("reference grammar is a fixed, known-valid pattern")
    }

    /// All references appearing anywhere in `text`, in order of appearance.
    pub fn extract(text: &str) -> Vec<ReferenceExpr> {
        ReferenceExpr::pattern()
            .captures_iter(text)
            .map(|caps| ReferenceExpr {
                resource_type: caps[1].to_string(),
                property: caps[2].to_string(),
            })
            .collect()
    }
}

/// Every reference found across a service's env vars, keyed by the env var
/// name it was found in (for error messages that name the offending var).
pub fn extract_from_env(env: &BTreeMap<String, String>) -> Vec<(String, ReferenceExpr)> {
    let mut out = Vec::new();
    for (key, value) in env {
        for reference in ReferenceExpr::extract(value) {
            out.push((key.clone(), reference));
        }
    }
    out
}

/// Rejects any reference naming a resource type the manifest did not
/// declare (spec.md §4.3): a dangling reference is a Validate-phase error,
/// not a warning.
pub fn validate_declared(env: &BTreeMap<String, String>, declared_types: &[&str]) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (env_var, reference) in extract_from_env(env) {
        if !declared_types.contains(&reference.resource_type.as_str()) {
            result.push_error(ErrorKind::ReferenceUnknownType(env_var, reference.resource_type).to_string());
        }
    }
    result
}

/// Substitutes every `@resource(type).property` occurrence in `text` with
/// the matching backend output, if one was produced. References that
/// cannot be resolved are left verbatim in the output and reported back as
/// warnings (spec.md §4.6: `ReferenceUnresolved` is a warning, not a hard
/// failure — there is no pre-apply coverage guarantee on backend outputs).
pub fn resolve(
    text: &str,
    outputs: &BTreeMap<String, BTreeMap<String, String>>,
) -> (String, Vec<String>) {
    let mut warnings = Vec::new();
    let resolved = ReferenceExpr::pattern()
        .replace_all(text, |caps: &regex::Captures| {
            let resource_type = &caps[1];
            let property = &caps[2];
            match outputs.get(resource_type).and_then(|props| props.get(property)) {
                Some(value) => {
                    debug!(
                        "resolved @resource({}).{} to a redacted value",
                        resource_type, property
                    );
                    value.clone()
                }
                None => {
                    warnings.push(format!(
                        "reference '@resource({}).{}' could not be resolved; no matching backend output",
                        resource_type, property
                    ));
                    caps[0].to_string()
                }
            }
        })
        .into_owned();
    (resolved, warnings)
}

/// Resolves every env var in `env`, aggregating unresolved-reference
/// warnings across the whole map.
pub fn resolve_env(
    env: &BTreeMap<String, String>,
    outputs: &BTreeMap<String, BTreeMap<String, String>>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut resolved_env = BTreeMap::new();
    let mut warnings = Vec::new();
    for (key, value) in env {
        let (resolved_value, mut value_warnings) = resolve(value, outputs);
        resolved_env.insert(key.clone(), resolved_value);
        warnings.append(&mut value_warnings);
    }
    (resolved_env, warnings)
}
