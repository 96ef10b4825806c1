//! Placeholder resolution split across the two points in the state's
//! lifecycle spec.md describes: ancestor-output substitution happens once,
//! eagerly, when the fan-out engine materializes a successor state (§4.5
//! step 3b); `store.<key>` substitution is deferred to claim time (§4.4
//! `enqueue`). A field's raw template can reference both in the same
//! string, so the two passes compose: the first leaves any `store.*`
//! reference untouched (reconstructed verbatim) for the second pass to
//! pick up later.
//!
//! Resolves SPEC_FULL §9 Open Question 3: when an identifier collides with
//! the source state's own identifier, the source's own outputs win over a
//! `parents` lookup — checked first, below.

use std::collections::HashMap;

use state_manager_core::model::{Run, State, Store};
use state_manager_core::placeholder::DependentString;
use state_manager_core::ManagerError;

/// Substitute every ancestor-output reference in `raw` using `source`'s own
/// outputs (self-reference) or the listed `parents`' outputs. `store.*`
/// references are left as literal `${{ store.field }}` text for later
/// resolution by [`resolve_store_refs`]. Returns a human-readable message on
/// a missing parent or field — the caller marks the source state `ERRORED`
/// with it (spec.md §4.5 step 3b).
pub fn resolve_ancestor_refs(
    raw: &str,
    source: &State,
    parents: &HashMap<String, State>,
) -> Result<String, String> {
    let ds = DependentString::parse(raw).map_err(|e| e.to_string())?;
    let mut out = ds.head.clone();
    for dep in ds.dependents.values() {
        if dep.identifier == "store" {
            out.push_str(&format!("${{{{ store.{} }}}}", dep.field));
        } else if dep.identifier == source.identifier {
            let value = source
                .outputs
                .get(&dep.field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    format!(
                        "field '{}' missing from {}'s outputs",
                        dep.field, dep.identifier
                    )
                })?;
            out.push_str(value);
        } else if let Some(parent) = parents.get(&dep.identifier) {
            let value = parent
                .outputs
                .get(&dep.field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    format!(
                        "field '{}' missing from {}'s outputs",
                        dep.field, dep.identifier
                    )
                })?;
            out.push_str(value);
        } else {
            return Err(format!(
                "parent state for identifier '{}' not found",
                dep.identifier
            ));
        }
        out.push_str(&dep.tail);
    }
    Ok(out)
}

/// Substitute every `store.<key>` reference in `raw` against `store`,
/// called at claim time (spec.md §4.4 `enqueue`). By this point every
/// dependent in `raw` must be a `store` reference — the fan-out engine
/// already resolved everything else.
pub fn resolve_store_refs(raw: &str, store: &Store) -> Result<String, ManagerError> {
    let mut ds = DependentString::parse(raw)?;
    for (identifier, field) in ds.identifier_fields() {
        if identifier != "store" {
            return Err(ManagerError::Internal(format!(
                "input still references unresolved identifier '{identifier}' at claim time"
            )));
        }
        let value = store.get(&field).cloned().unwrap_or_default();
        ds.set_value(&identifier, &field, value);
    }
    Ok(ds.render()?)
}

/// Resolve every input on `state` against `store`, for returning to the
/// caller of `enqueue`. Does not mutate the persisted state.
pub fn resolve_inputs_for_claim(
    inputs: &HashMap<String, String>,
    store: &Store,
) -> Result<HashMap<String, String>, ManagerError> {
    inputs
        .iter()
        .map(|(k, v)| resolve_store_refs(v, store).map(|resolved| (k.clone(), resolved)))
        .collect()
}

/// Seed a run's initial `Store` from `store_config.default_values`,
/// `request.store`, validating `required_keys` are present (spec.md §8
/// "Store seeding" law).
pub fn seed_store(
    run: &Run,
    required_keys: &[String],
    default_values: &HashMap<String, String>,
    request_store: &HashMap<String, String>,
) -> Result<Store, ManagerError> {
    let mut values = default_values.clone();
    values.extend(request_store.iter().map(|(k, v)| (k.clone(), v.clone())));

    for key in required_keys {
        if !values.contains_key(key) {
            return Err(ManagerError::InvalidInput(format!(
                "required store key '{key}' was not provided"
            )));
        }
    }

    Ok(Store {
        run_id: run.run_id.clone(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use state_manager_core::model::{RunId, StateId, StateStatus};

    fn state(identifier: &str, outputs: &[(&str, &str)]) -> State {
        State {
            id: StateId::new(format!("s-{identifier}")),
            run_id: RunId::new("run-1"),
            graph_name: "g".into(),
            namespace: "ns".into(),
            node_name: "n".into(),
            identifier: identifier.into(),
            status: StateStatus::Executed,
            inputs: HashMap::new(),
            outputs: outputs
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect(),
            error: None,
            parents: HashMap::new(),
            fanout_id: "f0".into(),
            does_unites: false,
            retry_count: 0,
            enqueue_after: 0,
            timeout_minutes: None,
            queued_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn self_reference_takes_precedence() {
        let source = state("A", &[("x", "42")]);
        let out = resolve_ancestor_refs("msg=${{ A.outputs.x }}", &source, &HashMap::new()).unwrap();
        assert_eq!(out, "msg=42");
    }

    #[test]
    fn parent_reference_resolves_via_parents_map() {
        let parent = state("A", &[("x", "hello")]);
        let source = state("B", &[]);
        let mut parents = HashMap::new();
        parents.insert("A".to_string(), parent);
        let out = resolve_ancestor_refs("${{ A.outputs.x }} world", &source, &parents).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn store_reference_is_left_for_later() {
        let source = state("A", &[]);
        let out = resolve_ancestor_refs("${{ store.key }}", &source, &HashMap::new()).unwrap();
        assert_eq!(out, "${{ store.key }}");

        let store = Store {
            run_id: RunId::new("run-1"),
            values: [("key".to_string(), "VALUE".to_string())].into_iter().collect(),
        };
        assert_eq!(resolve_store_refs(&out, &store).unwrap(), "VALUE");
    }

    #[test]
    fn missing_field_errors_with_source_identifier() {
        let source = state("A", &[]);
        let err = resolve_ancestor_refs("${{ A.outputs.missing }}", &source, &HashMap::new()).unwrap_err();
        assert!(err.contains("missing"));
    }

    #[test]
    fn seed_store_requires_required_keys() {
        let run = Run {
            run_id: RunId::new("run-1"),
            graph_name: "g".into(),
            namespace: "ns".into(),
            created_at: Utc::now(),
        };
        let err = seed_store(&run, &["api_key".to_string()], &HashMap::new(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ManagerError::InvalidInput(_)));

        let ok = seed_store(
            &run,
            &["api_key".to_string()],
            &HashMap::new(),
            &[("api_key".to_string(), "secret".to_string())].into_iter().collect(),
        )
        .unwrap();
        assert_eq!(ok.get("api_key"), Some(&"secret".to_string()));
    }
}
