//! Graph validator (spec.md §4.3).
//!
//! Pure over a `GraphTemplate` and the `RegisteredNode`s it references; the
//! engine layer (`state-manager-engine::validation_task`) is responsible for
//! loading these from storage, calling `validate`, persisting the result,
//! and reconciling cron triggers on `VALID`. Aggregates every detected
//! error rather than returning on the first failure, per
//! `original_source/state-manager/app/tasks/verify_graph.py`'s
//! `asyncio.gather` over independent checks.

use std::collections::{HashMap, HashSet};

use crate::model::{GraphTemplate, NodeTemplate, RegisteredNode, BUILTIN_NAMESPACE};
use crate::placeholder::DependentString;

pub fn validate(template: &GraphTemplate, registered_nodes: &[RegisteredNode]) -> Vec<String> {
    let mut errors = Vec::new();

    check_identifiers(template, &mut errors);
    check_namespaces(template, &mut errors);

    let lookup: HashMap<(String, String), &RegisteredNode> = registered_nodes
        .iter()
        .map(|rn| (rn.key(), rn))
        .collect();

    check_nodes_registered(template, &lookup, &mut errors);
    check_secrets(template, registered_nodes, &mut errors);
    check_inputs(template, &lookup, &mut errors);

    // Structural checks only make sense once identifiers are sane; still run
    // them even if earlier checks failed so every error surfaces at once,
    // but guard against panics on duplicate/empty identifiers.
    check_structure(template, &mut errors);

    errors
}

fn check_identifiers(template: &GraphTemplate, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for node in &template.nodes {
        if node.node_name.trim().is_empty() {
            errors.push(format!("node with identifier '{}' has an empty node_name", node.identifier));
        }
        if node.identifier.trim().is_empty() {
            errors.push("a node has an empty identifier".to_string());
            continue;
        }
        if !seen.insert(node.identifier.clone()) {
            errors.push(format!("duplicate identifier '{}' in graph template", node.identifier));
        }
    }
}

fn check_namespaces(template: &GraphTemplate, errors: &mut Vec<String>) {
    for node in &template.nodes {
        if node.namespace != template.namespace && node.namespace != BUILTIN_NAMESPACE {
            errors.push(format!(
                "node '{}' has namespace '{}', expected '{}' or the built-in namespace '{}'",
                node.identifier, node.namespace, template.namespace, BUILTIN_NAMESPACE
            ));
        }
    }
}

fn check_nodes_registered(
    template: &GraphTemplate,
    lookup: &HashMap<(String, String), &RegisteredNode>,
    errors: &mut Vec<String>,
) {
    for node in &template.nodes {
        if !lookup.contains_key(&(node.namespace.clone(), node.node_name.clone())) {
            errors.push(format!(
                "node {} in namespace {} does not exist",
                node.node_name, node.namespace
            ));
        }
    }
}

fn check_secrets(template: &GraphTemplate, registered_nodes: &[RegisteredNode], errors: &mut Vec<String>) {
    let mut required: HashSet<&str> = HashSet::new();
    for rn in registered_nodes {
        for secret in &rn.secrets {
            required.insert(secret.as_str());
        }
    }
    for secret in required {
        if !template.secrets.contains_key(secret) {
            errors.push(format!(
                "secret {secret} is required but not present in the graph template"
            ));
        }
    }
}

fn check_inputs(
    template: &GraphTemplate,
    lookup: &HashMap<(String, String), &RegisteredNode>,
    errors: &mut Vec<String>,
) {
    for node in &template.nodes {
        let Some(registered) = lookup.get(&(node.namespace.clone(), node.node_name.clone())) else {
            continue; // already reported by check_nodes_registered
        };

        for field in registered.string_input_fields() {
            if !node.inputs.contains_key(&field) {
                errors.push(format!(
                    "input {field} in node {} in namespace {} is not present in the graph template",
                    node.node_name, node.namespace
                ));
            }
        }

        for (input_name, placeholder) in &node.inputs {
            if !registered.string_input_fields().contains(input_name) {
                errors.push(format!(
                    "input {input_name} in node {} is not a declared string field of its registered node",
                    node.node_name
                ));
                continue;
            }

            let dependent_string = match DependentString::parse(placeholder) {
                Ok(ds) => ds,
                Err(e) => {
                    errors.push(format!(
                        "input {input_name} in node {} has an invalid placeholder: {e}",
                        node.node_name
                    ));
                    continue;
                }
            };

            for (identifier, field) in dependent_string.identifier_fields() {
                if identifier == "store" {
                    continue;
                }

                let Some(ancestor) = template.node_by_identifier(&identifier) else {
                    errors.push(format!("node {identifier} does not exist in the graph template"));
                    continue;
                };

                if !is_strict_ancestor(template, &identifier, &node.identifier) {
                    errors.push(format!(
                        "node {identifier} is not an ancestor of {} on a directed path",
                        node.identifier
                    ));
                    continue;
                }

                let Some(ancestor_registered) =
                    lookup.get(&(ancestor.namespace.clone(), ancestor.node_name.clone()))
                else {
                    continue; // already reported
                };

                if !ancestor_registered.string_output_fields().contains(&field) {
                    errors.push(format!(
                        "field {field} in node {} in namespace {} does not exist or is not a string",
                        ancestor.node_name, ancestor.namespace
                    ));
                }
            }
        }
    }
}

fn check_structure(template: &GraphTemplate, errors: &mut Vec<String>) {
    let identifiers: HashSet<&str> = template.nodes.iter().map(|n| n.identifier.as_str()).collect();

    for node in &template.nodes {
        for next in &node.next_nodes {
            if !identifiers.contains(next.as_str()) {
                errors.push(format!(
                    "next_nodes entry '{next}' on node '{}' references an unknown identifier",
                    node.identifier
                ));
            }
        }
    }

    // In-degree over next_nodes edges determines the root.
    let mut in_degree: HashMap<&str, u32> = template
        .nodes
        .iter()
        .map(|n| (n.identifier.as_str(), 0))
        .collect();
    for node in &template.nodes {
        for next in &node.next_nodes {
            if let Some(count) = in_degree.get_mut(next.as_str()) {
                *count += 1;
            }
        }
    }
    let roots: Vec<&str> = in_degree
        .iter()
        .filter(|(_, c)| **c == 0)
        .map(|(id, _)| *id)
        .collect();
    if roots.len() != 1 {
        errors.push(format!(
            "graph must have exactly one root (in-degree zero); found {}",
            roots.len()
        ));
    }

    if has_cycle(template) {
        errors.push("graph's next_nodes edges contain a cycle".to_string());
    }

    if !is_weakly_connected(template) {
        errors.push("graph is not connected".to_string());
    }

    for node in &template.nodes {
        if let Some(unites) = &node.unites {
            if unites.identifier == node.identifier {
                errors.push(format!("node '{}' unites itself, which is forbidden", node.identifier));
                continue;
            }
            if template.node_by_identifier(&unites.identifier).is_none() {
                errors.push(format!(
                    "node '{}' unites unknown identifier '{}'",
                    node.identifier, unites.identifier
                ));
                continue;
            }
            // A unites edge only needs to be a strict ancestor when it would
            // otherwise close a cycle: that's the case where `node` itself
            // sits upstream of its own unites target, so waiting on that
            // target to finish before `node` can run is a deadlock. Siblings
            // under a shared ancestor (neither reaches the other via
            // next_nodes) are the ordinary join case (spec.md §4.3 check 6)
            // and are never flagged here.
            if is_strict_ancestor(template, &node.identifier, &unites.identifier) {
                errors.push(format!(
                    "node '{}' unites '{}', which closes a cycle because '{}' is a descendant of '{}'",
                    node.identifier, unites.identifier, unites.identifier, node.identifier
                ));
            }
        }
    }
}

fn has_cycle(template: &GraphTemplate) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let by_id: HashMap<&str, &NodeTemplate> =
        template.nodes.iter().map(|n| (n.identifier.as_str(), n)).collect();
    let mut marks: HashMap<&str, Mark> =
        template.nodes.iter().map(|n| (n.identifier.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a NodeTemplate>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> bool {
        match marks.get(id) {
            Some(Mark::InProgress) => return true,
            Some(Mark::Done) => return false,
            _ => {}
        }
        marks.insert(id, Mark::InProgress);
        if let Some(node) = by_id.get(id) {
            for next in &node.next_nodes {
                if visit(next.as_str(), by_id, marks) {
                    return true;
                }
            }
        }
        marks.insert(id, Mark::Done);
        false
    }

    for id in by_id.keys() {
        if visit(id, &by_id, &mut marks) {
            return true;
        }
    }
    false
}

fn is_weakly_connected(template: &GraphTemplate) -> bool {
    if template.nodes.is_empty() {
        return true;
    }
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &template.nodes {
        adjacency.entry(node.identifier.as_str()).or_default();
        for next in &node.next_nodes {
            adjacency.entry(node.identifier.as_str()).or_default().push(next.as_str());
            adjacency.entry(next.as_str()).or_default().push(node.identifier.as_str());
        }
    }

    let start = template.nodes[0].identifier.as_str();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(neighbors) = adjacency.get(id) {
            stack.extend(neighbors.iter().copied());
        }
    }
    visited.len() == template.nodes.len()
}

/// Whether `ancestor` lies on a directed path (via `next_nodes`) to `node`,
/// strictly (an identifier is never its own ancestor).
fn is_strict_ancestor(template: &GraphTemplate, ancestor: &str, node: &str) -> bool {
    if ancestor == node {
        return false;
    }
    let by_id: HashMap<&str, &NodeTemplate> =
        template.nodes.iter().map(|n| (n.identifier.as_str(), n)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![ancestor];
    while let Some(id) = stack.pop() {
        if id == node {
            return true;
        }
        if !visited.insert(id) {
            continue;
        }
        if let Some(n) = by_id.get(id) {
            stack.extend(n.next_nodes.iter().map(String::as_str));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackoffMethod, GraphValidationStatus, NodeTemplate, RetryPolicy, StoreConfig, Unites};
    use serde_json::json;
    use std::collections::HashMap;

    fn string_schema(fields: &[&str]) -> serde_json::Value {
        let props: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|f| (f.to_string(), json!({"type": "string"})))
            .collect();
        json!({"type": "object", "properties": props})
    }

    fn registered(namespace: &str, name: &str, inputs: &[&str], outputs: &[&str]) -> RegisteredNode {
        RegisteredNode {
            name: name.to_string(),
            namespace: namespace.to_string(),
            inputs_schema: string_schema(inputs),
            outputs_schema: string_schema(outputs),
            secrets: vec![],
            timeout_minutes: None,
        }
    }

    fn node(identifier: &str, next_nodes: &[&str], inputs: HashMap<String, String>) -> NodeTemplate {
        NodeTemplate {
            node_name: "n".to_string(),
            namespace: "ns".to_string(),
            identifier: identifier.to_string(),
            inputs,
            next_nodes: next_nodes.iter().map(|s| s.to_string()).collect(),
            unites: None,
        }
    }

    fn base_template(nodes: Vec<NodeTemplate>) -> GraphTemplate {
        GraphTemplate {
            namespace: "ns".to_string(),
            name: "g".to_string(),
            nodes,
            retry_policy: RetryPolicy {
                max_retries: 0,
                method: BackoffMethod::Fixed,
                backoff_factor: 1.0,
            },
            store_config: StoreConfig::default(),
            secrets: HashMap::new(),
            triggers: vec![],
            validation_status: GraphValidationStatus::Pending,
            validation_errors: vec![],
        }
    }

    #[test]
    fn linear_graph_with_resolved_placeholder_is_valid() {
        let mut b_inputs = HashMap::new();
        b_inputs.insert("msg".to_string(), "${{ A.outputs.x }}".to_string());

        let template = base_template(vec![
            node("A", &["B"], HashMap::new()),
            node("B", &[], b_inputs),
        ]);
        let registered_nodes = vec![
            registered("ns", "n", &[], &["x"]),
        ];

        let errors = validate(&template, &registered_nodes);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn cycle_without_unites_is_rejected() {
        let template = base_template(vec![
            node("A", &["B"], HashMap::new()),
            node("B", &["A"], HashMap::new()),
        ]);
        let registered_nodes = vec![registered("ns", "n", &[], &[])];
        let errors = validate(&template, &registered_nodes);
        assert!(errors.iter().any(|e| e.contains("cycle")));
    }

    #[test]
    fn self_unites_is_rejected() {
        let mut a = node("A", &[], HashMap::new());
        a.unites = Some(Unites { identifier: "A".to_string() });
        let template = base_template(vec![a]);
        let registered_nodes = vec![registered("ns", "n", &[], &[])];
        let errors = validate(&template, &registered_nodes);
        assert!(errors.iter().any(|e| e.contains("unites itself")));
    }

    #[test]
    fn unites_sibling_join_is_valid() {
        let mut c = node("C", &[], HashMap::new());
        c.unites = Some(Unites { identifier: "B".to_string() });
        let template = base_template(vec![
            node("A", &["B", "C"], HashMap::new()),
            node("B", &[], HashMap::new()),
            c,
        ]);
        let registered_nodes = vec![registered("ns", "n", &[], &[])];
        let errors = validate(&template, &registered_nodes);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn unites_closing_a_cycle_is_rejected() {
        let mut a = node("A", &["B"], HashMap::new());
        a.unites = Some(Unites { identifier: "B".to_string() });
        let template = base_template(vec![a, node("B", &[], HashMap::new())]);
        let registered_nodes = vec![registered("ns", "n", &[], &[])];
        let errors = validate(&template, &registered_nodes);
        assert!(errors.iter().any(|e| e.contains("closes a cycle")));
    }

    #[test]
    fn missing_registered_node_is_reported() {
        let template = base_template(vec![node("A", &[], HashMap::new())]);
        let errors = validate(&template, &[]);
        assert!(errors.iter().any(|e| e.contains("does not exist")));
    }
}
