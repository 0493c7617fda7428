//! Predicates and canonicalization for Kubernetes label selectors.
//!
//! The matcher engine needs two things from a `LabelSelector` beyond
//! evaluation: a stable emptiness test (an empty selector selects
//! everything) and a canonical string form usable as a map key and in
//! rendered output.

use crate::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// Pod and namespace labels, as they appear on cluster objects.
pub type Map = BTreeMap<String, String>;

/// Indicates whether this selector matches every object. A selector with no
/// `matchLabels` and no `matchExpressions` selects all.
pub fn selects_all(selector: &LabelSelector) -> bool {
    let no_labels = selector.match_labels.as_ref().map_or(true, |l| l.is_empty());
    let no_exprs = selector
        .match_expressions
        .as_ref()
        .map_or(true, |e| e.is_empty());
    no_labels && no_exprs
}

/// Evaluates the selector against a label set. The results of
/// `matchLabels` and `matchExpressions` are ANDed.
pub fn matches(selector: &LabelSelector, labels: &Map) -> bool {
    for req in selector.match_expressions.iter().flatten() {
        if !requirement_matches(req, labels) {
            return false;
        }
    }

    if let Some(match_labels) = selector.match_labels.as_ref() {
        for (k, v) in match_labels {
            if labels.get(k) != Some(v) {
                return false;
            }
        }
    }

    true
}

/// Renders the selector in its canonical requirement-string form:
/// `matchLabels` sorted by key as `key=value`, then `matchExpressions`
/// sorted by `(key, operator, values)`, joined by commas. The empty
/// selector renders as `<none>`.
pub fn canonical(selector: &LabelSelector) -> String {
    let mut reqs = Vec::new();

    // BTreeMap iteration is already sorted by key.
    for (k, v) in selector.match_labels.iter().flatten() {
        reqs.push(format!("{}={}", k, v));
    }

    let mut exprs: Vec<&LabelSelectorRequirement> =
        selector.match_expressions.iter().flatten().collect();
    exprs.sort_by_key(|req| (req.key.clone(), req.operator.clone(), sorted_values(req)));
    for req in exprs {
        reqs.push(requirement_string(req));
    }

    if reqs.is_empty() {
        return "<none>".to_string();
    }
    reqs.join(",")
}

fn sorted_values(req: &LabelSelectorRequirement) -> Vec<String> {
    let mut values: Vec<String> = req.values.iter().flatten().cloned().collect();
    values.sort();
    values
}

fn requirement_string(req: &LabelSelectorRequirement) -> String {
    let values = sorted_values(req);
    match req.operator.as_str() {
        "In" => format!("{} in ({})", req.key, values.join(",")),
        "NotIn" => format!("{} notin ({})", req.key, values.join(",")),
        "Exists" => req.key.clone(),
        "DoesNotExist" => format!("!{}", req.key),
        operator => format!("{} {} ({})", req.key, operator, values.join(",")),
    }
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &Map) -> bool {
    let values = req.values.as_deref().filter(|vs| !vs.is_empty());
    match (req.operator.as_str(), values) {
        ("In", Some(values)) => match labels.get(&req.key) {
            Some(v) => values.contains(v),
            None => false,
        },
        ("NotIn", Some(values)) => match labels.get(&req.key) {
            Some(v) => !values.contains(v),
            None => true,
        },
        ("Exists", None) => labels.contains_key(&req.key),
        ("DoesNotExist", None) => !labels.contains_key(&req.key),
        (operator, values) => {
            tracing::warn!(%operator, key = %req.key, ?values, "illegal match expression");
            false
        }
    }
}
