//! Structural analysis of JSON trees for backing selection.
//!
//! [`analyze`] walks an arbitrary `serde_json::Value` once and produces a
//! [`JsonMetrics`] record; [`route`] turns the metrics into a
//! [`Routing`] decision between the relational and document backings.
//!
//! # Metric definitions
//!
//! - `max_depth` — object-nesting level of the deepest scalar. The root
//!   container is level 1; each object level below it adds one; arrays are
//!   transparent (an array of records reads as one level of records).
//! - `field_presence[k]` — fraction of all object nodes that carry field
//!   `k`.
//! - `schema_consistency` — mean of `field_presence` over observed fields.
//! - `type_consistency` — fraction of fields whose values all share one
//!   primitive kind (null/bool/number/string). Container-valued fields do
//!   not qualify.
//! - `has_nested_arrays` — an array sits below another array, or below a
//!   container that is not the root.
//! - `has_mixed_types` — some field's values span more than one primitive
//!   kind.
//!
//! # Scoring
//!
//! ```text
//! SQL   = 3.0·[consistency > 0.90] + 2.5·[depth ≤ 2]
//!       + 1.5·[no arrays] / 1.0·[arrays, none nested]
//!       + 2.0·[every field presence ≥ 0.80] + 2.0·[type consistency = 1]
//!
//! NoSQL = 2.5·[consistency < 0.70] + 3.0·[depth > 4]
//!       + 2.5·[nested arrays] + 2.0·[some field presence < 0.50]
//!       + 1.5·[mixed types]
//! ```
//!
//! `relational` wins strictly; ties go to `document` (nested structures
//! are the safer default). Confidence is `winner / (sql + nosql)`, or 0.5
//! when both sides score zero.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::Backing;

/// Structural measurements of one JSON tree.
#[derive(Debug, Clone, Serialize)]
pub struct JsonMetrics {
    pub max_depth: usize,
    pub total_objects: usize,
    pub unique_fields: usize,
    pub total_field_occurrences: usize,
    pub field_presence: BTreeMap<String, f64>,
    pub schema_consistency: f64,
    pub type_consistency: f64,
    pub has_arrays: bool,
    pub has_nested_arrays: bool,
    pub has_mixed_types: bool,
}

/// The backing decision with its evidence.
#[derive(Debug, Clone, Serialize)]
pub struct Routing {
    pub backing: Backing,
    pub confidence: f64,
    pub sql_score: f64,
    pub nosql_score: f64,
    /// Human-readable contributions: winning signals plus losing-side
    /// counter-signals marked "(weak)".
    pub reasons: Vec<String>,
}

#[derive(Default)]
struct Walk {
    scalar_depth: usize,
    total_objects: usize,
    field_objects: BTreeMap<String, usize>,
    field_kinds: BTreeMap<String, BTreeSet<&'static str>>,
    field_occurrences: usize,
    has_arrays: bool,
    has_nested_arrays: bool,
}

/// Walk the tree once and compute all metrics.
pub fn analyze(root: &Value) -> JsonMetrics {
    let mut acc = Walk::default();
    walk(root, 0, 0, false, true, &mut acc);

    let total_objects = acc.total_objects;
    let mut field_presence = BTreeMap::new();
    for (k, count) in &acc.field_objects {
        let presence = if total_objects == 0 {
            1.0
        } else {
            *count as f64 / total_objects as f64
        };
        field_presence.insert(k.clone(), presence);
    }

    let schema_consistency = if field_presence.is_empty() {
        1.0
    } else {
        field_presence.values().sum::<f64>() / field_presence.len() as f64
    };

    let unique_fields = acc.field_kinds.len();
    let (consistent_fields, mixed) = {
        let mut consistent = 0usize;
        let mut mixed = false;
        for kinds in acc.field_kinds.values() {
            let primitive: Vec<_> = kinds
                .iter()
                .filter(|k| matches!(**k, "null" | "bool" | "number" | "string"))
                .collect();
            // A field is type-consistent when every value shares one
            // primitive kind; container values disqualify it.
            if kinds.len() == 1 && primitive.len() == 1 {
                consistent += 1;
            }
            if primitive.len() > 1 {
                mixed = true;
            }
        }
        (consistent, mixed)
    };
    let type_consistency = if unique_fields == 0 {
        1.0
    } else {
        consistent_fields as f64 / unique_fields as f64
    };

    JsonMetrics {
        max_depth: acc.scalar_depth.max(1),
        total_objects,
        unique_fields,
        total_field_occurrences: acc.field_occurrences,
        field_presence,
        schema_consistency,
        type_consistency,
        has_arrays: acc.has_arrays,
        has_nested_arrays: acc.has_nested_arrays,
        has_mixed_types: mixed,
    }
}

/// `obj_level` is the object-nesting level scalars at this position report;
/// `ancestors` counts container ancestors of `v`.
fn walk(v: &Value, obj_level: usize, ancestors: usize, parent_is_array: bool, is_root: bool, acc: &mut Walk) {
    match v {
        Value::Object(map) => {
            let level = obj_level + 1;
            acc.total_objects += 1;
            for (k, val) in map {
                acc.field_occurrences += 1;
                *acc.field_objects.entry(k.clone()).or_insert(0) += 1;
                acc.field_kinds
                    .entry(k.clone())
                    .or_default()
                    .insert(kind_of(val));
                walk(val, level, ancestors + 1, false, false, acc);
            }
        }
        Value::Array(items) => {
            let level = if is_root { 1 } else { obj_level };
            acc.has_arrays = true;
            if parent_is_array || ancestors >= 2 {
                acc.has_nested_arrays = true;
            }
            for item in items {
                walk(item, level, ancestors + 1, true, false, acc);
            }
        }
        _ => {
            acc.scalar_depth = acc.scalar_depth.max(obj_level.max(1));
        }
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const EPS: f64 = 1e-9;

/// Score the metrics and decide the backing.
pub fn route(m: &JsonMetrics) -> Routing {
    let mut sql = Vec::new();
    let mut nosql = Vec::new();

    if m.schema_consistency > 0.90 {
        sql.push((3.0, "consistent schema across records"));
    }
    if m.max_depth <= 2 {
        sql.push((2.5, "shallow structure fits relational tables"));
    }
    if !m.has_arrays {
        sql.push((1.5, "no arrays"));
    } else if !m.has_nested_arrays {
        sql.push((1.0, "arrays are flat"));
    }
    let all_present = m.field_presence.values().all(|p| *p >= 0.80);
    if all_present {
        sql.push((2.0, "fields present in most records"));
    }
    if (m.type_consistency - 1.0).abs() < EPS {
        sql.push((2.0, "uniform value types"));
    }

    if m.schema_consistency < 0.70 {
        nosql.push((2.5, "varying schema across records"));
    }
    if m.max_depth > 4 {
        nosql.push((3.0, "deep nesting suits document storage"));
    }
    if m.has_nested_arrays {
        nosql.push((2.5, "nested arrays avoid relational joins"));
    }
    if m.field_presence.values().any(|p| *p < 0.50) {
        nosql.push((2.0, "sparse fields"));
    }
    if m.has_mixed_types {
        nosql.push((1.5, "mixed value types"));
    }

    let sql_score: f64 = sql.iter().map(|(v, _)| v).sum();
    let nosql_score: f64 = nosql.iter().map(|(v, _)| v).sum();

    let (backing, confidence) = if sql_score > nosql_score {
        (Backing::Relational, sql_score / (sql_score + nosql_score + EPS))
    } else if sql_score + nosql_score < EPS {
        (Backing::Document, 0.5)
    } else {
        (Backing::Document, nosql_score / (sql_score + nosql_score + EPS))
    };

    let (winning, losing) = match backing {
        Backing::Relational => (sql, nosql),
        Backing::Document => (nosql, sql),
    };
    let mut reasons: Vec<String> = winning.iter().map(|(_, l)| l.to_string()).collect();
    reasons.extend(losing.iter().map(|(_, l)| format!("{} (weak)", l)));

    Routing {
        backing,
        confidence,
        sql_score,
        nosql_score,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_record_array_goes_relational() {
        let data = json!([
            {"id": 1, "name": "A", "price": 9.99},
            {"id": 2, "name": "B", "price": 19.99},
            {"id": 3, "name": "C", "price": 29.99}
        ]);
        let m = analyze(&data);
        assert_eq!(m.max_depth, 2);
        assert_eq!(m.total_objects, 3);
        assert!((m.schema_consistency - 1.0).abs() < 1e-9);
        assert!((m.type_consistency - 1.0).abs() < 1e-9);
        assert!(!m.has_nested_arrays);

        let r = route(&m);
        assert_eq!(r.backing, Backing::Relational);
        assert_eq!(r.nosql_score, 0.0);
        assert!(r.confidence > 0.99);
        assert!(!r.reasons.is_empty());
    }

    #[test]
    fn test_nested_document_goes_document() {
        let data = json!({
            "u": {"p": {
                "c": [{"t": "e", "v": "x"}, {"t": "p", "v": "y"}],
                "pref": {"n": {"e": true, "s": false}}
            }}
        });
        let m = analyze(&data);
        assert_eq!(m.max_depth, 5);
        assert!(m.has_nested_arrays);

        let r = route(&m);
        assert_eq!(r.backing, Backing::Document);
        assert!(r.confidence > 0.7);
        assert!(r.nosql_score > r.sql_score);
    }

    #[test]
    fn test_deeply_nested_chain_is_confident_document() {
        // 10 levels of single-field objects.
        let mut v = json!(1);
        for key in ["j", "i", "h", "g", "f", "e", "d", "c", "b", "a"] {
            v = json!({ key: v });
        }
        let m = analyze(&v);
        assert!(m.max_depth >= 10);

        let r = route(&m);
        assert_eq!(r.backing, Backing::Document);
        assert!(r.confidence > 0.7, "confidence was {}", r.confidence);
    }

    #[test]
    fn test_tie_goes_to_document_at_half_confidence() {
        let m = JsonMetrics {
            max_depth: 2,
            total_objects: 4,
            unique_fields: 4,
            total_field_occurrences: 10,
            field_presence: BTreeMap::from([
                ("id".to_string(), 1.0),
                ("rare".to_string(), 0.25),
            ]),
            schema_consistency: 0.75,
            type_consistency: 0.5,
            has_arrays: true,
            has_nested_arrays: false,
            has_mixed_types: true,
        };
        // SQL: depth (2.5) + flat arrays (1.0) = 3.5
        // NoSQL: sparse (2.0) + mixed (1.5) = 3.5
        let r = route(&m);
        assert_eq!(r.sql_score, 3.5);
        assert_eq!(r.nosql_score, 3.5);
        assert_eq!(r.backing, Backing::Document);
        assert!((r.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_scalar_root_scores_zero_nowhere_but_decides() {
        let m = analyze(&json!(42));
        assert_eq!(m.max_depth, 1);
        assert_eq!(m.total_objects, 0);
        let r = route(&m);
        // Vacuous consistency favours the relational side.
        assert_eq!(r.backing, Backing::Relational);
    }

    #[test]
    fn test_array_inside_record_objects_counts_as_nested() {
        let data = json!([{"tags": [1, 2]}, {"tags": [3]}]);
        let m = analyze(&data);
        assert!(m.has_nested_arrays);
    }

    #[test]
    fn test_top_level_array_field_is_flat() {
        let data = json!({"tags": [1, 2, 3], "name": "x"});
        let m = analyze(&data);
        assert!(m.has_arrays);
        assert!(!m.has_nested_arrays);
    }

    #[test]
    fn test_mixed_types_detected() {
        let data = json!([{"id": 1}, {"id": "two"}]);
        let m = analyze(&data);
        assert!(m.has_mixed_types);
        assert!(m.type_consistency < 1.0);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let data = json!({"a": [{"b": 1}, {"b": 2}], "c": {"d": true}});
        let m1 = analyze(&data);
        let m2 = analyze(&data);
        assert_eq!(m1.max_depth, m2.max_depth);
        assert_eq!(m1.field_presence, m2.field_presence);
        let r1 = route(&m1);
        let r2 = route(&m2);
        assert_eq!(r1.backing, r2.backing);
        assert_eq!(r1.sql_score, r2.sql_score);
    }
}
