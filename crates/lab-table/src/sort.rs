use crate::paths::split_column_path;
use crate::record::Experiment;
use crate::value::{Primitive, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDefinition {
    pub path: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortDefinition {
    pub fn new(path: impl Into<String>, descending: bool) -> Self {
        SortDefinition {
            path: path.into(),
            descending,
        }
    }
}

/// Total ordering key for one resolved cell. Numbers and numeric strings
/// compare by value and come before other strings; rows missing the value
/// always sort last.
#[derive(Debug)]
enum SortKey {
    Number(f64),
    Text(String),
    Missing,
}

// blank strings would coerce to zero, so they stay text
fn string_key_number(s: &str) -> f64 {
    if s.trim().is_empty() {
        return f64::NAN;
    }
    Primitive::String(s.to_string()).to_number()
}

impl SortKey {
    fn from_value(value: Option<Cow<'_, Value>>) -> SortKey {
        match value.as_deref().and_then(Value::as_primitive) {
            Some(Primitive::String(s)) => {
                let n = string_key_number(s);
                if n.is_nan() {
                    SortKey::Text(s.clone())
                } else {
                    SortKey::Number(n)
                }
            }
            Some(primitive) => SortKey::Number(primitive.to_number()),
            None => SortKey::Missing,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Text(_) => 1,
            SortKey::Missing => 2,
        }
    }

    fn compare(&self, other: &SortKey, descending: bool) -> Ordering {
        let ord = match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Missing, _) | (_, SortKey::Missing) => {
                return self.rank().cmp(&other.rank());
            }
            _ => self.rank().cmp(&other.rank()),
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// Stable multi-key sort. Earlier definitions take priority and full ties
/// keep the incoming order, so sorting twice gives the same result as once.
pub fn sort_experiments(sorts: &[SortDefinition], experiments: Vec<Experiment>) -> Vec<Experiment> {
    if sorts.is_empty() {
        return experiments;
    }
    let paths: Vec<Vec<String>> = sorts.iter().map(|s| split_column_path(&s.path)).collect();

    let mut keyed: Vec<(usize, Vec<SortKey>, Experiment)> = experiments
        .into_iter()
        .enumerate()
        .map(|(idx, experiment)| {
            let keys = paths
                .iter()
                .map(|segments| SortKey::from_value(experiment.resolve(segments.as_slice())))
                .collect();
            (idx, keys, experiment)
        })
        .collect();

    keyed.sort_by(|(a_idx, a_keys, _), (b_idx, b_keys, _)| {
        sorts
            .iter()
            .zip(a_keys.iter().zip(b_keys))
            .map(|(sort, (a, b))| a.compare(b, sort.descending))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
            .then(a_idx.cmp(b_idx))
    });

    keyed.into_iter().map(|(_, _, experiment)| experiment).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::join_column_path;
    use crate::record::ExperimentRecord;
    use serde_json::json;

    fn experiment(id: &str, params: serde_json::Value) -> Experiment {
        let record: ExperimentRecord =
            serde_json::from_value(json!({"params": {"params.yaml": params}})).expect("record");
        Experiment::from_record(id, record)
    }

    fn param(key: &str) -> String {
        join_column_path(&["params", "params.yaml", key])
    }

    fn ids(rows: &[Experiment]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    fn rows() -> Vec<Experiment> {
        vec![
            experiment("exp-1", json!({"epochs": 2, "lr": 0.1, "opt": "sgd"})),
            experiment("exp-2", json!({"epochs": 1, "lr": 0.1, "opt": "adam"})),
            experiment("exp-3", json!({"epochs": 2, "lr": 0.01})),
            experiment("exp-4", json!({"epochs": 1, "lr": 0.01, "opt": "adam"})),
        ]
    }

    #[test]
    fn empty_definitions_leave_rows_untouched() {
        let sorted = sort_experiments(&[], rows());
        assert_eq!(ids(&sorted), vec!["exp-1", "exp-2", "exp-3", "exp-4"]);
    }

    #[test]
    fn sorts_ascending_and_descending() {
        let sorted = sort_experiments(&[SortDefinition::new(param("epochs"), false)], rows());
        assert_eq!(ids(&sorted), vec!["exp-2", "exp-4", "exp-1", "exp-3"]);
        let sorted = sort_experiments(&[SortDefinition::new(param("epochs"), true)], rows());
        assert_eq!(ids(&sorted), vec!["exp-1", "exp-3", "exp-2", "exp-4"]);
    }

    #[test]
    fn later_definitions_break_earlier_ties() {
        let sorts = [
            SortDefinition::new(param("epochs"), true),
            SortDefinition::new(param("lr"), false),
        ];
        let sorted = sort_experiments(&sorts, rows());
        assert_eq!(ids(&sorted), vec!["exp-3", "exp-1", "exp-4", "exp-2"]);
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let sorted = sort_experiments(&[SortDefinition::new(param("opt"), false)], rows());
        assert_eq!(ids(&sorted), vec!["exp-2", "exp-4", "exp-1", "exp-3"]);
        let sorted = sort_experiments(&[SortDefinition::new(param("opt"), true)], rows());
        assert_eq!(ids(&sorted), vec!["exp-1", "exp-2", "exp-4", "exp-3"]);
        let missing = sort_experiments(&[SortDefinition::new(param("nope"), true)], rows());
        assert_eq!(ids(&missing), vec!["exp-1", "exp-2", "exp-3", "exp-4"]);
    }

    #[test]
    fn numeric_strings_sort_by_value() {
        let rows = vec![
            experiment("text", json!({"size": "large"})),
            experiment("ten", json!({"size": 10})),
            experiment("two", json!({"size": "2"})),
            experiment("blank", json!({"size": ""})),
            experiment("three", json!({"size": 3.5})),
        ];
        let sorted = sort_experiments(&[SortDefinition::new(param("size"), false)], rows.clone());
        assert_eq!(ids(&sorted), vec!["two", "three", "ten", "blank", "text"]);
        let sorted = sort_experiments(&[SortDefinition::new(param("size"), true)], rows);
        assert_eq!(ids(&sorted), vec!["text", "blank", "ten", "three", "two"]);
    }

    #[test]
    fn sorting_is_idempotent() {
        let sorts = [
            SortDefinition::new(param("lr"), true),
            SortDefinition::new(param("opt"), false),
        ];
        let once = sort_experiments(&sorts, rows());
        let once_ids: Vec<String> = once.iter().map(|r| r.id.clone()).collect();
        let twice = sort_experiments(&sorts, once);
        assert_eq!(ids(&twice), once_ids.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
