use crate::error::TableError;
use crate::paths::split_column_path;
use crate::record::Experiment;
use crate::value::{Primitive, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Reserved path for the multi-valued commit tags field.
pub const TAGS_PATH: &str = "tags";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    NotMissing,
    Contains,
    NotContains,
    IsTrue,
    IsFalse,
    BeforeDate,
    AfterDate,
    OnDate,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "≠",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::NotMissing => "≠Ø",
            Operator::Contains => "∈",
            Operator::NotContains => "∉",
            Operator::IsTrue => "⊤",
            Operator::IsFalse => "⊥",
            Operator::BeforeDate => "<d",
            Operator::AfterDate => ">d",
            Operator::OnDate => "=d",
        }
    }
}

impl FromStr for Operator {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "=" | "==" => Operator::Equal,
            "≠" | "!=" => Operator::NotEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            "≠Ø" => Operator::NotMissing,
            "∈" => Operator::Contains,
            "∉" | "!∈" => Operator::NotContains,
            "⊤" => Operator::IsTrue,
            "⊥" => Operator::IsFalse,
            "<d" => Operator::BeforeDate,
            ">d" => Operator::AfterDate,
            "=d" => Operator::OnDate,
            other => return Err(TableError::UnknownOperator(other.to_string())),
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub path: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Primitive>,
}

impl FilterDefinition {
    pub fn new(path: impl Into<String>, operator: Operator, value: Option<Primitive>) -> Self {
        FilterDefinition {
            path: path.into(),
            operator,
            value,
        }
    }
}

pub fn filter_id(filter: &FilterDefinition) -> String {
    let value = filter
        .value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    format!("{}{}{}", filter.path, filter.operator, value)
}

fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// Compares two date strings by calendar day in UTC; time of day is ignored.
/// Unparseable operands never match.
pub fn compare_date_strings(value: &str, operator: Operator, filter_value: &str) -> bool {
    let (Some(a), Some(b)) = (parse_calendar_date(value), parse_calendar_date(filter_value)) else {
        return false;
    };
    match operator {
        Operator::BeforeDate | Operator::LessThan => a < b,
        Operator::AfterDate | Operator::GreaterThan => a > b,
        Operator::OnDate | Operator::Equal => a == b,
        _ => false,
    }
}

fn both_strings<'a>(
    value: &'a Value,
    filter_value: Option<&'a Primitive>,
) -> Option<(&'a str, &'a str)> {
    let value = value.as_primitive()?.as_str()?;
    let filter_value = filter_value?.as_str()?;
    Some((value, filter_value))
}

fn loose_eq(value: &Value, filter_value: Option<&Primitive>) -> bool {
    match (value.as_primitive(), filter_value) {
        (Some(v), Some(f)) => v.loose_eq(f),
        (Some(Primitive::Null), None) => true,
        _ => false,
    }
}

fn loose_cmp(value: &Value, filter_value: Option<&Primitive>) -> Option<Ordering> {
    value.as_primitive()?.loose_cmp(filter_value?)
}

/// Evaluates one operator. A missing value fails everything except `≠Ø`.
pub fn evaluate(
    value: Option<&Value>,
    operator: Operator,
    filter_value: Option<&Primitive>,
) -> bool {
    let Some(value) = value else {
        return false;
    };
    match operator {
        Operator::NotMissing => true,
        Operator::Equal => loose_eq(value, filter_value),
        Operator::NotEqual => !loose_eq(value, filter_value),
        Operator::GreaterThan => loose_cmp(value, filter_value) == Some(Ordering::Greater),
        Operator::GreaterThanOrEqual => matches!(
            loose_cmp(value, filter_value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::LessThan => loose_cmp(value, filter_value) == Some(Ordering::Less),
        Operator::LessThanOrEqual => matches!(
            loose_cmp(value, filter_value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Contains => {
            both_strings(value, filter_value).map_or(false, |(v, f)| v.contains(f))
        }
        Operator::NotContains => {
            both_strings(value, filter_value).map_or(false, |(v, f)| !v.contains(f))
        }
        Operator::IsTrue => value.as_primitive().and_then(Primitive::as_bool) == Some(true),
        Operator::IsFalse => value.as_primitive().and_then(Primitive::as_bool) == Some(false),
        Operator::BeforeDate | Operator::AfterDate | Operator::OnDate => {
            both_strings(value, filter_value)
                .map_or(false, |(v, f)| compare_date_strings(v, operator, f))
        }
    }
}

/// Tags are an exclusion filter: untagged rows pass, tagged rows pass only
/// when no tag matches.
fn evaluate_tags(experiment: &Experiment, filter: &FilterDefinition) -> bool {
    let tags = experiment.tags();
    if tags.is_empty() {
        return true;
    }
    !tags.iter().any(|tag| {
        let tag = Value::Primitive(Primitive::String(tag.clone()));
        evaluate(Some(&tag), filter.operator, filter.value.as_ref())
    })
}

struct CompiledFilter<'a> {
    segments: Vec<String>,
    definition: &'a FilterDefinition,
}

impl CompiledFilter<'_> {
    fn passes(&self, experiment: &Experiment) -> bool {
        if self.definition.path == TAGS_PATH {
            return evaluate_tags(experiment, self.definition);
        }
        let value = experiment.resolve(self.segments.as_slice());
        evaluate(
            value.as_deref(),
            self.definition.operator,
            self.definition.value.as_ref(),
        )
    }
}

pub fn build_filter(filters: &[FilterDefinition]) -> impl Fn(&Experiment) -> bool + '_ {
    let compiled: Vec<CompiledFilter<'_>> = filters
        .iter()
        .map(|definition| CompiledFilter {
            segments: split_column_path(&definition.path),
            definition,
        })
        .collect();
    move |experiment| compiled.iter().all(|filter| filter.passes(experiment))
}

pub fn filter_experiment<'a>(
    filters: &[FilterDefinition],
    experiment: &'a Experiment,
) -> Option<&'a Experiment> {
    if filters.is_empty() {
        return Some(experiment);
    }
    build_filter(filters)(experiment).then_some(experiment)
}

#[derive(Debug, Default)]
pub struct SplitExperiments {
    pub kept: Vec<Experiment>,
    pub filtered: Vec<Experiment>,
}

pub fn split_experiments_by_filters(
    filters: &[FilterDefinition],
    experiments: Vec<Experiment>,
) -> SplitExperiments {
    if filters.is_empty() {
        return SplitExperiments {
            kept: experiments,
            filtered: Vec::new(),
        };
    }
    let predicate = build_filter(filters);
    let (kept, filtered): (Vec<_>, Vec<_>) = experiments.into_iter().partition(|e| predicate(e));
    SplitExperiments { kept, filtered }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::join_column_path;
    use crate::record::ExperimentRecord;
    use serde_json::json;

    fn experiments() -> Vec<Experiment> {
        let rows = [
            ("1", json!({"timestamp": "2022-01-01T10:00:00", "tags": ["v1.0"],
                "params": {"params.yaml": {"bool": true, "filter": 1, "text": "abcdefghijklmnop"}}})),
            ("2", json!({"timestamp": "2022-06-15T23:59:59",
                "params": {"params.yaml": {"bool": false, "filter": 2, "text": "fun"}}})),
            ("3", json!({"timestamp": "2023-01-01T00:00:01", "tags": ["nightly", "keep"],
                "params": {"params.yaml": {"bool": null, "filter": 3, "text": "not missing"}}})),
        ];
        rows.into_iter()
            .map(|(id, record)| {
                let record: ExperimentRecord = serde_json::from_value(record).expect("record");
                Experiment::from_record(id, record)
            })
            .collect()
    }

    fn param(key: &str) -> String {
        join_column_path(&["params", "params.yaml", key])
    }

    fn ids(filters: &[FilterDefinition]) -> Vec<String> {
        split_experiments_by_filters(filters, experiments())
            .kept
            .into_iter()
            .map(|e| e.id)
            .collect()
    }

    #[test]
    fn comparison_operators_coerce_numeric_strings() {
        let gt = FilterDefinition::new(param("filter"), Operator::GreaterThan, Some("2".into()));
        assert_eq!(ids(&[gt]), vec!["3"]);
        let eq = FilterDefinition::new(param("filter"), Operator::Equal, Some("2".into()));
        assert_eq!(ids(&[eq]), vec!["2"]);
        let ne = FilterDefinition::new(param("filter"), Operator::NotEqual, Some("2".into()));
        assert_eq!(ids(&[ne]), vec!["1", "3"]);
        let le =
            FilterDefinition::new(param("filter"), Operator::LessThanOrEqual, Some(2.0.into()));
        assert_eq!(ids(&[le]), vec!["1", "2"]);
    }

    #[test]
    fn missing_values_fail_everything_but_not_missing() {
        let path = join_column_path(&["metrics", "metrics.json", "acc"]);
        for operator in [
            Operator::IsFalse,
            Operator::NotEqual,
            Operator::LessThan,
            Operator::NotContains,
        ] {
            let filter = FilterDefinition::new(path.clone(), operator, Some("x".into()));
            assert!(ids(&[filter]).is_empty(), "operator {}", operator);
        }
        let not_missing = FilterDefinition::new(param("bool"), Operator::NotMissing, None);
        assert_eq!(ids(&[not_missing]), vec!["1", "2", "3"]);
        let absent = FilterDefinition::new(path, Operator::NotMissing, None);
        assert!(ids(&[absent]).is_empty());
    }

    #[test]
    fn booleans_and_substrings_are_strict() {
        let is_true = FilterDefinition::new(param("bool"), Operator::IsTrue, None);
        assert_eq!(ids(&[is_true]), vec!["1"]);
        let is_false = FilterDefinition::new(param("bool"), Operator::IsFalse, None);
        assert_eq!(ids(&[is_false]), vec!["2"]);
        let contains = FilterDefinition::new(param("text"), Operator::Contains, Some("def".into()));
        assert_eq!(ids(&[contains]), vec!["1"]);
        let not_contains =
            FilterDefinition::new(param("text"), Operator::NotContains, Some("def".into()));
        assert_eq!(ids(&[not_contains]), vec!["2", "3"]);
        let numeric_contains =
            FilterDefinition::new(param("filter"), Operator::Contains, Some("1".into()));
        assert!(ids(&[numeric_contains]).is_empty());
    }

    #[test]
    fn definitions_are_anded() {
        let rows = experiments();
        let gt = FilterDefinition::new(param("filter"), Operator::GreaterThan, Some(1.0.into()));
        let contains = FilterDefinition::new(param("text"), Operator::Contains, Some("fun".into()));
        assert_eq!(filter_experiment(&[], &rows[0]), Some(&rows[0]));
        assert_eq!(filter_experiment(&[gt.clone(), contains.clone()], &rows[1]), Some(&rows[1]));
        assert_eq!(filter_experiment(&[gt, contains], &rows[2]), None);
    }

    #[test]
    fn date_strings_compare_by_calendar_day() {
        assert!(!compare_date_strings("2022-01-01", Operator::GreaterThan, "2023-01-01"));
        assert!(compare_date_strings("2023-01-01", Operator::GreaterThan, "2022-01-01"));
        assert!(compare_date_strings(
            "2022-01-01T01:00:00",
            Operator::Equal,
            "2022-01-01T23:59:00"
        ));
        assert!(!compare_date_strings("not a date", Operator::OnDate, "2022-01-01"));

        let timestamp = "timestamp";
        let after =
            FilterDefinition::new(timestamp, Operator::AfterDate, Some("2022-01-01".into()));
        assert_eq!(ids(&[after]), vec!["2", "3"]);
        let on = FilterDefinition::new(timestamp, Operator::OnDate, Some("2022-06-15".into()));
        assert_eq!(ids(&[on]), vec!["2"]);
        let numeric = FilterDefinition::new(timestamp, Operator::BeforeDate, Some(2023.0.into()));
        assert!(ids(&[numeric]).is_empty());
    }

    #[test]
    fn tag_filters_exclude_matching_tags_only() {
        let nightly = FilterDefinition::new(TAGS_PATH, Operator::Equal, Some("nightly".into()));
        assert_eq!(ids(&[nightly]), vec!["1", "2"]);
        let versioned = FilterDefinition::new(TAGS_PATH, Operator::Contains, Some("v1".into()));
        assert_eq!(ids(&[versioned]), vec!["2", "3"]);
    }

    #[test]
    fn operators_parse_from_symbols_and_reject_unknown() {
        assert_eq!("≠Ø".parse::<Operator>(), Ok(Operator::NotMissing));
        assert_eq!("!=".parse::<Operator>(), Ok(Operator::NotEqual));
        assert_eq!(
            "~".parse::<Operator>(),
            Err(TableError::UnknownOperator("~".to_string()))
        );
        let parsed: FilterDefinition =
            serde_json::from_value(json!({"path": "timestamp", "operator": "<d", "value": "2022-01-01"}))
                .expect("parse filter");
        assert_eq!(parsed.operator, Operator::BeforeDate);
        let unknown = json!({"path": "x", "operator": "??"});
        assert!(serde_json::from_value::<FilterDefinition>(unknown).is_err());
        assert_eq!(filter_id(&parsed), "timestamp<d2022-01-01");
    }
}
