use crate::value::{Primitive, Value, ValueTree};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;

pub const WORKSPACE_ID: &str = "workspace";
pub const PARAMS: &str = "params";
pub const METRICS: &str = "metrics";

const SHORT_SHA_LENGTH: usize = 7;

pub type FileTrees = IndexMap<String, ValueTree>;

pub type RepoOutput = IndexMap<String, BranchOutput>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_files",
        skip_serializing_if = "Option::is_none"
    )]
    pub params: Option<FileTrees>,
    #[serde(
        default,
        deserialize_with = "deserialize_files",
        skip_serializing_if = "Option::is_none"
    )]
    pub metrics: Option<FileTrees>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchOutput {
    pub baseline: ExperimentRecord,
    #[serde(flatten)]
    pub experiments: IndexMap<String, ExperimentRecord>,
}

fn deserialize_files<'de, D>(deserializer: D) -> Result<Option<FileTrees>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(narrow_files))
}

/// Unwraps `{"data": ...}` file entries and drops files that only carry an error.
fn narrow_files(raw: IndexMap<String, serde_json::Value>) -> FileTrees {
    let mut out = FileTrees::new();
    for (file, content) in raw {
        let serde_json::Value::Object(mut map) = content else {
            continue;
        };
        let wrapped = map.contains_key("data") && map.keys().all(|k| k == "data" || k == "error");
        if wrapped {
            if let Some(serde_json::Value::Object(data)) = map.remove("data") {
                out.insert(file, data.into_iter().map(|(k, v)| (k, Value::from(v))).collect());
            }
            continue;
        }
        if map.len() == 1 && map.contains_key("error") {
            continue;
        }
        out.insert(file, map.into_iter().map(|(k, v)| (k, Value::from(v))).collect());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Experiment {
    pub id: String,
    pub display_name: String,
    #[serde(flatten)]
    pub record: ExperimentRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_rows: Vec<Experiment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_color: Option<String>,
}

impl Experiment {
    pub fn from_record(id: &str, record: ExperimentRecord) -> Self {
        let display_name = match &record.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ if id == WORKSPACE_ID => WORKSPACE_ID.to_string(),
            _ => id.chars().take(SHORT_SHA_LENGTH).collect(),
        };
        Experiment {
            id: id.to_string(),
            display_name,
            record,
            sub_rows: Vec::new(),
            display_color: None,
        }
    }

    pub fn is_queued(&self) -> bool {
        self.record.queued.unwrap_or(false)
    }

    pub fn tags(&self) -> &[String] {
        self.record.tags.as_deref().unwrap_or(&[])
    }

    fn files(&self, category: &str) -> Option<&FileTrees> {
        match category {
            PARAMS => self.record.params.as_ref(),
            METRICS => self.record.metrics.as_ref(),
            _ => None,
        }
    }

    /// Resolves split column path segments against this row.
    ///
    /// `None` is a resolution miss; callers decide per operator what a miss means.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Option<Cow<'_, Value>> {
        let (head, rest) = segments.split_first()?;
        let head = head.as_ref();
        if let Some(files) = self.files(head) {
            return match rest.split_first() {
                None => Some(Cow::Owned(Value::Tree(
                    files
                        .iter()
                        .map(|(file, tree)| (file.clone(), Value::Tree(tree.clone())))
                        .collect(),
                ))),
                Some((file, keys)) => {
                    let tree = files.get(file.as_ref())?;
                    let (first, keys) = match keys.split_first() {
                        Some(split) => split,
                        None => return Some(Cow::Owned(Value::Tree(tree.clone()))),
                    };
                    tree.get(first.as_ref())?.resolve(keys).map(Cow::Borrowed)
                }
            };
        }
        if !rest.is_empty() {
            return None;
        }
        let primitive = match head {
            "id" => Primitive::String(self.id.clone()),
            "name" => Primitive::String(self.record.name.clone()?),
            "display_name" => Primitive::String(self.display_name.clone()),
            "timestamp" => Primitive::String(self.record.timestamp.clone()?),
            "queued" => Primitive::Bool(self.record.queued?),
            "running" => Primitive::Bool(self.record.running?),
            "checkpoint_tip" => Primitive::String(self.record.checkpoint_tip.clone()?),
            "checkpoint_parent" => Primitive::String(self.record.checkpoint_parent.clone()?),
            _ => return None,
        };
        Some(Cow::Owned(Value::Primitive(primitive)))
    }

    pub fn walk<'a>(&'a self, out: &mut Vec<&'a Experiment>) {
        out.push(self);
        for child in &self.sub_rows {
            child.walk(out);
        }
    }
}
