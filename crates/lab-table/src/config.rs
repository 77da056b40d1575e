use crate::colors::{default_palette, Colors};
use crate::filter::FilterDefinition;
use crate::model::{PersistedState, TableModel};
use crate::record::RepoOutput;
use crate::sort::SortDefinition;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const CONFIG_SCHEMA_VERSION: &str = "table_config_v1";

pub const CONFIG_TEMPLATE: &str = r##"schema_version: table_config_v1
# Filters are ANDed. Operators: = ≠ > >= < <= ≠Ø ∈ ∉ ⊤ ⊥ <d >d =d
filters:
  - path: "metrics:metrics.json:accuracy"
    operator: ">="
    value: 0.5
# Earlier sorts take priority.
sorts:
  - path: "params:params.yaml:epochs"
    descending: true
# Optional; defaults to the built-in seven colors.
# palette: ["#945dd6", "#13adc7", "#f46837"]
filter_driven_selection: true
"##;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub schema_version: String,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub sorts: Vec<SortDefinition>,
    #[serde(default)]
    pub palette: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub filter_driven_selection: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            filters: Vec::new(),
            sorts: Vec::new(),
            palette: None,
            filter_driven_selection: true,
        }
    }
}

impl TableConfig {
    pub fn palette(&self) -> Vec<String> {
        self.palette.clone().unwrap_or_else(default_palette)
    }

    pub fn build_model(&self, state: Option<PersistedState>) -> TableModel {
        let palette = self.palette();
        let state = state.unwrap_or_else(|| PersistedState {
            filters: self.filters.clone(),
            sorts: self.sorts.clone(),
            colors: Colors::with_palette(palette.clone()),
            selected_ids: Vec::new(),
            filter_driven_selection: self.filter_driven_selection,
        });
        TableModel::revive(state).with_palette(palette)
    }

    fn validate(&self) -> Result<()> {
        if self.schema_version != CONFIG_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported table config schema_version: {}",
                self.schema_version
            ));
        }
        if let Some(palette) = &self.palette {
            if palette.is_empty() {
                return Err(anyhow!("palette must list at least one color"));
            }
        }
        for filter in &self.filters {
            if filter.path.trim().is_empty() {
                return Err(anyhow!("filter is missing a path"));
            }
        }
        for sort in &self.sorts {
            if sort.path.trim().is_empty() {
                return Err(anyhow!("sort is missing a path"));
            }
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Loads a table config from YAML, or JSON when the file ends in `.json`.
pub fn load_table_config(path: &Path) -> Result<TableConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read table config {}", path.display()))?;
    let json_value: serde_json::Value = if is_json(path) {
        serde_json::from_str(&raw)?
    } else {
        let yaml_value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        serde_json::to_value(yaml_value)?
    };
    let config: TableConfig = serde_json::from_value(json_value)
        .with_context(|| format!("invalid table config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

pub fn write_config_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "config already exists: {} (use --force to overwrite)",
            path.display()
        ));
    }
    atomic_write_bytes(path, CONFIG_TEMPLATE.as_bytes())
}

pub fn load_repo_output(path: &Path) -> Result<RepoOutput> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read experiment output {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid experiment output {}", path.display()))
}

/// Missing state files are not an error; a fresh table has none yet.
pub fn load_state(path: &Path) -> Result<Option<PersistedState>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let state = serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid table state {}", path.display()))?;
    Ok(Some(state))
}

pub fn write_state(path: &Path, state: &PersistedState) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(state)?;
    atomic_write_bytes(path, &bytes)
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
