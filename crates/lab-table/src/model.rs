use crate::checkpoints::nest_and_flatten_sub_rows;
use crate::colors::{collect_colors, default_palette, Colors};
use crate::columns::{build_columns, flatten_leaf_columns, Column};
use crate::error::{TableError, TableResult};
use crate::filter::{build_filter, filter_id, FilterDefinition};
use crate::record::{Experiment, RepoOutput, WORKSPACE_ID};
use crate::sort::{sort_experiments, SortDefinition};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

pub const MAX_SELECTED_EXPERIMENTS: usize = 7;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub sorts: Vec<SortDefinition>,
    #[serde(default)]
    pub colors: Colors,
    #[serde(default)]
    pub selected_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub filter_driven_selection: bool,
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState {
            filters: Vec::new(),
            sorts: Vec::new(),
            colors: Colors::with_palette(default_palette()),
            selected_ids: Vec::new(),
            filter_driven_selection: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub rows: Vec<Experiment>,
    pub columns: Vec<Column>,
    pub filters: Vec<FilterDefinition>,
    pub sorts: Vec<SortDefinition>,
    pub colors: Colors,
    pub selected_ids: Vec<String>,
    pub filter_driven_selection: bool,
    pub row_count: usize,
    pub filtered_count: usize,
}

#[derive(Debug, Clone)]
pub struct TableModel {
    data: Option<RepoOutput>,
    previous: Option<RepoOutput>,
    rows: Vec<Experiment>,
    columns: Vec<Column>,
    leaf_columns: Vec<Column>,
    filters: IndexMap<String, FilterDefinition>,
    sorts: Vec<SortDefinition>,
    palette: Vec<String>,
    colors: Colors,
    selected: Vec<String>,
    filter_driven_selection: bool,
}

impl Default for TableModel {
    fn default() -> Self {
        TableModel::revive(PersistedState::default())
    }
}

fn validate_path(path: &str) -> TableResult<()> {
    if path.trim().is_empty() {
        return Err(TableError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn collect_rows(data: &RepoOutput) -> TableResult<Vec<Experiment>> {
    let workspace = data.get_key_value(WORKSPACE_ID);
    let branches = data.iter().filter(|(id, _)| id.as_str() != WORKSPACE_ID);

    let mut rows = Vec::with_capacity(data.len());
    for (id, branch) in workspace.into_iter().chain(branches) {
        let mut baseline = Experiment::from_record(id, branch.baseline.clone());
        baseline.sub_rows = branch
            .experiments
            .iter()
            .map(|(exp_id, record)| Experiment::from_record(exp_id, record.clone()))
            .collect();
        rows.extend(nest_and_flatten_sub_rows(baseline)?);
    }
    Ok(rows)
}

fn count_rows(rows: &[Experiment]) -> usize {
    rows.iter().map(|row| 1 + count_rows(&row.sub_rows)).sum()
}

fn prune<F>(mut row: Experiment, predicate: &F) -> Option<Experiment>
where
    F: Fn(&Experiment) -> bool,
{
    let checkpoints = std::mem::take(&mut row.sub_rows);
    row.sub_rows = checkpoints
        .into_iter()
        .filter_map(|checkpoint| prune(checkpoint, predicate))
        .collect();
    if row.sub_rows.is_empty() && !predicate(&row) {
        return None;
    }
    Some(row)
}

fn paint(row: &mut Experiment, colors: &Colors) {
    row.display_color = colors.color_of(&row.id).map(str::to_string);
    for child in &mut row.sub_rows {
        paint(child, colors);
    }
}

impl TableModel {
    pub fn new() -> Self {
        TableModel::default()
    }

    pub fn revive(state: PersistedState) -> Self {
        let mut filters = IndexMap::new();
        for filter in state.filters {
            filters.insert(filter_id(&filter), filter);
        }
        TableModel {
            data: None,
            previous: None,
            rows: Vec::new(),
            columns: Vec::new(),
            leaf_columns: Vec::new(),
            filters,
            sorts: state.sorts,
            palette: default_palette(),
            colors: state.colors,
            selected: state.selected_ids,
            filter_driven_selection: state.filter_driven_selection,
        }
    }

    pub fn with_palette(mut self, palette: Vec<String>) -> Self {
        if self.colors.assigned.is_empty() {
            self.colors.available = palette.clone();
        }
        self.palette = palette;
        self
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            filters: self.filters(),
            sorts: self.sorts.clone(),
            colors: self.colors.clone(),
            selected_ids: self.selected.clone(),
            filter_driven_selection: self.filter_driven_selection,
        }
    }

    /// Replaces the row and column state with a new tracker output. On error
    /// the previous state is left untouched.
    pub fn transform_and_set(&mut self, data: RepoOutput) -> TableResult<()> {
        let rows = collect_rows(&data)?;
        let columns = build_columns(&data);

        self.leaf_columns = flatten_leaf_columns(&columns);
        self.columns = columns;
        self.rows = rows;
        self.previous = self.data.replace(data);

        if self.filter_driven_selection {
            self.select_by_filters();
        } else {
            let present = self.selectable_ids();
            self.selected.retain(|id| present.contains(id));
        }
        self.update_colors();

        debug!(
            rows = count_rows(&self.rows),
            columns = self.leaf_columns.len(),
            selected = self.selected.len(),
            "table updated"
        );
        Ok(())
    }

    pub fn data(&self) -> Option<&RepoOutput> {
        self.data.as_ref()
    }

    pub fn previous_data(&self) -> Option<&RepoOutput> {
        self.previous.as_ref()
    }

    fn all_rows(&self) -> Vec<&Experiment> {
        let mut out = Vec::new();
        for row in &self.rows {
            row.walk(&mut out);
        }
        out
    }

    fn selectable_ids(&self) -> HashSet<String> {
        self.all_rows()
            .into_iter()
            .filter(|r| !r.is_queued())
            .map(|r| r.id.clone())
            .collect()
    }

    fn select_by_filters(&mut self) {
        let visible = self.rows();
        let selected: Vec<String> = if self.filters.is_empty() {
            visible.iter().map(|row| row.id.clone()).collect()
        } else {
            let filters = self.filters();
            let predicate = build_filter(&filters);
            let mut walked = Vec::new();
            for row in &visible {
                row.walk(&mut walked);
            }
            walked
                .into_iter()
                .filter(|&row| !row.is_queued() && predicate(row))
                .map(|row| row.id.clone())
                .collect()
        };
        if selected.len() > MAX_SELECTED_EXPERIMENTS {
            debug!(
                matched = selected.len(),
                max = MAX_SELECTED_EXPERIMENTS,
                "filter-driven selection capped"
            );
        }
        self.selected = selected.into_iter().take(MAX_SELECTED_EXPERIMENTS).collect();
    }

    fn update_colors(&mut self) {
        let palette = &self.palette;
        let colors = collect_colors(
            &self.selected,
            &self.colors.assigned,
            &self.colors.available,
            || palette.clone(),
        );
        self.colors = colors;
    }

    /// Pins the selection. Ids that are not a current row, or are queued,
    /// are skipped. More than [`MAX_SELECTED_EXPERIMENTS`] ids are
    /// truncated, and doing so leaves filter-driven mode.
    pub fn set_selected(&mut self, ids: Vec<String>) {
        let selectable = self.selectable_ids();
        let mut unique: Vec<String> = ids
            .into_iter()
            .filter(|id| selectable.contains(id))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        if unique.len() > MAX_SELECTED_EXPERIMENTS {
            warn!(
                requested = unique.len(),
                max = MAX_SELECTED_EXPERIMENTS,
                "selection truncated; filter-driven selection disabled"
            );
            unique.truncate(MAX_SELECTED_EXPERIMENTS);
            self.filter_driven_selection = false;
        }
        self.selected = unique;
        self.update_colors();
    }

    pub fn set_filter_driven_selection(&mut self, enabled: bool) {
        self.filter_driven_selection = enabled;
        if enabled {
            self.select_by_filters();
            self.update_colors();
        }
    }

    pub fn is_filter_driven(&self) -> bool {
        self.filter_driven_selection
    }

    fn filters_changed(&mut self) {
        if self.filter_driven_selection {
            self.select_by_filters();
            self.update_colors();
        }
    }

    pub fn add_filter(&mut self, filter: FilterDefinition) -> TableResult<String> {
        validate_path(&filter.path)?;
        let id = filter_id(&filter);
        self.filters.insert(id.clone(), filter);
        self.filters_changed();
        Ok(id)
    }

    pub fn remove_filter(&mut self, id: &str) -> bool {
        let removed = self.filters.shift_remove(id).is_some();
        if removed {
            self.filters_changed();
        }
        removed
    }

    pub fn remove_filters(&mut self, ids: &[String]) -> usize {
        let before = self.filters.len();
        self.filters.retain(|id, _| !ids.contains(id));
        let removed = before - self.filters.len();
        if removed > 0 {
            self.filters_changed();
        }
        removed
    }

    pub fn remove_filters_by_path(&mut self, path: &str) -> usize {
        let before = self.filters.len();
        self.filters.retain(|_, filter| filter.path != path);
        let removed = before - self.filters.len();
        if removed > 0 {
            self.filters_changed();
        }
        removed
    }

    pub fn filters(&self) -> Vec<FilterDefinition> {
        self.filters.values().cloned().collect()
    }

    pub fn filter_paths(&self) -> Vec<String> {
        self.filters
            .values()
            .map(|f| f.path.clone())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn add_sort(&mut self, sort: SortDefinition) -> TableResult<()> {
        validate_path(&sort.path)?;
        self.sorts.retain(|s| s.path != sort.path);
        self.sorts.push(sort);
        Ok(())
    }

    pub fn remove_sort(&mut self, path: &str) -> bool {
        let before = self.sorts.len();
        self.sorts.retain(|s| s.path != path);
        before != self.sorts.len()
    }

    pub fn sorts(&self) -> &[SortDefinition] {
        &self.sorts
    }

    /// Visible rows in display order. Experiments directly under a branch
    /// are filtered and sorted. A row is kept when it passes the filters or
    /// when one of its checkpoints does; checkpoints are filtered but never
    /// reordered.
    pub fn rows(&self) -> Vec<Experiment> {
        let filters = self.filters();
        let predicate = build_filter(&filters);
        self.rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                let experiments = std::mem::take(&mut row.sub_rows);
                let kept: Vec<Experiment> = if filters.is_empty() {
                    experiments
                } else {
                    experiments
                        .into_iter()
                        .filter_map(|experiment| prune(experiment, &predicate))
                        .collect()
                };
                row.sub_rows = sort_experiments(&self.sorts, kept);
                paint(&mut row, &self.colors);
                row
            })
            .collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn leaf_columns(&self) -> &[Column] {
        &self.leaf_columns
    }

    pub fn selected_ids(&self) -> &[String] {
        &self.selected
    }

    pub fn colors(&self) -> &Colors {
        &self.colors
    }

    pub fn row_count(&self) -> usize {
        count_rows(&self.rows)
    }

    /// Rows, including their checkpoints, hidden by the current filters.
    pub fn filtered_count(&self) -> usize {
        if self.filters.is_empty() {
            return 0;
        }
        self.row_count().saturating_sub(count_rows(&self.rows()))
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            rows: self.rows(),
            columns: self.columns.clone(),
            filters: self.filters(),
            sorts: self.sorts.clone(),
            colors: self.colors.clone(),
            selected_ids: self.selected.clone(),
            filter_driven_selection: self.filter_driven_selection,
            row_count: self.row_count(),
            filtered_count: self.filtered_count(),
        }
    }
}
