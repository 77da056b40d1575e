mod checkpoints;
mod colors;
mod columns;
mod config;
mod error;
mod filter;
mod model;
mod paths;
mod record;
mod sort;
mod value;

pub use checkpoints::nest_and_flatten_sub_rows;
pub use colors::{collect_colors, default_palette, Colors, COLORS};
pub use columns::{build_columns, flatten_leaf_columns, Column};
pub use config::{
    load_repo_output, load_state, load_table_config, write_config_template, write_state,
    TableConfig, CONFIG_SCHEMA_VERSION, CONFIG_TEMPLATE,
};
pub use error::{TableError, TableResult};
pub use filter::{
    build_filter, compare_date_strings, evaluate, filter_experiment, filter_id,
    split_experiments_by_filters, FilterDefinition, Operator, SplitExperiments, TAGS_PATH,
};
pub use model::{PersistedState, TableModel, TableSnapshot, MAX_SELECTED_EXPERIMENTS};
pub use paths::{
    append_column_path, join_column_path, split_column_path, FILE_SEPARATOR, KEY_SEPARATOR,
};
pub use record::{
    BranchOutput, Experiment, ExperimentRecord, FileTrees, RepoOutput, METRICS, PARAMS,
    WORKSPACE_ID,
};
pub use sort::{sort_experiments, SortDefinition};
pub use value::{format_number, Primitive, PrimitiveType, Value, ValueTree};
