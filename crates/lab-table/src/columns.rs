use crate::paths::join_column_path;
use crate::record::{ExperimentRecord, FileTrees, RepoOutput, METRICS, PARAMS};
use crate::value::{Primitive, PrimitiveType, Value, ValueTree};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub path: String,
    pub ancestors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<PrimitiveType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_string_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_columns: Option<Vec<Column>>,
}

impl Column {
    pub fn is_leaf(&self) -> bool {
        self.types.is_some()
    }
}

#[derive(Debug, Default)]
struct ColumnDescriptor {
    types: Option<IndexSet<PrimitiveType>>,
    max_string_length: Option<usize>,
    min_number: Option<f64>,
    max_number: Option<f64>,
    child_columns: Option<DescriptorMap>,
}

type DescriptorMap = IndexMap<String, ColumnDescriptor>;

impl ColumnDescriptor {
    fn merge(&mut self, value: &Value) {
        match value {
            Value::Tree(tree) => {
                merge_tree(self.child_columns.get_or_insert_with(DescriptorMap::new), tree)
            }
            Value::Primitive(primitive) => self.merge_primitive(primitive),
        }
    }

    fn merge_primitive(&mut self, primitive: &Primitive) {
        self.types
            .get_or_insert_with(IndexSet::new)
            .insert(primitive.type_tag());

        let length = primitive.to_string().chars().count();
        if self.max_string_length.map_or(true, |max| max < length) {
            self.max_string_length = Some(length);
        }

        if let Primitive::Number(n) = primitive {
            if self.max_number.map_or(true, |max| max < *n) {
                self.max_number = Some(*n);
            }
            if self.min_number.map_or(true, |min| min > *n) {
                self.min_number = Some(*n);
            }
        }
    }

    fn merge_files(&mut self, files: &FileTrees) {
        let children = self.child_columns.get_or_insert_with(DescriptorMap::new);
        for (file, tree) in files {
            let file_descriptor = children.entry(file.clone()).or_default();
            merge_tree(file_descriptor.child_columns.get_or_insert_with(DescriptorMap::new), tree);
        }
    }
}

fn merge_tree(map: &mut DescriptorMap, tree: &ValueTree) {
    for (key, value) in tree {
        map.entry(key.clone()).or_default().merge(value);
    }
}

fn finalize(name: &str, descriptor: ColumnDescriptor, ancestors: &[String]) -> Column {
    let mut own_path = ancestors.to_vec();
    own_path.push(name.to_string());

    // a descriptor fed both objects and primitives keeps both halves
    let child_columns = descriptor.child_columns.map(|children| {
        children
            .into_iter()
            .map(|(child_name, child)| finalize(&child_name, child, &own_path))
            .collect()
    });

    Column {
        name: name.to_string(),
        path: join_column_path(&own_path),
        ancestors: ancestors.to_vec(),
        types: descriptor.types.map(|types| types.into_iter().collect()),
        max_string_length: descriptor.max_string_length,
        min_number: descriptor.min_number,
        max_number: descriptor.max_number,
        child_columns,
    }
}

fn records(output: &RepoOutput) -> impl Iterator<Item = &ExperimentRecord> {
    output
        .values()
        .flat_map(|branch| std::iter::once(&branch.baseline).chain(branch.experiments.values()))
}

/// Infers the `params` and `metrics` column trees. A category no record
/// contributes to is omitted.
pub fn build_columns(output: &RepoOutput) -> Vec<Column> {
    let mut params: Option<ColumnDescriptor> = None;
    let mut metrics: Option<ColumnDescriptor> = None;

    for record in records(output) {
        if let Some(files) = &record.params {
            params.get_or_insert_with(ColumnDescriptor::default).merge_files(files);
        }
        if let Some(files) = &record.metrics {
            metrics.get_or_insert_with(ColumnDescriptor::default).merge_files(files);
        }
    }

    let mut columns = Vec::new();
    if let Some(descriptor) = params {
        columns.push(finalize(PARAMS, descriptor, &[]));
    }
    if let Some(descriptor) = metrics {
        columns.push(finalize(METRICS, descriptor, &[]));
    }
    columns
}

pub fn flatten_leaf_columns(columns: &[Column]) -> Vec<Column> {
    let mut leaves = Vec::new();
    collect_leaves(columns, &mut leaves);
    leaves
}

fn collect_leaves(columns: &[Column], leaves: &mut Vec<Column>) {
    for column in columns {
        if column.is_leaf() {
            leaves.push(column.clone());
        }
        if let Some(children) = &column.child_columns {
            collect_leaves(children, leaves);
        }
    }
}
