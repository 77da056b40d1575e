use crate::error::{TableError, TableResult};
use crate::record::Experiment;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, warn};

struct Arena {
    nodes: Vec<Option<Experiment>>,
    children: Vec<Vec<usize>>,
    top_level: Vec<usize>,
}

impl Arena {
    fn nest(baseline_id: &str, flat: Vec<Experiment>) -> TableResult<Arena> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(flat.len());
        let mut orphans: IndexMap<String, Vec<usize>> = IndexMap::new();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
        let mut top_level = Vec::new();

        for (idx, node) in flat.iter().enumerate() {
            match node.record.checkpoint_parent.as_deref() {
                None => top_level.push(idx),
                Some(parent) if parent == baseline_id => top_level.push(idx),
                Some(parent) => match index.get(parent) {
                    Some(&parent_idx) => children[parent_idx].push(idx),
                    None => orphans.entry(parent.to_string()).or_default().push(idx),
                },
            }
            index.insert(node.id.clone(), idx);
            if let Some(adopted) = orphans.shift_remove(&node.id) {
                children[idx].extend(adopted);
            }
        }

        if !orphans.is_empty() {
            let parents: Vec<String> = orphans.keys().cloned().collect();
            debug!(
                baseline = baseline_id,
                orphaned = orphans.values().map(Vec::len).sum::<usize>(),
                "checkpoint parents missing from branch"
            );
            return Err(TableError::OrphanedCheckpoints { parents });
        }

        Ok(Arena {
            nodes: flat.into_iter().map(Some).collect(),
            children,
            top_level,
        })
    }

    fn compact(&mut self, idx: usize) -> Option<Experiment> {
        let mut node = self.nodes[idx].take()?;
        let children = std::mem::take(&mut self.children[idx]);
        match children.len() {
            0 => {}
            1 => node.sub_rows = self.chain(children[0]),
            _ => {
                node.sub_rows = children
                    .into_iter()
                    .rev()
                    .filter_map(|child| self.compact(child))
                    .collect()
            }
        }
        Some(node)
    }

    /// Flattens a single-child run starting at `idx`: the deepest node comes
    /// first, then each ancestor back up to `idx`. A branch point ends the run
    /// and is kept as a nested row.
    fn chain(&mut self, mut idx: usize) -> Vec<Experiment> {
        let mut run = Vec::new();
        let tail = loop {
            if self.children[idx].len() == 1 {
                run.push(idx);
                idx = self.children[idx][0];
                continue;
            }
            break self.compact(idx);
        };
        let mut out: Vec<Experiment> = tail.into_iter().collect();
        out.extend(run.into_iter().rev().filter_map(|i| self.nodes[i].take()));
        out
    }
}

/// Nests the baseline's flat `sub_rows` by `checkpoint_parent` and compacts
/// the result. Returns the baseline as the single top-level row.
///
/// Fails with [`TableError::OrphanedCheckpoints`] when a parent id is neither
/// the baseline nor any row in the list.
pub fn nest_and_flatten_sub_rows(mut baseline: Experiment) -> TableResult<Vec<Experiment>> {
    let flat = std::mem::take(&mut baseline.sub_rows);
    let total = flat.len();
    let mut arena = Arena::nest(&baseline.id, flat)?;

    let top_level = std::mem::take(&mut arena.top_level);
    baseline.sub_rows = top_level
        .into_iter()
        .filter_map(|idx| arena.compact(idx))
        .collect();

    let unreachable = arena.nodes.iter().filter(|n| n.is_some()).count();
    if unreachable > 0 {
        warn!(
            baseline = %baseline.id,
            unreachable,
            total,
            "dropping checkpoints caught in a parent cycle"
        );
    }
    Ok(vec![baseline])
}
