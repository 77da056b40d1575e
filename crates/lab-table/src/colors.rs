use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const COLORS: [&str; 7] = [
    "#945dd6", "#13adc7", "#f46837", "#48bb78", "#4299e1", "#ed8936", "#f56565",
];

pub fn default_palette() -> Vec<String> {
    COLORS.iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colors {
    pub assigned: IndexMap<String, String>,
    pub available: Vec<String>,
}

impl Colors {
    pub fn with_palette(palette: Vec<String>) -> Self {
        Colors {
            assigned: IndexMap::new(),
            available: palette,
        }
    }

    pub fn color_of(&self, id: &str) -> Option<&str> {
        self.assigned.get(id).map(String::as_str)
    }
}

/// Assigns a color to every id in `ids`, keeping colors of ids already in
/// `current` and reclaiming colors of ids that left.
///
/// Reclaimed colors go to the front of the pool in reverse departure order,
/// so the most recently freed color is handed out next. When `ids` is empty
/// the pool resets to a fresh palette. An exhausted pool refills from
/// `reset_palette`, so colors cycle once there are more ids than colors.
pub fn collect_colors<F>(
    ids: &[String],
    current: &IndexMap<String, String>,
    unassigned: &[String],
    reset_palette: F,
) -> Colors
where
    F: Fn() -> Vec<String>,
{
    if ids.is_empty() {
        return Colors::with_palette(reset_palette());
    }

    let mut available: VecDeque<String> = unassigned.iter().cloned().collect();
    for (id, color) in current {
        if !ids.contains(id) {
            available.push_front(color.clone());
        }
    }

    let mut assigned = IndexMap::with_capacity(ids.len());
    for id in ids {
        if assigned.contains_key(id) {
            continue;
        }
        if let Some(color) = current.get(id) {
            assigned.insert(id.clone(), color.clone());
            continue;
        }
        if available.is_empty() {
            available.extend(reset_palette());
        }
        if let Some(color) = available.pop_front() {
            assigned.insert(id.clone(), color);
        }
    }

    Colors {
        assigned,
        available: available.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn assigned(colors: &Colors) -> Vec<(&str, &str)> {
        colors
            .assigned
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    #[test]
    fn fresh_ids_take_colors_in_palette_order() {
        let colors = collect_colors(
            &ids(&["exp-1", "exp-2"]),
            &IndexMap::new(),
            &default_palette(),
            default_palette,
        );
        assert_eq!(
            assigned(&colors),
            vec![("exp-1", COLORS[0]), ("exp-2", COLORS[1])]
        );
        assert_eq!(colors.available, default_palette()[2..].to_vec());
    }

    #[test]
    fn colors_stick_while_ids_remain() {
        let first = collect_colors(
            &ids(&["a", "b", "c"]),
            &IndexMap::new(),
            &default_palette(),
            default_palette,
        );
        let second = collect_colors(
            &ids(&["c", "new", "a"]),
            &first.assigned,
            &first.available,
            default_palette,
        );
        assert_eq!(second.color_of("a"), first.color_of("a"));
        assert_eq!(second.color_of("c"), first.color_of("c"));
        // b left, so its color is the first one handed out again
        assert_eq!(second.color_of("new"), first.color_of("b"));
    }

    #[test]
    fn departed_colors_are_reused_latest_first() {
        let first = collect_colors(
            &ids(&["a", "b", "c", "d"]),
            &IndexMap::new(),
            &default_palette(),
            default_palette,
        );
        let second =
            collect_colors(&ids(&["a"]), &first.assigned, &first.available, default_palette);
        assert_eq!(
            second.available[..3].to_vec(),
            vec![COLORS[3], COLORS[2], COLORS[1]]
        );
        assert_eq!(second.available.len() + second.assigned.len(), COLORS.len());
    }

    #[test]
    fn palette_cycles_when_exhausted() {
        let many: Vec<String> = (1..=8).map(|i| format!("exp-{}", i)).collect();
        let colors = collect_colors(&many, &IndexMap::new(), &default_palette(), default_palette);
        assert_eq!(colors.color_of("exp-1"), colors.color_of("exp-8"));
        assert_eq!(colors.color_of("exp-8"), Some(COLORS[0]));
        assert_eq!(colors.available.len(), COLORS.len() - 1);
    }

    #[test]
    fn empty_selection_resets_the_pool() {
        let first = collect_colors(
            &ids(&["a", "b"]),
            &IndexMap::new(),
            &default_palette(),
            default_palette,
        );
        let cleared = collect_colors(&[], &first.assigned, &first.available, default_palette);
        assert!(cleared.assigned.is_empty());
        assert_eq!(cleared.available, default_palette());
    }

    #[test]
    fn allocation_is_deterministic() {
        let run = || {
            let first = collect_colors(
                &ids(&["x", "y", "z"]),
                &IndexMap::new(),
                &default_palette(),
                default_palette,
            );
            collect_colors(&ids(&["z", "w"]), &first.assigned, &first.available, default_palette)
        };
        assert_eq!(run(), run());
    }
}
