//! Internal label allocation.
//!
//! Labels are lower-cased with spaces stripped. The first use of a
//! normalized label yields it bare; each later use appends the next suffix
//! (`person`, `person0`, `person1`, …). Suffixes are never handed back, even
//! when the node holding them is removed: variable names must stay unique for
//! the whole session. Only [`InternalLabels::clear`] resets the table.

use std::collections::{HashMap, HashSet};

/// Fallback base for empty labels.
const DEFAULT_BASE: &str = "n";

/// Session-scoped allocator of query variable names.
#[derive(Debug, Clone, Default)]
pub struct InternalLabels {
    suffixes: HashMap<String, u64>,
    issued: HashSet<String>,
}

impl InternalLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh variable name for `label`.
    pub fn generate(&mut self, label: &str) -> String {
        let mut base = normalize(label);
        if is_reserved(&base) {
            base.push('_');
        }

        let mut candidate = if self.suffixes.contains_key(&base) {
            self.next_suffixed(&base)
        } else {
            self.suffixes.insert(base.clone(), 0);
            base.clone()
        };

        // another label's bare form may equal an issued suffixed name
        while self.issued.contains(&candidate) {
            candidate = self.next_suffixed(&base);
        }

        self.issued.insert(candidate.clone());
        candidate
    }

    /// Forget every allocation. Only for whole-graph resets.
    pub fn clear(&mut self) {
        self.suffixes.clear();
        self.issued.clear();
    }

    fn next_suffixed(&mut self, base: &str) -> String {
        let next = self.suffixes.entry(base.to_string()).or_insert(0);
        let candidate = format!("{}{}", base, next);
        *next += 1;
        candidate
    }
}

fn normalize(label: &str) -> String {
    let base: String = label
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if base.is_empty() {
        DEFAULT_BASE.to_string()
    } else {
        base
    }
}

/// Names the compiler allocates on its own: `r`, `x` and `r0`, `r1`, ….
/// Labels normalizing to one of these get a trailing underscore.
fn is_reserved(name: &str) -> bool {
    match name.strip_prefix('r') {
        Some("") => true,
        Some(digits) => digits.chars().all(|c| c.is_ascii_digit()),
        None => name == "x",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_is_bare_then_suffixed() {
        let mut labels = InternalLabels::new();
        assert_eq!(labels.generate("Person"), "person");
        assert_eq!(labels.generate("Person"), "person0");
        assert_eq!(labels.generate("Person"), "person1");
        assert_eq!(labels.generate("Movie"), "movie");
    }

    #[test]
    fn test_spaces_are_stripped() {
        let mut labels = InternalLabels::new();
        assert_eq!(labels.generate("Production Company"), "productioncompany");
        assert_eq!(labels.generate("production company"), "productioncompany0");
    }

    #[test]
    fn test_empty_label() {
        let mut labels = InternalLabels::new();
        assert_eq!(labels.generate(""), "n");
        assert_eq!(labels.generate("  "), "n0");
    }

    #[test]
    fn test_collision_with_suffixed_form() {
        let mut labels = InternalLabels::new();
        assert_eq!(labels.generate("Person"), "person");
        assert_eq!(labels.generate("Person"), "person0");
        // a label whose bare form equals an issued suffixed name
        assert_eq!(labels.generate("Person0"), "person00");
    }

    #[test]
    fn test_reserved_names_are_skipped() {
        let mut labels = InternalLabels::new();
        assert_eq!(labels.generate("X"), "x_");
        assert_eq!(labels.generate("X"), "x_0");
        assert_eq!(labels.generate("R"), "r_");
        assert_eq!(labels.generate("R1"), "r1_");
        assert_eq!(labels.generate("Rating"), "rating");
    }

    #[test]
    fn test_clear_resets_suffixes() {
        let mut labels = InternalLabels::new();
        labels.generate("Person");
        labels.generate("Person");
        labels.clear();
        assert_eq!(labels.generate("Person"), "person");
    }
}
