//! Per-compilation naming state.
//!
//! Alias allocation and output-column naming are deterministic and scoped to a
//! single physical plan: the allocator is threaded through the builders as part
//! of [`PlanCtx`], never shared, so concurrent compilations (and the plans of a
//! split set) can't observe each other. Two compilations of the same query
//! shape always produce identical names — plan-shape cache keys and fixture
//! diffs depend on this.

use std::collections::HashMap;

use crate::model_catalog::EntityCatalog;

/// Hands out collision-free names: the first request for a base gets the bare
/// base, later requests get ascending 0-based numeric suffixes
/// ("o", "o0", "o1", …). Used for both table aliases and output column names;
/// a fresh instance restarts numbering (one per derived-table boundary for
/// column names).
#[derive(Debug, Default)]
pub struct NameAllocator {
    counts: HashMap<String, u32>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, base: &str) -> String {
        let n = self.counts.entry(base.to_string()).or_insert(0);
        let name = if *n == 0 {
            base.to_string()
        } else {
            format!("{base}{}", *n - 1)
        };
        *n += 1;
        name
    }
}

/// Alias base for a navigation or entity name: its first ASCII letter,
/// lowercased ("Orders" → "o"). Names without letters fall back to "t", the
/// base also used for derived tables.
pub fn alias_base(name: &str) -> String {
    name.chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase().to_string())
        .unwrap_or_else(|| "t".to_string())
}

pub const DERIVED_TABLE_BASE: &str = "t";

/// Output name claimed for a synthesized ordering expression re-exposed by the
/// pagination rewrite.
pub const SYNTHESIZED_COLUMN_BASE: &str = "c";

/// Context threaded through the builders while one physical plan is under
/// construction. Split compilations create one per plan so each plan's aliases
/// start fresh and stay internally unique.
pub struct PlanCtx<'a> {
    pub catalog: &'a EntityCatalog,
    pub aliases: NameAllocator,
}

impl<'a> PlanCtx<'a> {
    pub fn new(catalog: &'a EntityCatalog) -> Self {
        PlanCtx {
            catalog,
            aliases: NameAllocator::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_is_bare_then_zero_based_suffixes() {
        let mut names = NameAllocator::new();
        assert_eq!(names.allocate("o"), "o");
        assert_eq!(names.allocate("o"), "o0");
        assert_eq!(names.allocate("o"), "o1");
        assert_eq!(names.allocate("c"), "c");
    }

    #[test]
    fn column_collisions_suffix_second_and_later_occurrences() {
        let mut names = NameAllocator::new();
        assert_eq!(names.allocate("ProductID"), "ProductID");
        assert_eq!(names.allocate("ProductID"), "ProductID0");
        assert_eq!(names.allocate("ProductID"), "ProductID1");
    }

    #[test]
    fn alias_base_takes_first_letter() {
        assert_eq!(alias_base("Orders"), "o");
        assert_eq!(alias_base("OrderDetails"), "o");
        assert_eq!(alias_base("_123"), "t");
    }
}
