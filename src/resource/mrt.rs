//! Modulo Reservation Table.
//!
//! Column `c` holds every operation whose start cycle is congruent to
//! `c mod II`, i.e. everything that issues in that slot once iterations
//! overlap. Only operations with a shareable resource class are recorded.
//! The table is a snapshot of one timing assignment and is rebuilt
//! whenever the assignment changes.
//!
//! # Reference
//! - Rau (1994), "Iterative modulo scheduling: an algorithm for software
//!   pipelining loops"

use std::collections::{BTreeMap, HashSet};

use crate::models::{Cdfg, OpKind, Schedule, ScheduleView};

/// One occupied MRT slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrtEntry {
    pub node: String,
    pub class: &'static str,
    pub cycle: i64,
}

/// Resource usage per `cycle mod II` column.
#[derive(Debug, Clone)]
pub struct ModuloReservationTable {
    ii: i64,
    columns: Vec<Vec<MrtEntry>>,
}

impl ModuloReservationTable {
    /// Builds the table from `(name, kind, cycle)` triples.
    ///
    /// `ii` values below 1 are treated as 1.
    pub fn from_cycles<'a, I>(entries: I, ii: i64) -> Self
    where
        I: IntoIterator<Item = (&'a str, OpKind, i64)>,
    {
        let ii = ii.max(1);
        let mut columns = vec![Vec::new(); ii as usize];
        for (name, kind, cycle) in entries {
            let Some(class) = kind.resource_class() else {
                continue;
            };
            columns[cycle.rem_euclid(ii) as usize].push(MrtEntry {
                node: name.to_string(),
                class,
                cycle,
            });
        }
        Self { ii, columns }
    }

    /// Builds the table from a view and a timing lookup.
    ///
    /// Nodes without a cycle are left out.
    pub fn generate<F>(view: &ScheduleView, cycle_of: F, ii: i64) -> Self
    where
        F: Fn(&str) -> Option<i64>,
    {
        let entries: Vec<(&str, OpKind, i64)> = view
            .nodes()
            .iter()
            .filter_map(|n| Some((n.name.as_str(), n.kind, cycle_of(&n.name)?)))
            .collect();
        Self::from_cycles(entries, ii)
    }

    /// Builds the table from a finished schedule.
    pub fn from_schedule(graph: &Cdfg, schedule: &Schedule, ii: i64) -> Self {
        let entries: Vec<(&str, OpKind, i64)> = graph
            .operations()
            .filter_map(|(_, op)| Some((op.name.as_str(), op.kind, schedule.cycle(&op.name)?)))
            .collect();
        Self::from_cycles(entries, ii)
    }

    /// Initiation interval (number of columns).
    pub fn ii(&self) -> i64 {
        self.ii
    }

    /// Column index of a cycle.
    pub fn column_of(&self, cycle: i64) -> usize {
        cycle.rem_euclid(self.ii) as usize
    }

    /// Entries of one column.
    pub fn column(&self, column: usize) -> &[MrtEntry] {
        self.columns.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of `class` instances in a column.
    pub fn occupancy(&self, column: usize, class: &str) -> usize {
        self.column(column)
            .iter()
            .filter(|e| e.class == class)
            .count()
    }

    /// Largest per-column occupancy of a class.
    pub fn peak(&self, class: &str) -> usize {
        (0..self.columns.len())
            .map(|c| self.occupancy(c, class))
            .max()
            .unwrap_or(0)
    }

    /// Per-class peak occupancy, for every class present.
    pub fn peaks(&self) -> BTreeMap<&'static str, usize> {
        let mut peaks = BTreeMap::new();
        for column in &self.columns {
            let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
            for e in column {
                *counts.entry(e.class).or_insert(0) += 1;
            }
            for (class, n) in counts {
                let peak = peaks.entry(class).or_insert(0);
                *peak = (*peak).max(n);
            }
        }
        peaks
    }

    /// Whether `op` (of resource `class`) may be placed at `cycle`.
    ///
    /// Counts the `class` operations in `cycle`'s column that are either
    /// finalized or `op` itself (counted even if the table does not record
    /// it there yet); legal iff the count does not exceed `capacity`.
    pub fn is_legal(
        &self,
        op: &str,
        class: &str,
        cycle: i64,
        capacity: u32,
        finalized: &HashSet<String>,
    ) -> bool {
        let column = self.column(self.column_of(cycle));
        let occupants = column
            .iter()
            .filter(|e| e.class == class && e.node != op)
            .filter(|e| finalized.contains(&e.node))
            .count();
        occupants < capacity as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModuloReservationTable {
        ModuloReservationTable::from_cycles(
            [
                ("m1", OpKind::Mul, 0),
                ("m2", OpKind::Mul, 2),
                ("m3", OpKind::Mul, 3),
                ("a1", OpKind::Add, 1),
                ("p", OpKind::Phi, 0),
            ],
            2,
        )
    }

    #[test]
    fn test_columns_wrap_modulo_ii() {
        let mrt = table();
        assert_eq!(mrt.ii(), 2);
        assert_eq!(mrt.occupancy(0, "mul"), 2);
        assert_eq!(mrt.occupancy(1, "mul"), 1);
        assert_eq!(mrt.occupancy(1, "add"), 1);
        // phi has no resource class
        assert_eq!(mrt.column(0).len(), 2);
        assert_eq!(mrt.peak("mul"), 2);
        assert_eq!(mrt.peaks().get("add"), Some(&1));
    }

    #[test]
    fn test_is_legal_counts_finalized_and_self() {
        let mrt = table();
        let mut done = HashSet::new();
        // m2 alone (m1 not finalized yet).
        assert!(mrt.is_legal("m2", "mul", 2, 1, &done));
        done.insert("m1".to_string());
        assert!(!mrt.is_legal("m2", "mul", 2, 1, &done));
        assert!(mrt.is_legal("m2", "mul", 2, 2, &done));
        // Column 1 has no finalized mul.
        assert!(mrt.is_legal("m3", "mul", 3, 1, &done));
        // A finalized add does not block a mul.
        done.insert("a1".to_string());
        assert!(mrt.is_legal("m3", "mul", 3, 1, &done));
    }

    #[test]
    fn test_negative_and_zero_ii() {
        let mrt = ModuloReservationTable::from_cycles([("a", OpKind::Add, 5)], 0);
        assert_eq!(mrt.ii(), 1);
        assert_eq!(mrt.occupancy(0, "add"), 1);
        assert_eq!(mrt.column_of(-1), 0);
    }
}
