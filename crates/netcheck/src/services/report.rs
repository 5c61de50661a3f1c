//! Reachability matrix and report rendering.
//!
//! Rows and columns cover every listed node, not only the tested ones, so
//! nodes excluded by the readiness wait stay visible as `NOT RUN`.

use crate::errors::NetcheckError;
use crate::models::{PairKey, ReachabilityResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tabled::builder::Builder;
use tabled::settings::Style;

/// Cell marker for pairs that were never tested.
pub const NOT_RUN: &str = "NOT RUN";

/// Cell marker for a failed single-probe pair.
pub const FAIL: &str = "FAIL";

/// Per-cycle aggregate counters handed to the metrics sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounters {
    /// Nodes listed at the start of the cycle.
    pub total_nodes: usize,
    /// Nodes whose probe workload was ready and tested.
    pub tested_nodes: usize,
    /// Pairs with at least one failing probe.
    pub issues: usize,
}

/// Summary of one matrix cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellSummary {
    /// Diagonal.
    SelfPair,
    /// At least one side was not ready.
    NotRun,
    Ok,
    /// Failure label: failing probe names upper-cased, or [`FAIL`].
    Failed(String),
}

impl fmt::Display for CellSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellSummary::SelfPair => Ok(()),
            CellSummary::NotRun => f.write_str(NOT_RUN),
            CellSummary::Ok => f.write_str("ok"),
            CellSummary::Failed(label) => f.write_str(label),
        }
    }
}

/// Summarize a completed pair result.
#[must_use]
pub fn summarize(result: &ReachabilityResult) -> CellSummary {
    if result.is_ok() {
        return CellSummary::Ok;
    }
    if result.outcomes().len() <= 1 {
        return CellSummary::Failed(FAIL.to_string());
    }
    let label = result
        .failing()
        .iter()
        .map(|name| name.to_uppercase())
        .collect::<Vec<_>>()
        .join(",");
    CellSummary::Failed(label)
}

/// All pair results for one cycle.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityMatrix {
    nodes: Vec<String>,
    tested: BTreeSet<String>,
    results: BTreeMap<PairKey, ReachabilityResult>,
}

#[derive(Serialize)]
struct JsonRow<'a> {
    from: &'a str,
    cells: BTreeMap<&'a str, String>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    nodes: &'a [String],
    tested: &'a BTreeSet<String>,
    rows: Vec<JsonRow<'a>>,
    counters: CycleCounters,
}

impl ReachabilityMatrix {
    /// Build the matrix for the full node list.
    #[must_use]
    pub fn new(
        nodes: Vec<String>,
        tested: impl IntoIterator<Item = String>,
        results: BTreeMap<PairKey, ReachabilityResult>,
    ) -> Self {
        Self {
            nodes,
            tested: tested.into_iter().collect(),
            results,
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    #[must_use]
    pub fn result(&self, from: &str, to: &str) -> Option<&ReachabilityResult> {
        self.results.get(&PairKey::new(from, to))
    }

    /// Summary for the cell at row `from`, column `to`.
    #[must_use]
    pub fn cell(&self, from: &str, to: &str) -> CellSummary {
        if from == to {
            return CellSummary::SelfPair;
        }
        match self.result(from, to) {
            Some(result) => summarize(result),
            None => CellSummary::NotRun,
        }
    }

    #[must_use]
    pub fn counters(&self) -> CycleCounters {
        CycleCounters {
            total_nodes: self.nodes.len(),
            tested_nodes: self.tested.len(),
            issues: self.results.values().filter(|r| !r.is_ok()).count(),
        }
    }

    /// Render the matrix as a text table, rows = source, columns = target.
    #[must_use]
    pub fn render_table(&self) -> String {
        let mut builder = Builder::default();

        let mut header = vec![String::new()];
        header.extend(self.nodes.iter().cloned());
        builder.push_record(header);

        for from in &self.nodes {
            let mut row = vec![from.clone()];
            row.extend(self.nodes.iter().map(|to| self.cell(from, to).to_string()));
            builder.push_record(row);
        }

        let mut table = builder.build();
        table.with(Style::psql());
        table.to_string()
    }

    /// Render the matrix as JSON.
    ///
    /// # Errors
    ///
    /// - `NetcheckError::Report` - serialization failed
    pub fn render_json(&self) -> Result<String, NetcheckError> {
        let rows = self
            .nodes
            .iter()
            .map(|from| JsonRow {
                from,
                cells: self
                    .nodes
                    .iter()
                    .filter(|to| *to != from)
                    .map(|to| (to.as_str(), self.cell(from, to).to_string()))
                    .collect(),
            })
            .collect();

        let report = JsonReport {
            nodes: &self.nodes,
            tested: &self.tested,
            rows,
            counters: self.counters(),
        };
        serde_json::to_string_pretty(&report).map_err(|e| NetcheckError::Report(e.to_string()))
    }
}
