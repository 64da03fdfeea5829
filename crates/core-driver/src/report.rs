//! Per-match rewrite reporting: plain diff or aligned two-column output,
//! plus per-rule counters for the run summary.

use std::collections::BTreeMap;

use core_rules::RewriteRecord;

#[derive(Debug, Default)]
pub struct Report {
    records: Vec<RewriteRecord>,
}

impl Report {
    pub fn record(&mut self, record: RewriteRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: Vec<RewriteRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RewriteRecord] {
        &self.records
    }

    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.rule).or_insert(0) += 1;
        }
        counts
    }

    /// Render every match as a diff on stdout.
    pub fn print(&self, two_column: bool) {
        for record in &self.records {
            let origin = record
                .origin
                .map(|n| format!(" (line {n})"))
                .unwrap_or_default();
            println!("== {}{origin}", record.rule);
            if two_column {
                let width = record
                    .before
                    .iter()
                    .map(String::len)
                    .max()
                    .unwrap_or(0)
                    .max(8);
                let rows = record.before.len().max(record.after.len());
                for row in 0..rows {
                    let left = record.before.get(row).map(String::as_str).unwrap_or("");
                    let right = record.after.get(row).map(String::as_str).unwrap_or("");
                    println!("  {left:<width$} | {right}");
                }
            } else {
                for line in &record.before {
                    println!("  - {line}");
                }
                for line in &record.after {
                    println!("  + {line}");
                }
            }
        }
    }
}
