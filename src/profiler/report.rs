//! Text reports over the stored profiling records.
//!
//! Three layouts render the same record list:
//!
//! ```text
//! datetime:    [2026-10-18 09:12:44.120511] - [parse] - runtime : 0h 0m 0.0012s
//! function:    [parse]
//!                  [2026-10-18 09:12:44.120511] - runtime : 0h 0m 0.0012s
//! cumulative:  [parse] - 2 calls - runtime : 0h 0m 0.0025s
//! ```

use std::collections::BTreeMap;

use super::{Record, Slot, group_by_function};
use crate::collector::Measurement;
use crate::error::{Error, Result};

/// `chrono` format of record timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Everything a renderer needs, borrowed from the profiler.
pub(super) struct ReportSource<'a> {
    /// Signature names, indexed like the function registry.
    pub names: &'a [String],
    pub collectors: &'a [Slot],
    pub records: &'a [Record],
}

impl ReportSource<'_> {
    fn name(&self, function: usize) -> &str {
        self.names.get(function).map(String::as_str).unwrap_or("?")
    }

    fn label(&self, collector: usize) -> &'static str {
        self.collectors
            .get(collector)
            .map(|slot| slot.collector.label())
            .unwrap_or("?")
    }

    /// `" - label : value"` for every measurement, in collector order.
    fn measurements(&self, values: &BTreeMap<usize, Measurement>) -> Result<String> {
        let mut out = String::new();
        for (index, value) in values {
            // Records never outlive the collectors they were measured with.
            let Some(slot) = self.collectors.get(*index) else {
                continue;
            };
            out.push_str(" - ");
            out.push_str(&slot.collector.render_labeled(value)?);
        }
        Ok(out)
    }
}

fn timestamp(record: &Record) -> String {
    record.timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// One line per record, in call order.
pub(super) fn datetime(source: &ReportSource<'_>) -> Result<String> {
    let mut out = String::new();
    for record in source.records {
        out.push_str(&format!(
            "[{}] - [{}]{}\n",
            timestamp(record),
            source.name(record.function),
            source.measurements(&record.measurements)?
        ));
    }
    Ok(out)
}

/// A header per function, then its records indented below it.
pub(super) fn function(source: &ReportSource<'_>) -> Result<String> {
    let mut out = String::new();
    for (function, records) in group_by_function(source.records) {
        out.push_str(&format!("[{}]\n", source.name(function)));
        for record in records {
            out.push_str(&format!(
                "\t[{}]{}\n",
                timestamp(record),
                source.measurements(&record.measurements)?
            ));
        }
    }
    Ok(out)
}

/// One line per function with its call count and per-collector totals.
pub(super) fn cumulative(source: &ReportSource<'_>) -> Result<String> {
    let mut out = String::new();
    for (function, records) in group_by_function(source.records) {
        let mut totals: BTreeMap<usize, Measurement> = BTreeMap::new();
        for record in &records {
            for (index, value) in &record.measurements {
                let total = match totals.get(index) {
                    Some(total) => total.checked_add(value).map_err(|reason| Error::NotSummable {
                        label: source.label(*index),
                        reason,
                    })?,
                    None => value.clone(),
                };
                totals.insert(*index, total);
            }
        }

        // A single text value has nothing to add to, but still is not a sum.
        if let Some((index, _)) = totals.iter().find(|(_, v)| matches!(v, Measurement::Text(_))) {
            return Err(Error::NotSummable {
                label: source.label(*index),
                reason: "text values cannot be summed".to_string(),
            });
        }

        out.push_str(&format!(
            "[{}] - {} calls{}\n",
            source.name(function),
            records.len(),
            source.measurements(&totals)?
        ));
    }
    Ok(out)
}
