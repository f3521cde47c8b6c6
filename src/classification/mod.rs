// Partition classification at a calibrated threshold
//
// A partition is positive when its RFU reading is strictly above the
// threshold. Partitions without a valid reading are not counted.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ExtractionConfig;
use crate::error::{log_extraction_error, ExtractionError};
use crate::extraction::PartitionReader;
use crate::plate::WellNameMap;

/// Partition counts of one well
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellClassification {
    pub well: String,
    /// Display name, or the identifier when the well is unnamed
    pub name: String,
    pub positives: usize,
    pub negatives: usize,
}

impl WellClassification {
    pub fn total(&self) -> usize {
        self.positives + self.negatives
    }

    /// Fraction of counted partitions that are positive; 0 for an empty well
    pub fn positive_fraction(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.positives as f64 / self.total() as f64
        }
    }
}

/// Count positive and negative partitions of every well in `path`
///
/// Wells are returned in order of first appearance in the file.
pub fn classify_wells<P: AsRef<Path>>(
    path: P,
    threshold: f64,
    names: &WellNameMap,
    config: &ExtractionConfig,
) -> Result<Vec<WellClassification>, ExtractionError> {
    let path = path.as_ref();
    let mut reader = PartitionReader::open(path, config)
        .inspect_err(|err| log_extraction_error(err, "classify_wells"))?;

    let mut wells: Vec<WellClassification> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut batch = Vec::new();

    while reader
        .next_batch(&mut batch, config.batch_size)
        .inspect_err(|err| log_extraction_error(err, "classify_wells"))?
        > 0
    {
        for record in batch.drain(..) {
            let Some(rfu) = record.rfu else {
                continue;
            };
            let slot = match index.get(&record.well).copied() {
                Some(slot) => slot,
                None => {
                    wells.push(WellClassification {
                        name: names.display_name(&record.well).to_string(),
                        well: record.well.clone(),
                        positives: 0,
                        negatives: 0,
                    });
                    index.insert(record.well, wells.len() - 1);
                    wells.len() - 1
                }
            };
            if rfu > threshold {
                wells[slot].positives += 1;
            } else {
                wells[slot].negatives += 1;
            }
        }
    }

    tracing::info!(
        "[Classifier] {} wells classified at threshold {} in {}",
        wells.len(),
        threshold,
        path.display()
    );
    Ok(wells)
}
