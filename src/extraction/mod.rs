// Well-series extraction - per-well RFU sequences from a partition export
//
// The export is scanned exactly once in fixed-size batches. Only rows whose
// well is of interest and whose RFU reading is valid are retained, so memory
// is bounded by the readings of the requested wells, not by file size.

pub mod reader;

pub use reader::{ColumnLayout, PartitionReader, PartitionRecord};

use std::collections::HashMap;
use std::path::Path;

use crate::cancel::CancelFlag;
use crate::config::ExtractionConfig;
use crate::error::{log_extraction_error, ExtractionError};

/// Counters gathered during one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExtractionStats {
    /// Data lines read after the header
    pub rows_scanned: usize,
    /// Readings appended to a requested well's series
    pub rows_accepted: usize,
    /// Lines ignored (other wells, blank or invalid RFU, blank lines)
    pub rows_skipped: usize,
    /// Batches processed
    pub batches: usize,
}

/// RFU series per requested well, plus pass statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedSeries {
    /// One entry per requested well, empty when no valid readings were found
    pub series: HashMap<String, Vec<f64>>,
    pub stats: ExtractionStats,
}

/// Configurable single-pass extractor
#[derive(Debug, Clone, Default)]
pub struct SeriesExtractor {
    config: ExtractionConfig,
    cancel: CancelFlag,
}

impl SeriesExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Abort between batches once `cancel` is set
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Stream `path` once and collect the RFU series of each well in `wells`
    pub fn extract<P, I, S>(&self, path: P, wells: I) -> Result<ExtractedSeries, ExtractionError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.as_ref();
        let mut series: HashMap<String, Vec<f64>> = wells
            .into_iter()
            .map(|well| (well.into(), Vec::new()))
            .collect();

        let mut reader = PartitionReader::open(path, &self.config)
            .inspect_err(|err| log_extraction_error(err, "open_partition_file"))?;

        tracing::debug!(
            "[Extractor] {} layout: well column {}, RFU column {}, delimiter {:?}",
            path.display(),
            reader.layout().well,
            reader.layout().rfu,
            reader.delimiter()
        );

        let mut stats = ExtractionStats::default();
        let mut batch = Vec::with_capacity(self.config.batch_size.clamp(1, 65_536));
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("[Extractor] Cancelled after {} rows", stats.rows_scanned);
                return Err(ExtractionError::Cancelled);
            }

            let consumed = reader
                .next_batch(&mut batch, self.config.batch_size)
                .inspect_err(|err| log_extraction_error(err, "read_partition_batch"))?;
            if consumed == 0 {
                break;
            }
            stats.batches += 1;
            stats.rows_scanned += consumed;

            let mut accepted = 0;
            for record in batch.drain(..) {
                if let (Some(values), Some(rfu)) = (series.get_mut(&record.well), record.rfu) {
                    values.push(rfu);
                    accepted += 1;
                }
            }
            stats.rows_accepted += accepted;
            stats.rows_skipped += consumed - accepted;

            tracing::debug!(
                "[Extractor] Batch {}: {} rows, {} accepted",
                stats.batches,
                consumed,
                accepted
            );
        }

        tracing::info!(
            "[Extractor] Scanned {} rows of {} in {} batches; kept {} readings for {} wells",
            stats.rows_scanned,
            path.display(),
            stats.batches,
            stats.rows_accepted,
            series.len()
        );

        Ok(ExtractedSeries { series, stats })
    }
}

/// Extract per-well RFU series with the default configuration
///
/// Every requested well gets an entry, empty when the file holds no valid
/// reading for it.
pub fn extract_series<P, I, S>(path: P, wells: I) -> Result<HashMap<String, Vec<f64>>, ExtractionError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SeriesExtractor::default()
        .extract(path, wells)
        .map(|extracted| extracted.series)
}

/// Like [`extract_series`], also returning the pass statistics
pub fn extract_series_with_stats<P, I, S>(
    path: P,
    wells: I,
    config: &ExtractionConfig,
) -> Result<ExtractedSeries, ExtractionError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SeriesExtractor::new(config.clone()).extract(path, wells)
}
