//! CSV → Parquet conversion of the raw TEP files.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use polars::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use tepdiag_shared::{
    Layout, RAW_CSV_FILES, Result, TepError, is_metadata_column, sensor_columns,
};
use tepdiag_storage::{ArtifactStore, StoreExt};

/// Outcome of one conversion pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConvertReport {
    /// CSVs converted in this pass.
    pub converted: Vec<String>,
    /// CSVs whose Parquet mirror already existed.
    pub up_to_date: Vec<String>,
    /// CSVs absent from the raw directory.
    pub missing: Vec<String>,
    /// CSVs that could not be parsed.
    pub failed: Vec<String>,
}

/// Compact dtypes for the known TEP columns: metadata as `Int32`, sensors as
/// `Float32`. Columns not in `header` are left out so the reader never
/// invents them.
fn schema_overrides(header: &[String]) -> Schema {
    let sensors: HashSet<String> = sensor_columns().into_iter().collect();
    header
        .iter()
        .filter_map(|name| {
            let dtype = if is_metadata_column(name) {
                DataType::Int32
            } else if sensors.contains(name) {
                DataType::Float32
            } else {
                return None;
            };
            Some(Field::new(name.as_str().into(), dtype))
        })
        .collect()
}

/// Column names from the first line of a CSV.
fn header_names(bytes: &[u8]) -> Vec<String> {
    let first = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(first)
        .trim_end_matches('\r')
        .split(',')
        .map(|name| name.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parse raw TEP CSV bytes with the compact schema applied.
pub fn parse_csv(bytes: Vec<u8>) -> Result<DataFrame> {
    let overrides = schema_overrides(&header_names(&bytes));

    CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(Some(Arc::new(overrides)))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(TepError::data)
}

/// Convert every expected raw CSV into its Parquet mirror.
///
/// Missing sources and parse failures are logged and skipped; existing
/// mirrors are left untouched.
#[instrument(skip_all, fields(raw_dir = %layout.raw_dir.display()))]
pub fn convert_csv_to_parquet<S: ArtifactStore + ?Sized>(
    store: &S,
    layout: &Layout,
) -> Result<ConvertReport> {
    let mut report = ConvertReport::default();

    for csv_name in RAW_CSV_FILES {
        let csv_key = layout.raw_csv(csv_name);
        let parquet_key = layout.raw_parquet(csv_name);

        if !store.exists(&csv_key) {
            warn!(file = csv_name, "source CSV missing, skipping");
            report.missing.push(csv_name.to_string());
            continue;
        }

        if store.exists(&parquet_key) {
            debug!(file = csv_name, "parquet mirror already present");
            report.up_to_date.push(csv_name.to_string());
            continue;
        }

        let converted = store
            .load(&csv_key)
            .and_then(parse_csv)
            .and_then(|mut df| store.save_frame(&parquet_key, &mut df).map(|()| df.height()));

        match converted {
            Ok(rows) => {
                info!(file = csv_name, rows, "converted to parquet");
                report.converted.push(csv_name.to_string());
            }
            Err(e) => {
                error!(file = csv_name, error = %e, "conversion failed, skipping");
                report.failed.push(csv_name.to_string());
            }
        }
    }

    if report.converted.is_empty() {
        info!("parquet mirrors are up to date");
    } else {
        info!(converted = report.converted.len(), "conversion pass complete");
    }

    Ok(report)
}
