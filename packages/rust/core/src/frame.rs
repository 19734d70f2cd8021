//! Dataframe ↔ plain vector conversions used by the model code.

use polars::prelude::*;

use tepdiag_shared::{Result, TARGET, TepError, is_metadata_column};

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| TepError::validation(format!("column '{name}' not found")))
}

/// Integer values of a column, cast to `i64`. Nulls are rejected.
pub(crate) fn column_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    series_i64(column(df, name)?.as_materialized_series())
}

/// Integer values of a series, cast to `i64`. Nulls are rejected.
pub(crate) fn series_i64(series: &Series) -> Result<Vec<i64>> {
    let cast = series.cast(&DataType::Int64).map_err(TepError::data)?;
    let values = cast.i64().map_err(TepError::data)?;
    if values.null_count() > 0 {
        return Err(TepError::validation(format!(
            "column '{}' contains {} null values",
            series.name(),
            values.null_count()
        )));
    }
    Ok(values.into_no_null_iter().collect())
}

/// Names of the model feature columns: everything except metadata and target.
pub(crate) fn feature_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| !is_metadata_column(name) && *name != TARGET)
        .map(String::from)
        .collect()
}

/// Row-major `f64` matrix of the named columns.
pub(crate) fn feature_rows(df: &DataFrame, names: &[String]) -> Result<Vec<Vec<f64>>> {
    let mut rows = vec![Vec::with_capacity(names.len()); df.height()];

    for name in names {
        let cast = column(df, name)?
            .as_materialized_series()
            .cast(&DataType::Float64)
            .map_err(TepError::data)?;
        let values = cast.f64().map_err(TepError::data)?;
        if values.null_count() > 0 {
            return Err(TepError::validation(format!(
                "feature column '{name}' contains null values"
            )));
        }
        for (row, value) in rows.iter_mut().zip(values.into_no_null_iter()) {
            row.push(value);
        }
    }

    Ok(rows)
}
