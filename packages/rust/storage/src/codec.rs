//! Parquet encoding of dataframes to and from in-memory bytes.

use std::io::Cursor;

use polars::prelude::*;

use tepdiag_shared::{Result, TepError};

/// Encode a dataframe as Parquet bytes.
///
/// The frame is rechunked first so equal contents always encode to equal
/// bytes, whatever chunk layout the frame arrived with.
pub fn frame_to_parquet(df: &mut DataFrame) -> Result<Vec<u8>> {
    df.as_single_chunk_par();
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(df)
        .map_err(TepError::data)?;
    Ok(buf)
}

/// Decode Parquet bytes into a dataframe.
pub fn frame_from_parquet(bytes: Vec<u8>) -> Result<DataFrame> {
    ParquetReader::new(Cursor::new(bytes))
        .finish()
        .map_err(TepError::data)
}
