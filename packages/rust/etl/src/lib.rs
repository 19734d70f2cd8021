//! Extract/transform stages: raw dataset import, CSV → Parquet conversion,
//! and the normal/faulty merge into the master dataset.
//!
//! Each stage is a pure dataframe transformation ([`parse_csv`],
//! [`merge_frames`]) wrapped in a thin shell that reads and writes through an
//! [`ArtifactStore`](tepdiag_storage::ArtifactStore) and skips work whose
//! output already exists.

pub mod convert;
pub mod fetch;
pub mod merge;

pub use convert::{ConvertReport, convert_csv_to_parquet, parse_csv};
pub use fetch::{FetchReport, fetch_dataset};
pub use merge::{merge_frames, merge_master};
