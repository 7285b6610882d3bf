//! Report generation: best-spread rows, filters and CSV output.

pub mod best;
pub mod csv;

pub use best::{
    best_spreads, build_report, expiration_label, BestReport, BestSpread, ReportFilter,
    ANCHOR_REFERENCE_DAYS,
};
pub use csv::{best_to_dataframe, candidates_to_dataframe, write_csv, write_report, ReportError};
