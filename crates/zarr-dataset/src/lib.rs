//! Lazy access to chunked National Water Model zarr output.
//!
//! The NWM retrospective buckets hold multi-terabyte zarr stores; the whole
//! point of this crate is that nothing is read from the backing store until
//! a fully-narrowed [`SelectionPlan`] is handed to [`DataSource::load`].
//!
//! # Architecture
//!
//! ```text
//! DatasetCache::get_or_open            (one metadata round-trip per store)
//!      │
//!      ▼
//! ZarrDataset                          (consolidated metadata, lazy arrays)
//!      │
//!      ├─► read_f64 / read_times       (eager 1-D coordinate reads)
//!      │
//!      └─► load(&SelectionPlan)        (the single materialization)
//!               │
//!               ▼
//!          RealizedDataset             (rank-normalized, NaN for fill)
//! ```

pub mod backend;
pub mod cache;
pub mod cf_time;
pub mod error;
pub mod handle;
pub mod plan;
pub mod source;

pub use backend::{create_storage, BackendKind, StoreConfig};
pub use cache::{DatasetCache, DatasetKey};
pub use error::{DatasetError, Result};
pub use handle::ZarrDataset;
pub use plan::{
    AxisFields, FeatureSelection, GridWindow, RealizedDataset, ResultShape, SelectionPlan,
    TimeSelection, VariableValues,
};
pub use source::DataSource;
