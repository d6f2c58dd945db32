//! Shared test fixtures for the NWM provider workspace.
//!
//! Provides an in-memory [`zarr_dataset::DataSource`] implementation and
//! builders for small synthetic feature and grid datasets, so pipeline
//! tests never need a real store.

pub mod memory;

pub use memory::{grid_dataset, vector_dataset, MemoryDataset, MemoryVariable};
