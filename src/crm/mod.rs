//! Remote side of a sync: schema discovery, batched paging, merging.

pub mod client;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod organizations;
pub mod responses;
pub mod schema;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use client::CrmClient;
pub use error::CrmError;
pub use fetch::{FetchOptions, PartialRecord};
pub use merge::{merge, MergedRecord, MergedRecords};
