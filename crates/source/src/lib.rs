//! Source side of the archiver pipeline
//!
//! The [`Source`] adapter reads batches out of an allow-listed source
//! table; the scheduler drains them into one destination at a time; the
//! [`Cleanup`] engine deletes rows once every destination has copied them
//! and the retention horizon has passed.

mod cleanup;
mod error;
mod scheduler;
mod source;

pub use cleanup::{safety_floor, Cleanup};
pub use error::{Result, SourceError};
pub use scheduler::{archive_destination, too_soon, Destination, RecordSource};
pub use source::Source;
