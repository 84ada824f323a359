//! Fan-out/join job groups for gather.
//!
//! A [`JobGroup`] runs a batch of independent units in parallel, keeps one
//! outcome per unit in submission order, and bounds the total wait with a
//! group-wide deadline. The deadline stops the wait, never the work.
//!
//! ```no_run
//! # async fn demo() {
//! use std::time::Duration;
//! use gather_core::JobGroup;
//!
//! let mut group: JobGroup<u32, String> = JobGroup::new();
//! group
//!     .add_blocking(|| Ok(1))
//!     .add_async(async { Err("unreachable host".to_string()) });
//!
//! match group.run_within(Duration::from_secs(5)).await {
//!     Ok(()) => {
//!         for (index, error) in group.errors().into_iter().enumerate() {
//!             println!("{index}: {error:?}");
//!         }
//!     }
//!     Err(timeout) => eprintln!("{timeout}"),
//! }
//! # }
//! ```

mod group;
mod sink;
mod slots;
mod unit;

pub use group::{JobGroup, run_units};
pub use sink::{MemorySink, NullSink, TraceSink, TracingSink};
pub use slots::{Slot, SlotMap};
pub use unit::{Unit, UnitFut};

pub use gather_types::{
    GroupSettings, HumanDuration, NotFoundError, SettingsError, TimeoutError, TraceLevel,
    TraceLine, TraceReport,
};
