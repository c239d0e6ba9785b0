//! Task scheduler -- tracks submitted tasks from running to done.
//!
//! Split into focused submodules:
//! - `core`: TaskScheduler struct, constructor, submission, and shutdown
//! - `queries`: is_done / result / remove / status and collection snapshots
//! - `reconcile`: the non-blocking sweep that moves finished tasks into done

mod core;
mod queries;
mod reconcile;

pub use self::core::TaskScheduler;
pub use self::queries::TaskStatus;
