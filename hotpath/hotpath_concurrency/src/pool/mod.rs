//! Object reuse.
//!
//! - `reusable`: a pool of idle instances with reset and clear hooks
//! - `counted`: pool-backed objects returned when their pending uses reach zero

pub mod counted;
pub mod reusable;

pub use counted::{Completion, Counted, CountedPool};
pub use reusable::{Factory, PoolStats, ReusablePool};
