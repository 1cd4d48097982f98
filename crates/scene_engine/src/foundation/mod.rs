//! Building blocks with no knowledge of scenes or GPUs
//!
//! Math aliases, arena keys, lock helpers, the frame clock and logger setup.

pub mod collections;
pub mod logging;
pub mod math;
pub mod sync;
pub mod time;
