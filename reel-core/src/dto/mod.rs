//! Data Transfer Objects
//!
//! Wire representations used when talking to services outside Reel.

pub mod task_source;
