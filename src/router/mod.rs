//! Router Module
//!
//! Fixed worker pool that runs client calls against a shared store.
//!
//! ## Architecture
//! ```text
//!   caller ──submit──► [ FIFO task queue ] ──► worker 0 ──┐
//!   caller ──submit──►                     ──► worker 1 ──┼──► Store
//!   caller ──submit──►                     ──► worker N ──┘
//!      ▲                                           │
//!      └──────────── one-shot reply channel ◄──────┘
//! ```
//!
//! The router holds no store state; it only fans calls out.
//!
//! ## Queue Policy
//! - `queue_capacity = Some(n)`: bounded. `submit` blocks while the queue
//!   is full, `try_submit` fails immediately with `KvError::QueueFull`.
//! - `queue_capacity = None`: unbounded, producers never block.
//!
//! Submitted tasks always run; there is no cancellation or timeout. `stop`
//! lets workers drain the queue before joining them.

mod pool;
mod worker;

pub use pool::{Pending, Router, RouterStats};
pub use worker::WorkerStats;
