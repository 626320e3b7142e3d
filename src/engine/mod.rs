// src/engine/mod.rs

//! Task queues for savesync.
//!
//! A [`TaskQueue`] is an ordered list of [`Task`]s drained by at most one
//! worker. The orchestrator keeps one queue per channel (`pull`, `push`), so
//! the channels run independently of each other while tasks inside a channel
//! run strictly in order.

pub mod queue;
pub mod task;

pub use queue::{EnqueueOutcome, PendingTasks, TaskQueue};
pub use task::{Task, TaskKind, TaskRunner};
pub use crate::types::InsertMode;
