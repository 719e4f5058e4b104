//! Fault-tolerant data provider.
//!
//! The native geodata library reports unrecoverable errors by aborting the
//! process. To keep that away from the application, every native call runs
//! in a worker process that the supervisor restarts whenever it dies.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────────────────┐
//!   │        Parent process        │
//!   │                              │
//!   │  DataProvider (typed calls)  │
//!   │            │                 │
//!   │        Supervisor ◄── Watchdog (tick every 200 ms)
//!   │            │                 │
//!   └────────────┼─────────────────┘
//!        stdin   │   ▲  stdout (private copy)
//!      requests  ▼   │  responses
//!   ┌──────────────────────────────┐
//!   │        Worker process        │
//!   │  dispatch loop               │
//!   │    └─► FunctionTable ─► native library
//!   │  crash hook ─► fatal marker  │
//!   └──────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **One request at a time**: a request and its response share one hold
//!   of the request lock
//! - **No stale responses**: a failed call retires its generation before the
//!   lock is released
//! - **No hangs on crashes**: a dead worker closes the channel, which ends
//!   any pending receive
//! - **Self-healing**: the next check, call or watchdog tick starts a new
//!   generation

mod ipc;
mod proc;
pub mod protocol;
pub mod signals;
mod spawn;
pub mod supervisor;
pub mod table;
pub mod watchdog;
pub mod worker;

mod client;

pub use client::DataProvider;
pub use protocol::{Opcode, Request, Response};
pub use supervisor::{PendingCall, ProviderStats, Supervisor};
pub use worker::run_worker_main;
