//! Process kernel: a cooperative, frame-stepped scheduler.
//!
//! # Invariants
//! - Every live process has a unique non-zero PID; PID 0 means "none".
//! - A terminated process is never returned by a lookup, and its PID is only
//!   released once the scheduling pass reaches it.
//! - Processes run in list order, at most once per pass.

mod clock;
mod delay;
mod error;
mod idman;
mod kernel;
mod process;

pub use clock::TickClock;
pub use delay::{DELAY_PROCESS_TYPE, DelayProcess};
pub use error::KernelError;
pub use idman::IdMan;
pub use kernel::{
    FIRST_PID, Kernel, KernelHost, KernelState, LAST_PID, ProcessLoader, ProcessRecord,
    ProcessRegistry,
};
pub use process::{
    AsAny, PROC_TYPE_ALL, ProcHandle, Process, ProcessCore, ProcessFlags, encode_payload,
};
