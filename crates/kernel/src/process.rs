use std::any::Any;

use pentacle_common::{ObjId, ProcId};
use serde::{Deserialize, Serialize};

use crate::KernelError;

/// Process type that matches every type in kill/find queries.
pub const PROC_TYPE_ALL: u16 = 6;

bitflags::bitflags! {
    /// Scheduler-visible state of a process.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProcessFlags: u16 {
        const ACTIVE        = 0x0001;
        const SUSPENDED     = 0x0002;
        const TERMINATED    = 0x0004;
        const TERM_DEFERRED = 0x0008;
        const FAILED        = 0x0010;
        const RUN_PAUSED    = 0x0020;
        const PREVENT_SAVE  = 0x0080;
    }
}

/// State the kernel tracks for every process, independent of its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCore {
    pub pid: ProcId,
    pub flags: ProcessFlags,
    /// Object this process belongs to (0 = none).
    pub item_num: ObjId,
    pub process_type: u16,
    /// Value handed to waiters when this process terminates.
    pub result: u32,
    /// Run only on ticks divisible by this (0 = every tick).
    pub ticks_per_run: u32,
    /// Processes suspended until this one terminates.
    pub waiting: Vec<ProcId>,
}

impl ProcessCore {
    pub fn new(item_num: ObjId, process_type: u16) -> Self {
        Self {
            pid: 0,
            flags: ProcessFlags::empty(),
            item_num,
            process_type,
            result: 0,
            ticks_per_run: 0,
            waiting: Vec::new(),
        }
    }

    pub fn with_ticks_per_run(mut self, ticks: u32) -> Self {
        self.ticks_per_run = ticks;
        self
    }

    pub fn with_flags(mut self, flags: ProcessFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(ProcessFlags::ACTIVE)
    }

    pub fn is_suspended(&self) -> bool {
        self.flags.contains(ProcessFlags::SUSPENDED)
    }

    pub fn is_terminated(&self) -> bool {
        self.flags.contains(ProcessFlags::TERMINATED)
    }

    pub fn is_failed(&self) -> bool {
        self.flags.contains(ProcessFlags::FAILED)
    }

    /// Terminated, or scheduled to terminate on its next slot.
    pub fn is_dying(&self) -> bool {
        self.flags
            .intersects(ProcessFlags::TERMINATED | ProcessFlags::TERM_DEFERRED)
    }
}

/// Stale-detecting reference to a process: a PID plus the generation of its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcHandle {
    pub pid: ProcId,
    pub generation: u32,
}

/// Object-safe access to `Any` for process payloads.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of scheduled game logic, run once per frame by the kernel.
///
/// `C` is the simulation context handed to `run`. The process's own
/// bookkeeping lives in the kernel's [`ProcessCore`]; a process ends itself by
/// calling `terminate(pid)` on the kernel it reaches through `ctx`.
pub trait Process<C>: AsAny {
    /// Stable class name used to pick a loader when restoring a savegame.
    fn class_name(&self) -> &'static str;

    fn run(&mut self, pid: ProcId, ctx: &mut C);

    /// Type-specific state to persist. Stateless processes keep the default.
    fn save_payload(&self) -> Result<ciborium::Value, KernelError> {
        Ok(ciborium::Value::Null)
    }
}

/// Encode a serde payload for [`Process::save_payload`].
pub fn encode_payload<T: Serialize>(value: &T) -> Result<ciborium::Value, KernelError> {
    ciborium::Value::serialized(value).map_err(|e| KernelError::PayloadEncode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_builder_sets_fields() {
        let core = ProcessCore::new(42, 0x200)
            .with_ticks_per_run(3)
            .with_flags(ProcessFlags::RUN_PAUSED);
        assert_eq!(core.item_num, 42);
        assert_eq!(core.process_type, 0x200);
        assert_eq!(core.ticks_per_run, 3);
        assert!(core.flags.contains(ProcessFlags::RUN_PAUSED));
        assert!(!core.is_active());
    }

    #[test]
    fn dying_covers_deferred_termination() {
        let mut core = ProcessCore::new(0, 1);
        assert!(!core.is_dying());
        core.flags |= ProcessFlags::TERM_DEFERRED;
        assert!(core.is_dying());
        assert!(!core.is_terminated());
    }
}
