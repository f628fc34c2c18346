use std::collections::HashMap;

use pentacle_common::{ObjId, ProcId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::idman::IdMan;
use crate::process::{PROC_TYPE_ALL, ProcHandle, Process, ProcessCore, ProcessFlags};
use crate::KernelError;

/// Lowest and highest PID the kernel hands out.
pub const FIRST_PID: ProcId = 1;
pub const LAST_PID: ProcId = 32766;
const INITIAL_PIDS: u16 = 128;

/// A simulation context that owns a kernel scheduling processes over itself.
pub trait KernelHost: Sized + 'static {
    fn kernel(&self) -> &Kernel<Self>;
    fn kernel_mut(&mut self) -> &mut Kernel<Self>;
}

struct ProcessEntry<C: 'static> {
    core: ProcessCore,
    /// Taken out while the process runs.
    logic: Option<Box<dyn Process<C>>>,
}

/// The single scheduler for all live processes of a simulation.
///
/// Processes run in list order, once per frame. A process may add, kill or
/// wake other processes while it runs; the pass tracks its position with a
/// cursor that survives those edits, and terminated processes are removed
/// (and their PIDs released) only when the cursor reaches them.
pub struct Kernel<C: 'static> {
    pids: IdMan,
    slots: Vec<Option<ProcessEntry<C>>>,
    order: Vec<ProcId>,
    cursor: Option<usize>,
    running: ProcId,
    tick: u32,
    pause_depth: u32,
    frame_by_frame: bool,
    step_requested: bool,
    stepping: bool,
}

impl<C: 'static> Default for Kernel<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> Kernel<C> {
    pub fn new() -> Self {
        Self {
            pids: IdMan::new(FIRST_PID, LAST_PID, INITIAL_PIDS),
            slots: Vec::new(),
            order: Vec::new(),
            cursor: None,
            running: 0,
            tick: 0,
            pause_depth: 0,
            frame_by_frame: false,
            step_requested: false,
            stepping: false,
        }
    }

    /// Frame counter, advanced by every unpaused pass.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// PID of the process currently inside `run`, or 0.
    pub fn running_process(&self) -> ProcId {
        self.running
    }

    /// Number of processes in the list that have not terminated.
    pub fn live_count(&self) -> usize {
        self.order
            .iter()
            .filter(|pid| self.get_process(**pid).is_some())
            .count()
    }

    /// PIDs in scheduling order, including terminated ones awaiting removal.
    pub fn pids_in_order(&self) -> &[ProcId] {
        &self.order
    }

    /// Register a process and return its PID, or 0 if the PID space is exhausted.
    pub fn add_process(&mut self, core: ProcessCore, logic: Box<dyn Process<C>>) -> ProcId {
        let pid = self.pids.get_new_id();
        if pid == 0 {
            tracing::warn!(class = logic.class_name(), "process id space exhausted");
            return 0;
        }
        let mut core = core;
        core.pid = pid;
        core.flags.insert(ProcessFlags::ACTIVE);
        tracing::trace!(pid, class = logic.class_name(), "process added");
        self.insert_entry(pid, core, logic);
        self.order.push(pid);
        pid
    }

    fn insert_entry(&mut self, pid: ProcId, core: ProcessCore, logic: Box<dyn Process<C>>) {
        let idx = pid as usize;
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }
        self.slots[idx] = Some(ProcessEntry {
            core,
            logic: Some(logic),
        });
    }

    fn entry(&self, pid: ProcId) -> Option<&ProcessEntry<C>> {
        self.slots.get(pid as usize).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, pid: ProcId) -> Option<&mut ProcessEntry<C>> {
        self.slots.get_mut(pid as usize).and_then(Option::as_mut)
    }

    /// Look up a live process. Terminated processes are never returned.
    pub fn get_process(&self, pid: ProcId) -> Option<&ProcessCore> {
        self.entry(pid)
            .map(|e| &e.core)
            .filter(|core| !core.is_terminated())
    }

    pub fn get_process_mut(&mut self, pid: ProcId) -> Option<&mut ProcessCore> {
        self.entry_mut(pid)
            .map(|e| &mut e.core)
            .filter(|core| !core.is_terminated())
    }

    /// Typed access to a live process's payload. `None` while it is running.
    pub fn get_process_as<T: 'static>(&self, pid: ProcId) -> Option<&T> {
        let entry = self.entry(pid).filter(|e| !e.core.is_terminated())?;
        let logic: &dyn Process<C> = entry.logic.as_deref()?;
        logic.as_any().downcast_ref::<T>()
    }

    pub fn get_process_as_mut<T: 'static>(&mut self, pid: ProcId) -> Option<&mut T> {
        let entry = self
            .entry_mut(pid)
            .filter(|e| !e.core.is_terminated())?;
        let logic: &mut dyn Process<C> = entry.logic.as_deref_mut()?;
        logic.as_any_mut().downcast_mut::<T>()
    }

    /// Class name of a live process, if its payload is not currently running.
    pub fn class_of(&self, pid: ProcId) -> Option<&'static str> {
        let entry = self.entry(pid).filter(|e| !e.core.is_terminated())?;
        entry.logic.as_deref().map(|l| l.class_name())
    }

    pub fn handle(&self, pid: ProcId) -> Option<ProcHandle> {
        self.get_process(pid).map(|_| ProcHandle {
            pid,
            generation: self.pids.generation(pid),
        })
    }

    /// Resolve a handle, rejecting it if the PID has since been recycled.
    pub fn get_process_by_handle(&self, handle: ProcHandle) -> Option<&ProcessCore> {
        if self.pids.generation(handle.pid) != handle.generation {
            return None;
        }
        self.get_process(handle.pid)
    }

    /// Terminate a process and wake everything waiting on it. Irreversible.
    pub fn terminate(&mut self, pid: ProcId) {
        let Some(entry) = self.entry_mut(pid) else {
            return;
        };
        if entry.core.is_terminated() {
            return;
        }
        let waiting = std::mem::take(&mut entry.core.waiting);
        let result = entry.core.result;
        entry.core.flags.insert(ProcessFlags::TERMINATED);
        entry.core.flags.remove(ProcessFlags::TERM_DEFERRED);
        tracing::trace!(pid, "process terminated");
        for waiter in waiting {
            self.wake_up(waiter, result);
        }
    }

    /// Terminate at the top of the process's next scheduling slot.
    pub fn terminate_deferred(&mut self, pid: ProcId) {
        if let Some(core) = self.get_process_mut(pid) {
            core.flags.insert(ProcessFlags::TERM_DEFERRED);
        }
    }

    /// Terminate with the failed outcome recorded.
    pub fn fail(&mut self, pid: ProcId) {
        if let Some(core) = self.get_process_mut(pid) {
            core.flags.insert(ProcessFlags::FAILED);
        }
        self.terminate(pid);
    }

    pub fn set_result(&mut self, pid: ProcId, result: u32) {
        if let Some(core) = self.get_process_mut(pid) {
            core.result = result;
        }
    }

    pub fn suspend(&mut self, pid: ProcId) {
        if let Some(core) = self.get_process_mut(pid) {
            core.flags.insert(ProcessFlags::SUSPENDED);
        }
    }

    /// Resume a suspended process with `result` and schedule it right after the
    /// running one.
    pub fn wake_up(&mut self, pid: ProcId, result: u32) {
        let Some(core) = self.get_process_mut(pid) else {
            return;
        };
        core.result = result;
        core.flags.remove(ProcessFlags::SUSPENDED);
        self.set_next_process(pid);
    }

    /// Suspend `waiter` until `target` terminates. Returns false (and leaves
    /// `waiter` running) when `target` is not a live process.
    pub fn wait_for(&mut self, waiter: ProcId, target: ProcId) -> bool {
        if target == 0 || target == waiter || self.get_process(waiter).is_none() {
            return false;
        }
        let Some(target_core) = self.get_process_mut(target) else {
            return false;
        };
        target_core.waiting.push(waiter);
        self.suspend(waiter);
        true
    }

    /// Move `pid` to run immediately after the current process of this pass.
    pub fn set_next_process(&mut self, pid: ProcId) {
        let Some(cur) = self.cursor else {
            return;
        };
        let Some(idx) = self.order.iter().position(|p| *p == pid) else {
            return;
        };
        if idx == cur || idx == cur + 1 {
            return;
        }
        self.order.remove(idx);
        if idx < cur {
            // the current process shifted down by one
            self.cursor = Some(cur - 1);
            self.order.insert(cur, pid);
        } else {
            self.order.insert(cur + 1, pid);
        }
    }

    fn matches(core: &ProcessCore, objid: ObjId, process_type: u16) -> bool {
        (objid == 0 || objid == core.item_num)
            && (process_type == PROC_TYPE_ALL || process_type == core.process_type)
    }

    /// Terminate (or fail) every live process owned by an object that matches.
    ///
    /// `objid == 0` and `process_type == PROC_TYPE_ALL` act as wildcards;
    /// processes without an owning object are never touched.
    pub fn kill_processes(&mut self, objid: ObjId, process_type: u16, fail: bool) -> usize {
        let victims: Vec<ProcId> = self
            .order
            .iter()
            .copied()
            .filter(|pid| {
                self.entry(*pid).is_some_and(|e| {
                    e.core.item_num != 0
                        && !e.core.is_dying()
                        && Self::matches(&e.core, objid, process_type)
                })
            })
            .collect();
        self.kill_list(&victims, fail)
    }

    /// Like [`Kernel::kill_processes`] but spares processes of `process_type`.
    pub fn kill_processes_not_of_type(
        &mut self,
        objid: ObjId,
        process_type: u16,
        fail: bool,
    ) -> usize {
        let victims: Vec<ProcId> = self
            .order
            .iter()
            .copied()
            .filter(|pid| {
                self.entry(*pid).is_some_and(|e| {
                    e.core.item_num != 0
                        && !e.core.is_dying()
                        && (objid == 0 || objid == e.core.item_num)
                        && e.core.process_type != process_type
                })
            })
            .collect();
        self.kill_list(&victims, fail)
    }

    fn kill_list(&mut self, victims: &[ProcId], fail: bool) -> usize {
        for pid in victims {
            if fail {
                self.fail(*pid);
            } else {
                self.terminate(*pid);
            }
        }
        victims.len()
    }

    /// First live process matching the owner/type filter.
    pub fn find_process(&self, objid: ObjId, process_type: u16) -> Option<ProcId> {
        self.order.iter().copied().find(|pid| {
            self.get_process(*pid)
                .is_some_and(|core| Self::matches(core, objid, process_type))
        })
    }

    pub fn process_count(&self, objid: ObjId, process_type: u16) -> usize {
        self.order
            .iter()
            .filter(|pid| {
                self.get_process(**pid)
                    .is_some_and(|core| Self::matches(core, objid, process_type))
            })
            .count()
    }

    /// Terminate everything. Outside a pass the list is emptied immediately.
    pub fn kill_all(&mut self) {
        let all = self.order.clone();
        for pid in all {
            self.terminate(pid);
        }
        if self.cursor.is_none() {
            self.purge_terminated();
        }
    }

    /// Drop terminated processes and release their PIDs.
    pub fn purge_terminated(&mut self) {
        let mut kept = Vec::with_capacity(self.order.len());
        for pid in std::mem::take(&mut self.order) {
            let dead = self.entry(pid).is_none_or(|e| e.core.is_terminated());
            if dead {
                self.release(pid);
            } else {
                kept.push(pid);
            }
        }
        self.order = kept;
    }

    fn release(&mut self, pid: ProcId) {
        if let Some(slot) = self.slots.get_mut(pid as usize) {
            *slot = None;
        }
        self.pids.clear_id(pid);
    }

    pub fn pause(&mut self) {
        self.pause_depth += 1;
    }

    pub fn unpause(&mut self) {
        self.pause_depth = self.pause_depth.saturating_sub(1);
    }

    pub fn is_paused(&self) -> bool {
        self.pause_depth > 0 || (self.frame_by_frame && !self.stepping)
    }

    /// In frame-by-frame mode the kernel stays paused except for passes
    /// explicitly requested with [`Kernel::advance_frame`].
    pub fn set_frame_by_frame(&mut self, enabled: bool) {
        self.frame_by_frame = enabled;
        self.step_requested = false;
    }

    pub fn is_frame_by_frame(&self) -> bool {
        self.frame_by_frame
    }

    pub fn advance_frame(&mut self) {
        if self.frame_by_frame {
            self.step_requested = true;
        }
    }

    fn runnable(&self, core: &ProcessCore) -> bool {
        !core.is_terminated()
            && !core.is_suspended()
            && (!self.is_paused() || core.flags.contains(ProcessFlags::RUN_PAUSED))
            && (core.ticks_per_run == 0 || self.tick % core.ticks_per_run == 0)
    }

    /// Capture the live process graph for a savegame.
    ///
    /// Terminated and `PREVENT_SAVE` processes are left out and their PIDs are
    /// released in the saved allocator.
    pub fn save_state(&self) -> Result<KernelState, KernelError> {
        let mut pids = self.pids.clone();
        let mut processes = Vec::with_capacity(self.order.len());
        for &pid in &self.order {
            let Some(entry) = self.entry(pid) else {
                continue;
            };
            if entry.core.is_terminated()
                || entry.core.flags.contains(ProcessFlags::PREVENT_SAVE)
            {
                pids.clear_id(pid);
                continue;
            }
            let logic = entry
                .logic
                .as_deref()
                .ok_or(KernelError::ProcessRunning(pid))?;
            processes.push(ProcessRecord {
                class: logic.class_name().to_string(),
                core: entry.core.clone(),
                payload: logic.save_payload()?,
            });
        }
        Ok(KernelState {
            tick: self.tick,
            pids,
            processes,
        })
    }

    /// Rebuild a kernel from saved state using `registry` to restore payloads.
    pub fn from_state(
        state: KernelState,
        registry: &ProcessRegistry<C>,
    ) -> Result<Self, KernelError> {
        let mut kernel = Self::new();
        kernel.tick = state.tick;
        kernel.pids = state.pids;
        for record in state.processes {
            let pid = record.core.pid;
            if !kernel.pids.is_id_used(pid) {
                return Err(KernelError::UnallocatedPid(pid));
            }
            if kernel.entry(pid).is_some() {
                return Err(KernelError::DuplicatePid(pid));
            }
            let logic = registry.load(&record.class, &record.payload)?;
            kernel.insert_entry(pid, record.core, logic);
            kernel.order.push(pid);
        }
        tracing::debug!(processes = kernel.order.len(), tick = kernel.tick, "kernel restored");
        Ok(kernel)
    }
}

impl<C: KernelHost> Kernel<C> {
    /// Run one scheduling pass over every process.
    pub fn run_processes(ctx: &mut C) {
        let _span = tracing::trace_span!("run_processes").entered();
        {
            let k = ctx.kernel_mut();
            k.stepping = k.frame_by_frame && std::mem::take(&mut k.step_requested);
            if !k.is_paused() {
                k.tick = k.tick.wrapping_add(1);
            }
            k.cursor = Some(0);
        }

        loop {
            let k = ctx.kernel_mut();
            let Some(idx) = k.cursor else {
                break;
            };
            let Some(&pid) = k.order.get(idx) else {
                break;
            };

            let paused = k.is_paused();
            let deferred = k.entry(pid).is_some_and(|e| {
                e.core.flags.contains(ProcessFlags::TERM_DEFERRED) && !e.core.is_terminated()
            });
            if deferred && !paused {
                k.terminate(pid);
            }

            let run = k.entry(pid).is_some_and(|e| k.runnable(&e.core));
            if run {
                Self::run_one(ctx, pid);
            }

            let k = ctx.kernel_mut();
            let Some(idx) = k.cursor else {
                break;
            };
            let dead = k.entry(pid).is_none_or(|e| e.core.is_terminated());
            if dead && !k.is_paused() {
                match k.order.get(idx) {
                    Some(p) if *p == pid => {
                        k.order.remove(idx);
                    }
                    _ => k.order.retain(|p| *p != pid),
                }
                k.release(pid);
            } else {
                k.cursor = Some(idx + 1);
            }
        }

        let k = ctx.kernel_mut();
        k.cursor = None;
        k.stepping = false;
    }

    fn run_one(ctx: &mut C, pid: ProcId) {
        let logic = {
            let k = ctx.kernel_mut();
            let Some(entry) = k.entry_mut(pid) else {
                return;
            };
            let Some(logic) = entry.logic.take() else {
                return;
            };
            k.running = pid;
            logic
        };
        let mut logic = logic;
        logic.run(pid, ctx);
        let k = ctx.kernel_mut();
        k.running = 0;
        if let Some(entry) = k.entry_mut(pid) {
            entry.logic = Some(logic);
        }
    }

    /// Add a process and run it once immediately, outside the regular pass.
    pub fn add_process_exec(
        ctx: &mut C,
        core: ProcessCore,
        logic: Box<dyn Process<C>>,
    ) -> ProcId {
        let pid = ctx.kernel_mut().add_process(core, logic);
        if pid != 0 {
            let previous = ctx.kernel().running;
            Self::run_one(ctx, pid);
            ctx.kernel_mut().running = previous;
        }
        pid
    }
}

/// Persisted kernel: tick counter, PID allocator and the ordered process list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelState {
    pub tick: u32,
    pub pids: IdMan,
    pub processes: Vec<ProcessRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub class: String,
    pub core: ProcessCore,
    pub payload: ciborium::Value,
}

pub type ProcessLoader<C> = fn(&ciborium::Value) -> Result<Box<dyn Process<C>>, KernelError>;

/// Maps persisted class names back to process constructors.
pub struct ProcessRegistry<C: 'static> {
    loaders: HashMap<&'static str, ProcessLoader<C>>,
}

impl<C: 'static> Default for ProcessRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> ProcessRegistry<C> {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    pub fn register(&mut self, class: &'static str, loader: ProcessLoader<C>) {
        self.loaders.insert(class, loader);
    }

    /// Register a process whose payload is its own serde representation.
    pub fn register_serde<T>(&mut self, class: &'static str)
    where
        T: Process<C> + DeserializeOwned,
    {
        self.register(class, load_serde::<C, T>);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.loaders.contains_key(class)
    }

    pub fn load(
        &self,
        class: &str,
        payload: &ciborium::Value,
    ) -> Result<Box<dyn Process<C>>, KernelError> {
        let loader = self
            .loaders
            .get(class)
            .ok_or_else(|| KernelError::UnknownClass(class.to_string()))?;
        loader(payload)
    }
}

fn load_serde<C: 'static, T>(payload: &ciborium::Value) -> Result<Box<dyn Process<C>>, KernelError>
where
    T: Process<C> + DeserializeOwned,
{
    let value: T = payload
        .deserialized()
        .map_err(|e: ciborium::value::Error| KernelError::PayloadDecode {
            class: std::any::type_name::<T>().to_string(),
            reason: e.to_string(),
        })?;
    Ok(Box::new(value))
}
