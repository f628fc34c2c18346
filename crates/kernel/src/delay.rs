use pentacle_common::ProcId;
use serde::{Deserialize, Serialize};

use crate::kernel::KernelHost;
use crate::process::{Process, encode_payload};
use crate::KernelError;

pub const DELAY_PROCESS_TYPE: u16 = 0x0002;

/// Does nothing for a number of runs, then terminates.
///
/// Usually something else waits on it with [`crate::Kernel::wait_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayProcess {
    pub remaining: u32,
}

impl DelayProcess {
    pub const CLASS: &'static str = "DelayProcess";

    pub fn new(ticks: u32) -> Self {
        Self { remaining: ticks }
    }
}

impl<C: KernelHost> Process<C> for DelayProcess {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn run(&mut self, pid: ProcId, ctx: &mut C) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            ctx.kernel_mut().terminate(pid);
        }
    }

    fn save_payload(&self) -> Result<ciborium::Value, KernelError> {
        encode_payload(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Kernel, ProcessCore};

    #[derive(Default)]
    struct Host {
        kernel: Kernel<Host>,
    }

    impl KernelHost for Host {
        fn kernel(&self) -> &Kernel<Self> {
            &self.kernel
        }

        fn kernel_mut(&mut self) -> &mut Kernel<Self> {
            &mut self.kernel
        }
    }

    #[test]
    fn delay_terminates_after_count() {
        let mut host = Host::default();
        let pid = host.kernel.add_process(
            ProcessCore::new(0, DELAY_PROCESS_TYPE),
            Box::new(DelayProcess::new(3)),
        );
        Kernel::run_processes(&mut host);
        Kernel::run_processes(&mut host);
        assert_eq!(
            host.kernel.get_process_as::<DelayProcess>(pid).map(|d| d.remaining),
            Some(1)
        );
        Kernel::run_processes(&mut host);
        assert!(host.kernel.get_process(pid).is_none());
    }
}
