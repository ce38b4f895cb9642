//! Kernel context shared by every process.
//!
//! Holds the collaborators the syscall layer calls into and the little
//! global bookkeeping it needs: pid allocation, the lifecycle-record
//! census and the file-system lock. It is passed explicitly into every
//! dispatcher call.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, MutexGuard};

use crate::drivers::{Console, PowerControl};
use crate::fs::FileSystem;
use crate::process::loader::Loader;
use crate::process::record::RecordCensus;
use crate::process::{self, process_name, Launch, Pid};
use crate::thread::{SpawnError, Threads};

/// The collaborators a kernel is built from.
pub struct KernelServices {
    pub fs: Arc<dyn FileSystem>,
    pub console: Arc<dyn Console>,
    pub loader: Arc<dyn Loader>,
    pub threads: Arc<dyn Threads>,
    pub power: Arc<dyn PowerControl>,
}

/// Kernel-wide context.
pub struct Kernel {
    services: KernelServices,
    next_pid: AtomicU32,
    census: Arc<RecordCensus>,
    /// The file system is not reentrant; every call into it and into an
    /// open file happens under this lock.
    fs_lock: Mutex<()>,
}

impl Kernel {
    /// First pid handed out.
    pub const FIRST_PID: u32 = 1;

    pub fn new(services: KernelServices) -> Arc<Self> {
        Arc::new(Self {
            services,
            next_pid: AtomicU32::new(Self::FIRST_PID),
            census: Arc::new(RecordCensus::new()),
            fs_lock: Mutex::new(()),
        })
    }

    /// Spawn the initial process running `command`.
    ///
    /// The initial process has no parent and no lifecycle record.
    pub fn start(self: &Arc<Self>, command: &str) -> Result<Pid, SpawnError> {
        let pid = self.allocate_pid();
        let kernel = Arc::clone(self);
        let command = String::from(command);
        let name = String::from(process_name(&command));
        self.services.threads.spawn(
            &name,
            Box::new(move |parker| process::run(kernel, pid, Launch::Init(command), parker)),
        )?;
        log::info!("started initial process {} as {}", name, pid);
        Ok(pid)
    }

    /// Lifecycle records created and not yet reclaimed.
    pub fn live_records(&self) -> usize {
        self.census.live()
    }

    pub fn fs(&self) -> &dyn FileSystem {
        &*self.services.fs
    }

    pub fn console(&self) -> &dyn Console {
        &*self.services.console
    }

    pub fn power(&self) -> &dyn PowerControl {
        &*self.services.power
    }

    pub(crate) fn loader(&self) -> &dyn Loader {
        &*self.services.loader
    }

    pub(crate) fn threads(&self) -> &dyn Threads {
        &*self.services.threads
    }

    pub(crate) fn census(&self) -> &Arc<RecordCensus> {
        &self.census
    }

    pub(crate) fn allocate_pid(&self) -> Pid {
        Pid::new(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }

    /// Serialize access to the file system.
    pub(crate) fn lock_fs(&self) -> MutexGuard<'_, ()> {
        self.fs_lock.lock()
    }
}
