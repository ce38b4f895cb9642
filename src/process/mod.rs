//! User processes and the parent/child lifecycle protocol.
//!
//! # Protocol
//! - `exec`: the parent creates a lifecycle record, spawns the child and
//!   sleeps until the child reports whether its program loaded
//! - `wait`: the parent sleeps until a child it still holds a link to has
//!   terminated, takes its exit status and drops the link
//! - `terminate`: a process closes its files, releases its children's
//!   records, publishes its exit status and releases its own record
//!
//! Nothing here is reached through global state: every operation gets the
//! kernel context and the calling process explicitly.

pub mod loader;
pub mod record;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::cprintln;
use crate::fs::{FdTable, File};
use crate::kernel::Kernel;
use crate::mm::AddressSpace;
use crate::sync::Parker;
use crate::syscall::SyscallError;
use crate::trap::UserContext;

use self::record::{ChildLink, LoadOutcome, ParentLink};

/// Process identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Interpret a raw argument word as a process identifier.
    #[inline]
    pub const fn from_word(word: u32) -> Self {
        Self(word)
    }

    /// Identifier as the signed integer user code sees.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// Name shown for a process: the first word of its command line.
pub fn process_name(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

/// A running user process and the kernel state it owns exclusively.
pub struct Process {
    pid: Pid,
    name: String,
    space: Arc<dyn AddressSpace>,
    files: FdTable<Box<dyn File>>,
    executable: Option<Box<dyn File>>,
    link: Option<ChildLink>,
    children: Vec<ParentLink>,
    parker: Arc<dyn Parker>,
    exit_status: Option<i32>,
    halted: bool,
}

impl Process {
    pub(crate) fn new(
        pid: Pid,
        name: &str,
        space: Arc<dyn AddressSpace>,
        parker: Arc<dyn Parker>,
        link: Option<ChildLink>,
    ) -> Self {
        Self {
            pid,
            name: String::from(name),
            space,
            files: FdTable::new(),
            executable: None,
            link,
            children: Vec::new(),
            parker,
            exit_status: None,
            halted: false,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The process's address space.
    pub fn space(&self) -> &Arc<dyn AddressSpace> {
        &self.space
    }

    pub fn files_mut(&mut self) -> &mut FdTable<Box<dyn File>> {
        &mut self.files
    }

    /// Children this process can still wait for.
    pub fn children(&self) -> impl Iterator<Item = Pid> + '_ {
        self.children.iter().map(ParentLink::child)
    }

    /// Check if the process has not terminated yet.
    pub fn is_alive(&self) -> bool {
        self.exit_status.is_none()
    }

    /// Exit status, once terminated.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Check if the process asked for the machine to power off.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn mark_halted(&mut self) {
        self.halted = true;
    }

    /// Start `command` as a child and wait for it to load.
    pub fn exec(&mut self, kernel: &Arc<Kernel>, command: String) -> Result<Pid, SyscallError> {
        let pid = kernel.allocate_pid();
        let thread_name = String::from(process_name(&command));
        let (parent, child) = record::create(pid, command, kernel.census());
        self.children.push(parent);

        let ctx = Arc::clone(kernel);
        let spawned = kernel.threads().spawn(
            &thread_name,
            Box::new(move |parker| run(ctx, pid, Launch::Child(child), parker)),
        );
        if let Err(err) = spawned {
            log::warn!("{}: cannot start {}: {}", self.name, pid, err);
            self.children.pop();
            return Err(SyscallError::LoadFailed);
        }

        let outcome = match self.children.last() {
            Some(link) => link.wait_loaded(&self.parker),
            None => LoadOutcome::Failed,
        };
        if outcome == LoadOutcome::Loaded {
            Ok(pid)
        } else {
            // Dropping the link is the parent's release.
            self.children.pop();
            Err(SyscallError::LoadFailed)
        }
    }

    /// Wait for the child `pid` to terminate and return its exit status.
    ///
    /// Fails without sleeping unless `pid` is a child not yet waited for.
    pub fn wait(&mut self, pid: Pid) -> Result<i32, SyscallError> {
        let index = self
            .children
            .iter()
            .position(|link| link.child() == pid)
            .ok_or(SyscallError::NotAChild(pid.as_i32()))?;

        let status = self.children[index].wait_exited(&self.parker);
        let link = self.children.remove(index);
        drop(link);
        log::debug!("{}: reaped {} with status {}", self.name, pid, status);
        Ok(status)
    }

    /// Terminate the process with `status`. Later calls do nothing.
    pub fn terminate(&mut self, kernel: &Kernel, status: i32) {
        if self.exit_status.is_some() {
            return;
        }
        self.exit_status = Some(status);
        cprintln!(kernel.console(), "{}: exit({})", self.name, status);
        self.release(kernel, status);
        log::debug!("{}: {} terminated", self.name, self.pid);
    }

    /// Give up a halted process's resources once power-off has returned.
    ///
    /// A waiting parent sees status -1. No exit line is printed.
    pub(crate) fn release_halted(&mut self, kernel: &Kernel) {
        if self.exit_status.is_some() {
            return;
        }
        self.exit_status = Some(-1);
        self.release(kernel, -1);
        log::debug!("{}: {} released after halt", self.name, self.pid);
    }

    fn release(&mut self, kernel: &Kernel, status: i32) {
        {
            let _fs = kernel.lock_fs();
            self.files.drain().for_each(drop);
            // Closing the executable lifts its write denial.
            self.executable = None;
        }

        // Release every child not waited for; running orphans keep a
        // half-owned record and reclaim it when they exit.
        self.children.clear();

        if let Some(link) = self.link.take() {
            link.report_exit(status);
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("files", &self.files)
            .field("children", &self.children)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

/// How a new process thread was started.
pub(crate) enum Launch {
    /// The first process; no parent waits for it.
    Init(String),
    /// A child created by `exec`.
    Child(ChildLink),
}

/// Body of every process thread: load, report, run, terminate.
pub(crate) fn run(kernel: Arc<Kernel>, pid: Pid, launch: Launch, parker: Arc<dyn Parker>) {
    let (command, link) = match launch {
        Launch::Init(command) => (command, None),
        Launch::Child(link) => match link.begin_load() {
            Some(command) => (command, Some(link)),
            None => {
                link.report_load(false);
                return;
            }
        },
    };

    let image = match kernel.loader().load(&command) {
        Some(image) => image,
        None => {
            match link {
                Some(link) => link.report_load(false),
                None => log::error!("initial process '{}' failed to load", command),
            }
            return;
        }
    };

    let mut process = Process::new(pid, process_name(&command), image.space, parker, link);
    if let Some(mut executable) = image.executable {
        executable.deny_write();
        process.executable = Some(executable);
    }
    if let Some(link) = &process.link {
        link.report_load(true);
    }
    log::debug!("{}: {} running", process.name, pid);

    let mut cx = UserContext::new(&kernel, &mut process);
    (image.entry)(&mut cx);

    if process.is_halted() {
        process.release_halted(&kernel);
    } else if process.is_alive() {
        log::warn!("{}: returned to the kernel without exiting", process.name);
        process.terminate(&kernel, -1);
    }
}
