//! User Trap Handling
//!
//! Entry points for control transfers from user mode into the kernel.
//!
//! # Trap Types
//! - System call: the frame's stack pointer addresses the call number
//!   followed by its arguments
//! - Page fault: user code touched memory it does not own
//!
//! # Security Considerations
//! - A faulting process is terminated with status -1, never resumed
//! - A process that already terminated gets no further service

use alloc::sync::Arc;

use crate::kernel::Kernel;
use crate::mm::VirtAddr;
use crate::process::{Pid, Process};
use crate::syscall;

/// Register state saved on entry from user mode.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// User stack pointer: address of the call number.
    pub esp: VirtAddr,
    /// Return value slot.
    pub eax: u32,
}

impl TrapFrame {
    pub const fn new(esp: VirtAddr) -> Self {
        Self { esp, eax: 0 }
    }
}

/// Kind of trap taken from user mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    Syscall,
    PageFault { addr: VirtAddr },
}

/// What happens to the trapping thread after the kernel is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Return to user mode.
    Resume,
    /// The process has terminated; its thread must not return to user mode.
    Exit,
    /// The machine is shutting down.
    Halt,
}

/// Handle a trap taken by `process`.
pub fn handle_user_trap(
    kernel: &Arc<Kernel>,
    process: &mut Process,
    trap: Trap,
    frame: &mut TrapFrame,
) -> Flow {
    if process.is_halted() {
        return Flow::Halt;
    }
    if !process.is_alive() {
        return Flow::Exit;
    }
    match trap {
        Trap::Syscall => syscall::dispatch(kernel, process, frame),
        Trap::PageFault { addr } => {
            log::warn!("{}: user fault at {}", process.name(), addr);
            process.terminate(kernel, -1);
            Flow::Exit
        }
    }
}

/// The view user-mode code has of the kernel: it can only trap.
pub struct UserContext<'a> {
    kernel: &'a Arc<Kernel>,
    process: &'a mut Process,
}

impl<'a> UserContext<'a> {
    pub(crate) fn new(kernel: &'a Arc<Kernel>, process: &'a mut Process) -> Self {
        Self { kernel, process }
    }

    /// Issue a system call described by `frame`.
    pub fn syscall(&mut self, frame: &mut TrapFrame) -> Flow {
        handle_user_trap(self.kernel, self.process, Trap::Syscall, frame)
    }

    /// Report a fault on `addr`.
    pub fn fault(&mut self, addr: VirtAddr) -> Flow {
        let mut frame = TrapFrame::default();
        handle_user_trap(self.kernel, self.process, Trap::PageFault { addr }, &mut frame)
    }

    pub fn pid(&self) -> Pid {
        self.process.pid()
    }

    pub fn process(&self) -> &Process {
        &*self.process
    }
}
