//! System Call Handler
//!
//! Decodes a system call from the caller's stack and dispatches it.
//!
//! # Calling Convention
//! - `esp` addresses a sequence of 32-bit little-endian words
//! - word 0 is the call number, words 1..N its arguments
//! - a result, if any, is written to the frame's `eax`
//!
//! # Security Considerations
//! - The stack pointer and every argument word are validated before read
//! - Pointer, string and buffer arguments are validated before use
//! - A validation failure terminates the caller with status -1
//! - Failures on validated arguments report -1 and the caller continues

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use core::fmt;

use crate::fs::Fd;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, VirtAddr};
use crate::process::{Pid, Process};
use crate::trap::{Flow, TrapFrame};

use super::validate::{self, COPY_CHUNK};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u32 = 0;
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_EXEC: u32 = 2;
    pub const SYS_WAIT: u32 = 3;
    pub const SYS_CREATE: u32 = 4;
    pub const SYS_REMOVE: u32 = 5;
    pub const SYS_OPEN: u32 = 6;
    pub const SYS_FILESIZE: u32 = 7;
    pub const SYS_READ: u32 = 8;
    pub const SYS_WRITE: u32 = 9;
    pub const SYS_SEEK: u32 = 10;
    pub const SYS_TELL: u32 = 11;
    pub const SYS_CLOSE: u32 = 12;
}

/// Size of one argument word on the user stack.
pub const WORD_SIZE: usize = 4;

/// Value reported for a failed call.
pub const SENTINEL: i32 = -1;

/// Most bytes one `read` or `write` moves; larger requests are shortened
/// so the count stays positive.
const MAX_TRANSFER: usize = i32::MAX as usize;

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// An address the caller supplied is not valid user memory (fatal)
    BadAddress(VirtAddr),
    /// The descriptor is not open for this operation
    BadDescriptor(i32),
    /// The file system has no such file
    NoSuchFile,
    /// The descriptor table is full
    TableFull,
    /// The pid does not name a child the caller may wait for
    NotAChild(i32),
    /// The child program could not be loaded
    LoadFailed,
    /// A path or command line is not valid UTF-8
    BadString,
}

impl SyscallError {
    /// Check if the error terminates the caller instead of being reported.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::BadAddress(_))
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAddress(va) => write!(f, "bad user address {}", va),
            Self::BadDescriptor(fd) => write!(f, "bad file descriptor {}", fd),
            Self::NoSuchFile => write!(f, "no such file"),
            Self::TableFull => write!(f, "too many open files"),
            Self::NotAChild(pid) => write!(f, "{} is not a waitable child", pid),
            Self::LoadFailed => write!(f, "program failed to load"),
            Self::BadString => write!(f, "string is not valid UTF-8"),
        }
    }
}

/// What a handler produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Value(i32),
    Void,
    Exit,
    Halt,
}

type SysResult = Result<Reply, SyscallError>;

/// Positional argument reader over the caller's stack.
struct Args<'a> {
    space: &'a dyn AddressSpace,
    esp: VirtAddr,
}

impl Args<'_> {
    /// Validate and read word `index`.
    fn word(&self, index: usize) -> Result<u32, SyscallError> {
        let addr = self
            .esp
            .checked_add(index * WORD_SIZE)
            .ok_or(SyscallError::BadAddress(self.esp))?;
        let slot = validate::validate_user_read(self.space, addr, WORD_SIZE)?;
        let mut raw = [0u8; WORD_SIZE];
        slot.read_at(0, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn int(&self, index: usize) -> Result<i32, SyscallError> {
        self.word(index).map(|w| w as i32)
    }

    fn addr(&self, index: usize) -> Result<VirtAddr, SyscallError> {
        self.word(index).map(VirtAddr::from_word)
    }

    fn fd(&self, index: usize) -> Result<Fd, SyscallError> {
        self.word(index).map(Fd::from_word)
    }

    fn size(&self, index: usize) -> Result<usize, SyscallError> {
        self.word(index).map(|w| w as usize)
    }
}

/// Dispatch the system call described by `frame` on behalf of `process`.
pub fn dispatch(kernel: &Arc<Kernel>, process: &mut Process, frame: &mut TrapFrame) -> Flow {
    // Own a handle to the address space so handlers can borrow the process.
    let space = Arc::clone(process.space());
    let args = Args {
        space: &*space,
        esp: frame.esp,
    };

    match run(kernel, process, &args) {
        Ok(Reply::Value(value)) => {
            frame.eax = value as u32;
            Flow::Resume
        }
        Ok(Reply::Void) => Flow::Resume,
        Ok(Reply::Exit) => Flow::Exit,
        Ok(Reply::Halt) => Flow::Halt,
        Err(err) if err.is_fatal() => {
            log::warn!("{}: killed: {}", process.name(), err);
            process.terminate(kernel, -1);
            Flow::Exit
        }
        Err(err) => {
            log::debug!("{}: call failed: {}", process.name(), err);
            frame.eax = SENTINEL as u32;
            Flow::Resume
        }
    }
}

fn run(kernel: &Arc<Kernel>, process: &mut Process, args: &Args<'_>) -> SysResult {
    let nr = args.word(0)?;
    log::trace!("{} [{}]: syscall {}", process.name(), process.pid().as_i32(), nr);

    match nr {
        numbers::SYS_HALT => sys_halt(kernel, process),
        numbers::SYS_EXIT => sys_exit(kernel, process, args.int(1)?),
        numbers::SYS_EXEC => sys_exec(kernel, process, args.space, args.addr(1)?),
        numbers::SYS_WAIT => sys_wait(process, Pid::from_word(args.word(1)?)),
        numbers::SYS_CREATE => sys_create(kernel, args.space, args.addr(1)?, args.word(2)?),
        numbers::SYS_REMOVE => sys_remove(kernel, args.space, args.addr(1)?),
        numbers::SYS_OPEN => sys_open(kernel, process, args.space, args.addr(1)?),
        numbers::SYS_FILESIZE => sys_filesize(kernel, process, args.fd(1)?),
        numbers::SYS_READ => sys_read(kernel, process, args.space, args.fd(1)?, args.addr(2)?, args.size(3)?),
        numbers::SYS_WRITE => sys_write(kernel, process, args.space, args.fd(1)?, args.addr(2)?, args.size(3)?),
        numbers::SYS_SEEK => sys_seek(kernel, process, args.fd(1)?, args.word(2)?),
        numbers::SYS_TELL => sys_tell(kernel, process, args.fd(1)?),
        numbers::SYS_CLOSE => sys_close(kernel, process, args.fd(1)?),
        unknown => sys_unknown(kernel, process, unknown),
    }
}

/// Unknown call numbers are logged and ignored unless the
/// `kill-on-unknown-syscall` feature is enabled.
fn sys_unknown(kernel: &Kernel, process: &mut Process, nr: u32) -> SysResult {
    log::warn!("{}: unknown system call {}", process.name(), nr);
    if cfg!(feature = "kill-on-unknown-syscall") {
        process.terminate(kernel, -1);
        Ok(Reply::Exit)
    } else {
        Ok(Reply::Void)
    }
}

fn sys_halt(kernel: &Kernel, process: &mut Process) -> SysResult {
    log::info!("{}: halt", process.name());
    process.mark_halted();
    kernel.power().power_off();
    Ok(Reply::Halt)
}

fn sys_exit(kernel: &Kernel, process: &mut Process, status: i32) -> SysResult {
    process.terminate(kernel, status);
    Ok(Reply::Exit)
}

fn sys_exec(
    kernel: &Arc<Kernel>,
    process: &mut Process,
    space: &dyn AddressSpace,
    command: VirtAddr,
) -> SysResult {
    let command = read_string(space, command)?;
    let pid = process.exec(kernel, command)?;
    Ok(Reply::Value(pid.as_i32()))
}

fn sys_wait(process: &mut Process, pid: Pid) -> SysResult {
    process.wait(pid).map(Reply::Value)
}

fn sys_create(kernel: &Kernel, space: &dyn AddressSpace, path: VirtAddr, size: u32) -> SysResult {
    let created = match read_string(space, path) {
        Ok(path) => {
            let _fs = kernel.lock_fs();
            kernel.fs().create(&path, size)
        }
        Err(SyscallError::BadString) => false,
        Err(err) => return Err(err),
    };
    Ok(Reply::Value(created as i32))
}

fn sys_remove(kernel: &Kernel, space: &dyn AddressSpace, path: VirtAddr) -> SysResult {
    let removed = match read_string(space, path) {
        Ok(path) => {
            let _fs = kernel.lock_fs();
            kernel.fs().remove(&path)
        }
        Err(SyscallError::BadString) => false,
        Err(err) => return Err(err),
    };
    Ok(Reply::Value(removed as i32))
}

fn sys_open(kernel: &Kernel, process: &mut Process, space: &dyn AddressSpace, path: VirtAddr) -> SysResult {
    let path = read_string(space, path)?;
    let file = {
        let _fs = kernel.lock_fs();
        kernel.fs().open(&path).ok_or(SyscallError::NoSuchFile)?
    };
    match process.files_mut().insert(file) {
        Ok(fd) => Ok(Reply::Value(fd.as_i32())),
        Err(file) => {
            // Table full: close the fresh handle rather than leak it.
            let _fs = kernel.lock_fs();
            drop(file);
            Err(SyscallError::TableFull)
        }
    }
}

fn sys_close(kernel: &Kernel, process: &mut Process, fd: Fd) -> SysResult {
    if let Some(file) = process.files_mut().remove(fd) {
        let _fs = kernel.lock_fs();
        drop(file);
    }
    Ok(Reply::Void)
}

fn sys_read(
    kernel: &Kernel,
    process: &mut Process,
    space: &dyn AddressSpace,
    fd: Fd,
    buf: VirtAddr,
    len: usize,
) -> SysResult {
    let dst = validate::validate_user_write(space, buf, len)?;
    let len = len.min(MAX_TRANSFER);
    let mut chunk = vec![0u8; COPY_CHUNK.min(len)];

    if fd == Fd::STDIN {
        let console = kernel.console();
        let mut done = 0;
        while done < len {
            let n = COPY_CHUNK.min(len - done);
            chunk[..n].iter_mut().for_each(|b| *b = console.get_byte());
            dst.write_at(done, &chunk[..n])?;
            done += n;
        }
        return Ok(Reply::Value(count(done)));
    }

    let file = process
        .files_mut()
        .get_mut(fd)
        .ok_or(SyscallError::BadDescriptor(fd.as_i32()))?;
    let _fs = kernel.lock_fs();
    let mut done = 0;
    while done < len {
        let want = COPY_CHUNK.min(len - done);
        let got = file.read(&mut chunk[..want]);
        dst.write_at(done, &chunk[..got])?;
        done += got;
        if got < want {
            break;
        }
    }
    Ok(Reply::Value(count(done)))
}

fn sys_write(
    kernel: &Kernel,
    process: &mut Process,
    space: &dyn AddressSpace,
    fd: Fd,
    buf: VirtAddr,
    len: usize,
) -> SysResult {
    let src = validate::validate_user_read(space, buf, len)?;
    let len = len.min(MAX_TRANSFER);
    let mut chunk = vec![0u8; COPY_CHUNK.min(len)];

    if fd == Fd::STDOUT {
        let mut done = 0;
        while done < len {
            let n = COPY_CHUNK.min(len - done);
            src.read_at(done, &mut chunk[..n])?;
            kernel.console().put_bytes(&chunk[..n]);
            done += n;
        }
        return Ok(Reply::Value(count(done)));
    }

    let file = process
        .files_mut()
        .get_mut(fd)
        .ok_or(SyscallError::BadDescriptor(fd.as_i32()))?;
    let _fs = kernel.lock_fs();
    let mut done = 0;
    while done < len {
        let want = COPY_CHUNK.min(len - done);
        src.read_at(done, &mut chunk[..want])?;
        let put = file.write(&chunk[..want]);
        done += put;
        if put < want {
            break;
        }
    }
    Ok(Reply::Value(count(done)))
}

fn sys_seek(kernel: &Kernel, process: &mut Process, fd: Fd, pos: u32) -> SysResult {
    match process.files_mut().get_mut(fd) {
        Some(file) => {
            let _fs = kernel.lock_fs();
            // Seeking past the end lands on the end.
            let end = file.length();
            file.seek(pos.min(end));
        }
        None => log::debug!("{}: seek on {:?} ignored", process.name(), fd),
    }
    Ok(Reply::Void)
}

fn sys_tell(kernel: &Kernel, process: &mut Process, fd: Fd) -> SysResult {
    let file = process
        .files_mut()
        .get_mut(fd)
        .ok_or(SyscallError::BadDescriptor(fd.as_i32()))?;
    let _fs = kernel.lock_fs();
    Ok(Reply::Value(count(file.tell() as usize)))
}

fn sys_filesize(kernel: &Kernel, process: &mut Process, fd: Fd) -> SysResult {
    let file = process
        .files_mut()
        .get_mut(fd)
        .ok_or(SyscallError::BadDescriptor(fd.as_i32()))?;
    let _fs = kernel.lock_fs();
    Ok(Reply::Value(count(file.length() as usize)))
}

/// A byte count or offset as a return value. Counts past `i32::MAX`
/// saturate instead of wrapping into the sentinel's range.
fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Copy a NUL-terminated user string and check it is UTF-8.
fn read_string(space: &dyn AddressSpace, addr: VirtAddr) -> Result<String, SyscallError> {
    let bytes = validate::read_cstring(space, addr)?;
    String::from_utf8(bytes).map_err(|_| SyscallError::BadString)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_saturates() {
        assert_eq!(count(0), 0);
        assert_eq!(count(4096), 4096);
        assert_eq!(count(i32::MAX as usize), i32::MAX);
        assert_eq!(count(i32::MAX as usize + 1), i32::MAX);
        assert_eq!(count(u32::MAX as usize), i32::MAX);
        assert_ne!(count(u32::MAX as usize), SENTINEL);
    }
}
