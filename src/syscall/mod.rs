//! System Call Interface
//!
//! The boundary between untrusted user processes and the kernel.
//!
//! # Security Model
//! - Whitelist approach: only the calls in `numbers` do anything
//! - Every pointer, string and buffer argument is validated before use,
//!   on every call
//! - Invalid memory terminates the caller; invalid but readable input
//!   reports -1
//!
//! # Calls
//! - process: halt, exit, exec, wait
//! - files: create, remove, open, close, read, write, seek, tell, filesize

mod handler;
pub mod validate;


pub use handler::{dispatch, numbers, SyscallError, SENTINEL, WORD_SIZE};
pub use validate::{valid_address, valid_buffer, valid_cstring, UserBuffer, UserBufferMut};
