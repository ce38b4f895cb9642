//! Program loading interface.
//!
//! Building an address space from a binary is the loader's job. The
//! process layer hands over the command line and gets back either a ready
//! image or nothing.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::fs::File;
use crate::mm::AddressSpace;
use crate::trap::UserContext;

/// User-mode execution of a loaded program, entered once the process is
/// fully set up. Every system call it makes goes through the context.
pub type UserMain = Box<dyn FnOnce(&mut UserContext<'_>) + Send + 'static>;

/// A loaded program, ready to run.
pub struct Image {
    /// The new address space.
    pub space: Arc<dyn AddressSpace>,
    /// Where user execution starts.
    pub entry: UserMain,
    /// The executable, kept open and write-protected while the program runs.
    pub executable: Option<Box<dyn File>>,
}

/// The program loader.
pub trait Loader: Send + Sync {
    /// Load the program named by the first word of `command`, passing the
    /// rest as arguments. `None` if it cannot be loaded.
    fn load(&self, command: &str) -> Option<Image>;
}
