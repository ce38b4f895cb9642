//! Console device interface
//!
//! Descriptor 0 reads from the console keyboard and descriptor 1 writes to
//! the console display, whatever a process's descriptor table holds.
//!
//! # Security Considerations
//! - Output is handed over in one call per line so lines from different
//!   processes never interleave mid-line
//! - The console never sees user pointers, only kernel copies

use alloc::string::String;
use core::fmt::{self, Write};

/// The console device.
pub trait Console: Send + Sync {
    /// Write bytes to the display.
    fn put_bytes(&self, bytes: &[u8]);

    /// Read one byte from the keyboard, waiting for input if necessary.
    fn get_byte(&self) -> u8;
}

/// Format `args` plus a newline and write it to `console` as one chunk.
pub fn print_line(console: &dyn Console, args: fmt::Arguments<'_>) {
    let mut line = String::new();
    // Writing into a String cannot fail
    let _ = line.write_fmt(args);
    line.push('\n');
    console.put_bytes(line.as_bytes());
}

/// Println-style output to a console.
#[macro_export]
macro_rules! cprintln {
    ($console:expr, $($arg:tt)*) => {
        $crate::drivers::console::print_line($console, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemConsole;

    #[test]
    fn test_line_written_in_one_chunk() {
        let console = MemConsole::new();
        cprintln!(&console, "{}: exit({})", "echo", 0);
        assert_eq!(console.output(), "echo: exit(0)\n");
        assert_eq!(console.writes(), 1);
    }
}
