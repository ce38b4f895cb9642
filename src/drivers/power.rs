//! Machine power control.

/// Power management, as reached by the `halt` call.
pub trait PowerControl: Send + Sync {
    /// Shut the machine down.
    ///
    /// On hardware this does not return; hosted implementations may.
    fn power_off(&self);
}
