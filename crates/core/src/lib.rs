//! Core emulator primitives and traits.

pub mod cpu_8086;
pub mod logging;

use serde_json::Value;

/// A CPU-like component that can be stepped one instruction at a time.
pub trait Cpu {
    type Error: std::error::Error + Send + Sync + 'static;

    fn reset(&mut self);
    fn step(&mut self) -> Result<(), Self::Error>;
    fn is_halted(&self) -> bool;
}

/// Description of a mount point (media slot) that a system supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Unique identifier for this mount point (e.g., "Program")
    pub id: String,
    /// User-friendly name for display (e.g., "DOS Program")
    pub name: String,
    /// File extensions accepted by this mount point (e.g., ["com"])
    pub extensions: Vec<String>,
    /// Whether this mount point is required for the system to function
    pub required: bool,
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Return a JSON-serializable save state for debugging.
    /// Save states hold emulator state only, never the mounted media.
    fn save_state(&self) -> Value;

    /// Load a JSON save state.
    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false
    }

    /// Get the list of mount points this system supports
    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Load media into a specific mount point
    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Unload media from a specific mount point
    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    /// Check if a mount point has media loaded
    fn is_mounted(&self, mount_point_id: &str) -> bool;
}
