//! SenseHAT collaborators: sensor array, LED matrix and joystick.
//!
//! Each wrapper implements the small [`Hardware`] capability on its own
//! (no shared base type); the stream coordinator composes them and is
//! responsible for disabling each exactly once during shutdown. The
//! backends here are emulated; a physical SenseHAT binding would slot
//! in behind the same types.

pub mod joystick;
pub mod led;
pub mod sensor;

pub use joystick::{Joystick, JoystickDirection, JoystickReading};
pub use led::{LedError, LedMatrix, LedSettings};
pub use sensor::{Reading, SensorArray, SensorSettings};

/// Enable-state and teardown capability shared by all hardware
/// wrappers. `disable` must be idempotent.
pub trait Hardware {
    fn enabled(&self) -> bool;
    fn disable(&mut self);
}
