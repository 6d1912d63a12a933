pub mod controller;
pub mod countdown;
pub mod state;

pub use controller::{AutoCaptureConfig, AutoCaptureController, ControllerEvent, CountdownStep};
pub use countdown::{spawn_countdown, CountdownTick, COUNTDOWN_PERIOD};
pub use state::{AutoCaptureState, CapturePhase, CountdownHandle};
