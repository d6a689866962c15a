pub mod clock;
pub mod error;
pub mod lock;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CaptureError, CaptureResult, ConfigError};
pub use logging::{ComponentLogger, LogContext};
