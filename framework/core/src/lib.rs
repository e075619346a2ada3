mod bail;
mod error;
mod shutdown;

pub mod prelude {
    pub use crate::bail::VuBailError;
    pub use crate::error::{AssertionFailure, ConfigError, RequestError, ThresholdBreach};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
