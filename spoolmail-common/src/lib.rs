pub mod logging;

pub use tracing;

/// Broadcast to long running tasks when the process should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
