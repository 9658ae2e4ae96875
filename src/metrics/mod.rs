//! Metrics and observability infrastructure for playlake.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP endpoint that lives for the duration of a run

pub mod events;
pub mod server;

pub use server::{MetricsServer, init};

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use playlake::metrics::events::RowsSkipped;
///
/// emit!(RowsSkipped { table: "songs", count: 3 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
