//! Metrics and observability infrastructure.

pub mod events;
pub mod server;

pub use server::{init, init_test};

/// Emit a metric event.
///
/// Calls `InternalEvent::emit()` on the given event, recording the
/// corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use drift::metrics::events::RecordsProcessed;
///
/// emit!(RecordsProcessed { count: 100, catalog: "products".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
