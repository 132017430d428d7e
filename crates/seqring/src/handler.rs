//! Consumer callbacks.

use crate::metrics::Metrics;

/// Error returned by [`EventHandler::on_event`].
pub type HandlerError = anyhow::Error;

/// Receives drained events.
///
/// `context` names the consumer (the worker thread name, or whatever the
/// caller passes to a poll) so one handler type can serve several rings.
///
/// A failed `on_event` is reported to `on_error` and the sequence still
/// counts as consumed: the event is never redelivered and later events keep
/// flowing. Retrying is up to the handler.
pub trait EventHandler<T> {
    fn on_event(&mut self, context: &str, event: &mut T, sequence: i64) -> anyhow::Result<()>;

    /// Called once for each event whose `on_event` failed. Logs a warning
    /// by default.
    fn on_error(&mut self, context: &str, _event: &mut T, sequence: i64, error: &HandlerError) {
        tracing::warn!(context, sequence, error = %error, "event handler failed");
    }

    /// Called on the consumer thread before the first poll.
    fn on_start(&mut self, _context: &str) {}

    /// Called on the consumer thread after the last poll.
    fn on_shutdown(&mut self, _context: &str) {}
}

/// Closures taking `(event, sequence)` are handlers with the default
/// error and lifecycle callbacks.
impl<T, F> EventHandler<T> for F
where
    F: FnMut(&mut T, i64) -> anyhow::Result<()>,
{
    #[inline]
    fn on_event(&mut self, _context: &str, event: &mut T, sequence: i64) -> anyhow::Result<()> {
        self(event, sequence)
    }
}

/// Runs `on_event`, routing a failure to `on_error`.
#[inline]
pub(crate) fn dispatch<T, H>(handler: &mut H, context: &str, event: &mut T, sequence: i64, metrics: Option<&Metrics>)
where
    H: EventHandler<T> + ?Sized,
{
    if let Err(error) = handler.on_event(context, event, sequence) {
        if let Some(metrics) = metrics {
            metrics.add_handler_error();
        }
        handler.on_error(context, event, sequence, &error);
    }
}
