//! Event dispatch to the gain/loss handlers

use crate::core::{Event, EventCounters, EventKind, Result, Transition};

/// Reacts to one kind of transition
pub trait Handler {
    fn handle(&mut self, event: &Event) -> Result<()>;
}

impl<F> Handler for F
where
    F: FnMut(&Event) -> Result<()>,
{
    fn handle(&mut self, event: &Event) -> Result<()> {
        self(event)
    }
}

/// Handler that does nothing
pub struct NoopHandler;

impl Handler for NoopHandler {
    fn handle(&mut self, _event: &Event) -> Result<()> {
        Ok(())
    }
}

/// Owns the handler slots and the event counters
pub struct EventDispatcher {
    on_gain: Box<dyn Handler>,
    on_loss: Box<dyn Handler>,
    counters: EventCounters,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            on_gain: Box::new(NoopHandler),
            on_loss: Box::new(NoopHandler),
            counters: EventCounters::default(),
        }
    }

    /// Replace the handler for `kind`
    pub fn set_handler(&mut self, kind: EventKind, handler: impl Handler + 'static) {
        let slot = match kind {
            EventKind::Gain => &mut self.on_gain,
            EventKind::Loss => &mut self.on_loss,
        };
        *slot = Box::new(handler);
    }

    /// Builder-style variant of [`set_handler`](Self::set_handler)
    pub fn with_handler(mut self, kind: EventKind, handler: impl Handler + 'static) -> Self {
        self.set_handler(kind, handler);
        self
    }

    /// Count the transition and run its handler.
    ///
    /// Handler errors are logged and swallowed. Returns the event that was
    /// dispatched, or `None` for a `TransitionKind::None`.
    pub fn dispatch(&mut self, transition: &Transition) -> Option<Event> {
        let kind = transition.kind.event()?;
        let event = Event {
            kind,
            reading: transition.reading,
            count: self.counters.record(kind),
        };

        let handler = match kind {
            EventKind::Gain => &mut self.on_gain,
            EventKind::Loss => &mut self.on_loss,
        };
        if let Err(e) = handler.handle(&event) {
            log::warn!("Moisture {} handler failed: {}", kind, e);
        }

        Some(event)
    }

    /// Counts since process start
    pub fn counters(&self) -> EventCounters {
        self.counters
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Default gain handler: log the event
pub fn log_gain(event: &Event) -> Result<()> {
    log::info!("Moisture gain detected! (#{})", event.count);
    Ok(())
}

/// Default loss handler: log the event
pub fn log_loss(event: &Event) -> Result<()> {
    log::info!("Moisture loss detected! (#{})", event.count);
    Ok(())
}
