//! The process-lifetime polling loop

use crate::acquisition::AnalogMonitor;
use crate::core::{AcquisitionSettings, Error, EventCounters, Reading, Result, Transition, TransitionKind};
use crate::monitor::{EventDispatcher, TransitionDetector};
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of the loop. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Why the loop stopped
#[derive(Debug)]
pub enum StopReason {
    /// Termination signal
    Shutdown,
    /// The acquisition device is gone
    DeviceLost(Error),
}

/// Reads, classifies and dispatches at a fixed cadence
pub struct PollingLoop {
    monitor: AnalogMonitor,
    detector: TransitionDetector,
    dispatcher: EventDispatcher,
    channel: u32,
    interval: Duration,
    sequence: u64,
    state: LoopState,
}

impl PollingLoop {
    pub fn new(monitor: AnalogMonitor, dispatcher: EventDispatcher, channel: u32, interval: Duration) -> Self {
        Self {
            monitor,
            detector: TransitionDetector::new(),
            dispatcher,
            channel,
            interval,
            sequence: 0,
            state: LoopState::Idle,
        }
    }

    /// Build from resolved acquisition settings
    pub fn from_settings(monitor: AnalogMonitor, dispatcher: EventDispatcher, settings: &AcquisitionSettings) -> Self {
        Self::new(monitor, dispatcher, settings.channel, settings.interval)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn counters(&self) -> EventCounters {
        self.dispatcher.counters()
    }

    /// Run one iteration: read, classify, dispatch.
    ///
    /// Returns `Ok(None)` when a transient read fault skipped the tick. A
    /// permanent fault is returned as the error.
    pub fn tick(&mut self) -> Result<Option<Transition>> {
        let sequence = self.sequence;
        self.sequence += 1;

        let value = match self.monitor.read_channel(self.channel) {
            Ok(value) => value,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Skipping reading #{}: {}", sequence, e);
                return Ok(None);
            }
        };

        let transition = self.detector.observe(Reading::new(sequence, value));
        // Handler line first, then the value it was triggered by
        self.dispatcher.dispatch(&transition);
        if transition.kind == TransitionKind::None {
            log::debug!("Value: {} (unchanged)", value);
        } else {
            log::info!("Value: {}", value);
        }

        Ok(Some(transition))
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped) or the
    /// device is lost. Always leaves the loop `Stopped`.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> StopReason {
        self.state = LoopState::Running;
        log::info!(
            "Monitoring channel {} every {:.1}s using {}",
            self.channel,
            self.interval.as_secs_f64(),
            self.monitor.get_source_name()
        );

        let reason = loop {
            if *shutdown.borrow() {
                break StopReason::Shutdown;
            }

            if let Err(e) = self.tick() {
                log::error!("{}", e);
                break StopReason::DeviceLost(e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break StopReason::Shutdown;
                    }
                }
            }
        };

        self.stop();
        reason
    }

    /// Final log entry and resource release
    fn stop(&mut self) {
        self.state = LoopState::Stopping;
        let counters = self.dispatcher.counters();
        log::info!(
            "Exiting... ({} gain(s), {} loss(es) over {} reading(s))",
            counters.gains,
            counters.losses,
            self.sequence
        );
        self.monitor.release();
        log::logger().flush();
        self.state = LoopState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AnalogSource;
    use crate::core::{Event, EventKind};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays scripted results and counts reads
    struct Scripted {
        script: VecDeque<Result<i32>>,
        reads: Rc<Cell<usize>>,
        released: Rc<Cell<bool>>,
    }

    impl AnalogSource for Scripted {
        fn read_channel(&mut self, _channel: u32) -> Result<i32> {
            self.reads.set(self.reads.get() + 1);
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(Error::TransientAcquisition("script exhausted".into())))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn release(&mut self) {
            self.released.set(true);
        }
    }

    struct Harness {
        reads: Rc<Cell<usize>>,
        released: Rc<Cell<bool>>,
    }

    fn polling(script: Vec<Result<i32>>, dispatcher: EventDispatcher) -> (PollingLoop, Harness) {
        let harness = Harness {
            reads: Rc::new(Cell::new(0)),
            released: Rc::new(Cell::new(false)),
        };
        let source = Scripted {
            script: script.into(),
            reads: Rc::clone(&harness.reads),
            released: Rc::clone(&harness.released),
        };
        let monitor = AnalogMonitor::from_source(source);
        (PollingLoop::new(monitor, dispatcher, 0, Duration::from_secs(5)), harness)
    }

    fn kinds(transitions: &[Option<Transition>]) -> Vec<Option<TransitionKind>> {
        transitions.iter().map(|t| t.map(|t| t.kind)).collect()
    }

    #[test]
    fn test_watering_scenario() {
        let (mut polling, _) = polling(vec![Ok(600), Ok(600), Ok(550), Ok(700)], EventDispatcher::new());
        let transitions: Vec<_> = (0..4).map(|_| polling.tick().unwrap()).collect();

        assert_eq!(
            kinds(&transitions),
            vec![
                Some(TransitionKind::Loss),
                Some(TransitionKind::None),
                Some(TransitionKind::Gain),
                Some(TransitionKind::Loss),
            ]
        );
        assert_eq!(polling.counters(), EventCounters { gains: 1, losses: 2 });

        let sequences: Vec<u64> = transitions.iter().map(|t| t.unwrap().reading.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_transient_fault_skips_tick() {
        let script = vec![
            Ok(600),
            Err(Error::TransientAcquisition("spi busy".into())),
            Ok(550),
        ];
        let (mut polling, harness) = polling(script, EventDispatcher::new());

        assert!(polling.tick().unwrap().is_some());
        assert!(polling.tick().unwrap().is_none());
        // Compared against 600, the last good reading
        assert_eq!(polling.tick().unwrap().unwrap().kind, TransitionKind::Gain);
        assert_eq!(harness.reads.get(), 3);
    }

    #[test]
    fn test_failed_notification_does_not_stop_polling() {
        let losses = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&losses);
        let dispatcher = EventDispatcher::new().with_handler(EventKind::Loss, move |event: &Event| -> Result<()> {
            seen.borrow_mut().push(event.reading.value);
            Err(Error::Notification("535 authentication failed".into()))
        });
        let (mut polling, harness) = polling(vec![Ok(600), Ok(650), Ok(640)], dispatcher);

        for _ in 0..3 {
            polling.tick().unwrap();
        }

        assert_eq!(*losses.borrow(), vec![600, 650]);
        assert_eq!(harness.reads.get(), 3);
        assert_eq!(polling.counters(), EventCounters { gains: 1, losses: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_fault_stops_without_further_reads() {
        let script = vec![
            Ok(600),
            Err(Error::PermanentAcquisition("device not found".into())),
            Ok(700),
        ];
        let (mut polling, harness) = polling(script, EventDispatcher::new());
        let (_tx, rx) = watch::channel(false);

        let reason = polling.run(rx).await;

        assert!(matches!(reason, StopReason::DeviceLost(Error::PermanentAcquisition(_))));
        assert_eq!(harness.reads.get(), 2);
        assert!(harness.released.get());
        assert_eq!(polling.state(), LoopState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_sleep() {
        let script = (0..100).map(|i| Ok(500 + i)).collect();
        let (mut polling, harness) = polling(script, EventDispatcher::new());
        let (tx, rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        let stopper = async move {
            tokio::time::sleep(Duration::from_millis(12_500)).await;
            tx.send(true).unwrap();
            // Keep the sender alive until the loop has seen the signal
            tokio::time::sleep(Duration::from_secs(60)).await;
        };

        let reason = tokio::select! {
            reason = polling.run(rx) => reason,
            _ = stopper => panic!("loop did not stop"),
        };

        assert!(matches!(reason, StopReason::Shutdown));
        // Reads at t = 0, 5 and 10; the signal at 12.5 cuts the third sleep short
        assert_eq!(harness.reads.get(), 3);
        assert!(started.elapsed() < Duration::from_secs(15));
        assert!(harness.released.get());
        assert_eq!(polling.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_signal_before_start_reads_nothing() {
        let (mut polling, harness) = polling(vec![Ok(600)], EventDispatcher::new());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        assert!(matches!(polling.run(rx).await, StopReason::Shutdown));
        assert_eq!(harness.reads.get(), 0);
        assert_eq!(polling.state(), LoopState::Stopped);
    }

    thread_local! {
        static LINES: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    /// Collects log lines emitted on the calling thread
    struct Capture;

    impl log::Log for Capture {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            LINES.with(|lines| lines.borrow_mut().push(record.args().to_string()));
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture;

    fn captured() -> Vec<String> {
        LINES.with(|lines| lines.borrow().clone())
    }

    #[test]
    fn test_handler_line_precedes_value_line() {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Debug);

        let dispatcher = EventDispatcher::new()
            .with_handler(EventKind::Gain, crate::monitor::log_gain)
            .with_handler(EventKind::Loss, crate::monitor::log_loss);
        let (mut polling, _) = polling(vec![Ok(600), Ok(550)], dispatcher);
        polling.tick().unwrap();
        polling.tick().unwrap();

        let lines = captured();
        let position = |needle: &str| lines.iter().position(|line| line == needle);
        let loss = position("Moisture loss detected! (#1)").unwrap();
        let first_value = position("Value: 600").unwrap();
        let gain = position("Moisture gain detected! (#1)").unwrap();
        let second_value = position("Value: 550").unwrap();
        assert!(loss < first_value);
        assert!(first_value < gain);
        assert!(gain < second_value);
    }

    #[test]
    fn test_new_loop_is_idle() {
        let (polling, _) = polling(Vec::new(), EventDispatcher::new());
        assert_eq!(polling.state(), LoopState::Idle);
    }
}
