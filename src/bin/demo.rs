//! Moisture Monitor - Demo CLI
//!
//! Runs the detection pipeline against the simulated probe and prints every
//! reading with its classification. No hardware or SMTP server needed.

use moisture_monitor_lib::acquisition::AnalogMonitor;
use moisture_monitor_lib::core::{Event, EventKind, Result, TransitionKind};
use moisture_monitor_lib::monitor::{EventDispatcher, PollingLoop};
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

const TICKS: u64 = 40;
const TICK_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("==============================================");
    println!("   Moisture Monitor - Demo CLI");
    println!("==============================================\n");

    let monitor = AnalogMonitor::simulated();
    println!("Source: {}", monitor.get_source_name());
    println!("Ticks:  {} every {:?}\n", TICKS, TICK_INTERVAL);

    let dispatcher = EventDispatcher::new()
        .with_handler(EventKind::Gain, |event: &Event| -> Result<()> {
            println!("        -> gain #{} (watered)", event.count);
            Ok(())
        })
        .with_handler(EventKind::Loss, |event: &Event| -> Result<()> {
            println!("        -> loss #{} (would email)", event.count);
            Ok(())
        });

    let mut polling = PollingLoop::new(monitor, dispatcher, 0, TICK_INTERVAL);

    println!("----------------------------------------------");
    println!("  Tick  |  Value  |  Transition");
    println!("----------------------------------------------");

    for _ in 0..TICKS {
        match polling.tick()? {
            Some(transition) => {
                let label = match transition.kind {
                    TransitionKind::None => "-",
                    TransitionKind::Gain => "gain",
                    TransitionKind::Loss => "loss",
                };
                println!(
                    "  {:>4}  |  {:>5}  |  {}",
                    transition.reading.sequence, transition.reading.value, label
                );
            }
            None => println!("  (reading skipped)"),
        }
        io::stdout().flush()?;
        thread::sleep(TICK_INTERVAL);
    }

    let counters = polling.counters();
    println!("\n----------------------------------------------\n");
    println!("=== Summary ===\n");
    println!("  Gains:   {}", counters.gains);
    println!("  Losses:  {}", counters.losses);
    println!();

    Ok(())
}
