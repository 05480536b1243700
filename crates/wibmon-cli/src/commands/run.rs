use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use wibmon_core::MonitorConfig;

pub fn run(config: &MonitorConfig) {
    let mut monitor = super::make_monitor(config);

    // Set up Ctrl+C handler
    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        s.store(true, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    println!("wibmon v{}", wibmon_core::VERSION);
    println!("  Devices:   {}", monitor.devices().len());
    println!("  Interval:  {}s", config.interval_secs);
    println!("  Tool:      {} (timeout {}s)", config.tool, config.query_timeout_secs);
    println!("  Output:    {}", config.output_dir.display());
    println!("  Press Ctrl+C to stop.");
    println!();

    monitor.run_forever(&stop);
}
