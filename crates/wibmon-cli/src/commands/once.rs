use wibmon_core::MonitorConfig;

pub fn run(config: &MonitorConfig) {
    let mut monitor = super::make_monitor(config);
    match monitor.run_cycle() {
        Ok(summary) => {
            println!(
                "{} devices: {} good, {} busy, {} absent, {} skipped",
                monitor.devices().len(),
                summary.good,
                summary.busy,
                summary.absent,
                summary.skipped
            );
            println!("Dashboard: {}", config.output_dir.join("index.html").display());
        }
        Err(e) => {
            eprintln!("Cycle failed: {e}");
            std::process::exit(1);
        }
    }
}
