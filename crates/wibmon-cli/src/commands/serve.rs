use std::sync::Arc;

use wibmon_core::{DirStore, DocumentStore, MonitorConfig};

pub fn run(config: &MonitorConfig, host: &str, port: u16) {
    let store: Arc<dyn DocumentStore> = Arc::new(DirStore::new(&config.output_dir));

    let base = format!("http://{host}:{port}");
    println!("wibmon dashboard server v{}", wibmon_core::VERSION);
    println!("   {base}");
    println!("   serving {}", config.output_dir.display());
    println!();
    println!("   Endpoints:");
    println!("     GET /                 Fleet dashboard");
    println!("     GET /wibs/NAME.html   Board status page");
    println!("     GET /wibs/NAME.json   Board record");
    println!("     GET /status.json      Fleet snapshot");
    println!("     GET /health           Last cycle summary");
    println!();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(wibmon_server::run_server(store, host, port)) {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}
