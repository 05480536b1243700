use wibmon_core::{Device, resolve};

pub fn run(addresses: &[String], json: bool) {
    let devices: Vec<Device> = addresses.iter().map(|a| resolve(a)).collect();

    if json {
        match serde_json::to_string_pretty(&devices) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("{:<20} {:<16} Zone", "Address", "Name");
    println!("{}", "-".repeat(46));
    for device in &devices {
        let zone = device.zone.map_or("unassigned", |z| z.as_str());
        println!("{:<20} {:<16} {zone}", device.address, device.name);
    }
}
