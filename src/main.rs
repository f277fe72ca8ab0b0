//! Scan the local network for Companion-link devices and print what we find.

use companion_discovery::ServiceBrowser;
use std::time::Duration;

const SCAN_WINDOW: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let browser = match ServiceBrowser::new() {
        Ok(browser) => browser,
        Err(e) => {
            eprintln!("failed to start mDNS browser: {e}");
            std::process::exit(1);
        }
    };

    println!("Scanning for Companion devices ({}s)...", SCAN_WINDOW.as_secs());
    match browser.browse_for(SCAN_WINDOW).await {
        Ok(devices) if devices.is_empty() => println!("No devices found."),
        Ok(mut devices) => {
            devices.sort_by(|a, b| a.name.cmp(&b.name));
            for device in devices {
                let address = device
                    .best_address()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{:<24} {}:{}  model={}  pin_pairing={}",
                    device.name,
                    address,
                    device.port,
                    device.model.as_deref().unwrap_or("unknown"),
                    if device.is_pairable() { "yes" } else { "no" },
                );
            }
        }
        Err(e) => {
            eprintln!("scan failed: {e}");
            std::process::exit(1);
        }
    }

    browser.shutdown();
}
