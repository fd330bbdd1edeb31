//! Minimal programmatic capture against a local server.

use std::time::Duration;

use daq_log::TelemetryLogger;

fn main() {
    let logger = TelemetryLogger::new("127.0.0.1", daq_log::DEFAULT_PORT, "capture.log")
        .with_connect_timeout(Duration::from_secs(5))
        .with_read_timeout(Duration::from_secs(10));
    match logger.run(3) {
        Ok(stats) => println!("received {} records, logged {}", stats.received, stats.logged),
        Err(error) => eprintln!("capture failed: {}", error),
    }
}
