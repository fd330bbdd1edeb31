use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[clap(about = "Telemetry data-acquisition client and log writer")]
pub struct Args {
    #[clap(help = "HOST[:PORT], the default port is 5510")]
    pub source: String,
    #[clap(
        short = 'o',
        long,
        help = "Log file path",
        default_value = "telemetry.log"
    )]
    pub output: PathBuf,
    #[clap(
        short = 'n',
        long,
        help = "Sampling request parameter sent to the server",
        default_value = "1"
    )]
    pub samples: u32,
    #[clap(short = 't', long, help = "Connect/read timeout in seconds")]
    pub timeout: Option<u64>,
    #[clap(
        long,
        help = "Reconnect attempts after a failed run",
        default_value = "0"
    )]
    pub max_retries: u32,
    #[clap(long, help = "Keep the log file open between records")]
    pub keep_open: bool,
}
