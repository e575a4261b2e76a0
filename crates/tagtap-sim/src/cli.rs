use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tagtap-sim")]
#[command(about = "Replay scripted NFC tag taps through the tagtap dispatcher")]
#[command(version)]
pub struct Args {
    /// JSON replay script
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// TOML configuration file (defaults to the platform config path)
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,
}
