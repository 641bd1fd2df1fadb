use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding settings.json, the server store, and log files
    #[arg(long, env = "SAMP_DIRECTORY_HOME", default_value = ".")]
    pub data_dir: PathBuf,

    /// Refresh the directory on startup instead of waiting for the daily refresh
    #[arg(long, aliases(["recreatedb", "updatedb"]))]
    pub refresh_now: bool,

    /// Run a single refresh, print the resulting directory as JSON, then exit
    #[arg(long)]
    pub once: bool,

    /// Masterlist to read, may be repeated. Replaces the masterlists found in settings.json
    #[arg(long = "masterlist", value_name = "URL")]
    pub masterlists: Vec<String>,
}
