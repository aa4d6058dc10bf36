use anyhow::{Context, Result};
use sample::config::Config;
use std::{path::PathBuf, sync::Arc};
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
/// Sample images from a trained scene-graph-to-image model
struct Args {
    #[structopt(long, default_value = "sample.json5")]
    /// configuration file
    pub config_file: PathBuf,
}

pub fn main() -> Result<()> {
    pretty_env_logger::init();

    // parse arguments
    let Args { config_file } = Args::from_args();
    let config = Arc::new(
        Config::open(&config_file)
            .with_context(|| format!("failed to load config file '{}'", config_file.display()))?,
    );

    // run the evaluation pass
    let summary = sample::start(config)?;
    println!("{}", summary);

    Ok(())
}
