mod inspect;
mod options;
mod run;

use anyhow::Result;
use clap::Parser;
use options::Cli;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli {
        Cli::Run(run) => run.run(),
        Cli::Inspect(inspect) => inspect.run(),
    }
}
