mod cli;
mod common;
mod config;
pub mod dashboard;
pub mod error;
mod logging;
pub mod models;
pub mod provider_store;
pub mod quota;
pub mod server;
#[cfg(test)]
mod test_support;
pub mod transfer;
mod utils;

use clap::Parser;

use cli::Cli;
use error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(&cli.log_level)?;
    cli::execute(cli)
}
