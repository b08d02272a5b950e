mod apps;
mod bundle;
mod catalog;
mod cli;
mod config;
mod error;
mod filter;
mod log;
mod options;
mod patcher;
mod selection;
mod session;
mod sources;
mod writer;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
