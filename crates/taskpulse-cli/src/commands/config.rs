//! Configuration inspection command.

use anyhow::Result;
use clap::Args;

use super::ConfigSource;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub source: ConfigSource,
}

pub fn execute(args: ConfigArgs) -> Result<()> {
    let config = args.source.resolve()?;
    print!("{}", config.to_toml()?);
    Ok(())
}
