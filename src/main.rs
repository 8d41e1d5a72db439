use clap::Parser;
use probbc::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    cli.run()?;
    Ok(())
}
