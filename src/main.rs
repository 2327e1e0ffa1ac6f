use clap::Parser;
use tracing_subscriber::EnvFilter;

use variantdb::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("variantdb=debug,info")
    } else {
        EnvFilter::new("variantdb=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config = cli.store_config()?;

    match cli.command {
        cli::Commands::Build(args) => {
            cli::build::run(args, &config, cli.format, cli.verbose)?;
        }
        cli::Commands::Query(args) => {
            cli::query::run(args, &config, cli.format, cli.verbose)?;
        }
        cli::Commands::Info => {
            cli::info::run(&config, cli.format)?;
        }
    }

    Ok(())
}
