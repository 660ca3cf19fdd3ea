use clap::Parser;
use injector::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::execute_serve(args).await?,
        Commands::Register(args) => commands::execute_register(args).await?,
        Commands::Resolve(args) => commands::execute_resolve(args).await?,
    }

    Ok(())
}
