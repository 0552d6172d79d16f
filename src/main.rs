mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use enrichbox::api::models::ModuleInfo;
use enrichbox::config::Config;
use enrichbox::dispatch::DispatchPolicy;
use enrichbox::handlers::ModuleRegistry;
use enrichbox::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    observability::init_tracing(&config.telemetry.log_filter);

    match cli.command {
        Commands::Server(args) => enrichbox::api::run(config, args.address).await?,
        Commands::Modules => print_modules(&config)?,
    }

    Ok(())
}

fn print_modules(config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = ModuleRegistry::with_builtins()?;
    let policy = DispatchPolicy::from_config(config);
    let modules: Vec<ModuleInfo> = registry
        .list()
        .filter(|descriptor| policy.is_enabled(&descriptor.name))
        .map(|descriptor| ModuleInfo::new(descriptor, policy.timeout_for(descriptor)))
        .collect();

    println!("{}", serde_json::to_string_pretty(&modules)?);
    Ok(())
}
