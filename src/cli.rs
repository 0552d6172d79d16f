use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "enrichbox")]
#[command(about = "Modular enrichment service", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides ENRICHBOX_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Print the enabled modules as JSON
    Modules,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
