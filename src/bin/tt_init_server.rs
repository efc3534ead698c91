use std::path::PathBuf;

use clap::Parser;

/// Create a server base directory with its configuration and TLS identity.
#[derive(Parser, Debug)]
#[command(name = "tt-init-server")]
struct Args {
    /// The directory in which to store the configuration.
    directory: PathBuf,
    /// The address to listen on.
    listen_addr: String,
    /// The public address that clients will connect to.
    public_addr: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    trustrpc::provision::init_server(&args.directory, &args.listen_addr, &args.public_addr)?;
    Ok(())
}
