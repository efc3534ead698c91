use std::path::PathBuf;

use clap::Parser;
use trustrpc::paths;

/// Enroll a client: write its configuration and its server-side credential.
#[derive(Parser, Debug)]
#[command(name = "tt-add-client")]
struct Args {
    /// The server directory created by tt-init-server.
    directory: PathBuf,
    /// The user's unique username.
    user_name: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    trustrpc::provision::add_client(&args.directory, &args.user_name)?;
    println!(
        "Client configuration written to {}",
        paths::client_config_file(&args.directory, &args.user_name).display()
    );
    Ok(())
}
