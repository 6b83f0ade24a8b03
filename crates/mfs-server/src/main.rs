use anyhow::Context;
use mfs_server::{Server, ServerConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(socket_path) = args.next() else {
        eprintln!("usage: mfs-server <socket-path>");
        std::process::exit(2);
    };
    if args.next().is_some() {
        anyhow::bail!("unexpected extra argument; usage: mfs-server <socket-path>");
    }

    let server = Server::new(ServerConfig::new(socket_path.as_str()))
        .with_context(|| format!("initialize filesystem for {socket_path}"))?;
    server
        .serve()
        .with_context(|| format!("serve on {socket_path}"))
}
