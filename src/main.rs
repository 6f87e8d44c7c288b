use oplog::cli::{self, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("oplog=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Command::parse(std::env::args().skip(1))? {
        Command::Serve => cli::serve().await,
        Command::Shell(options) => cli::shell(&options).await,
        Command::Help => {
            println!("{}", cli::USAGE);
            Ok(())
        }
    }
}
