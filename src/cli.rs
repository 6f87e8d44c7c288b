use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Local;
use tokio::io::BufReader;
use tokio::net::TcpListener;

use crate::auth;
use crate::client::{EntryService, HttpTransport, RpcClient, Shell, Transport};
use crate::config::{ClientConfig, Config, Credentials};
use crate::{build_app, db};

pub const USAGE: &str = "\
usage: oplog [serve]
       oplog shell [--url URL] [--user NAME] [--password PASSWORD] [--app APP --key KEY]";

const SHELL_OPTIONS: [&str; 5] = ["url", "user", "password", "app", "key"];

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Serve,
    Shell(HashMap<String, String>),
    Help,
}

impl Command {
    /// Parse the arguments following the program name.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        match args.next().as_deref() {
            None | Some("serve") => Ok(Command::Serve),
            Some("help" | "-h" | "--help") => Ok(Command::Help),
            Some("shell") => {
                let mut options = HashMap::new();
                while let Some(flag) = args.next() {
                    let Some(name) = flag.strip_prefix("--").filter(|name| SHELL_OPTIONS.contains(name)) else {
                        bail!("unknown option {flag}\n{USAGE}");
                    };
                    let value = args.next().with_context(|| format!("{flag} needs a value"))?;
                    options.insert(name.to_string(), value);
                }
                Ok(Command::Shell(options))
            }
            Some(other) => bail!("unknown command {other}\n{USAGE}"),
        }
    }
}

pub async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;
    let app = build_app(pool, &config, auth::authenticator(&config.authentication))
        .await
        .context("failed to migrate session store")?;

    let addr = config.addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("unable to bind {addr}"))?;

    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn shell(options: &HashMap<String, String>) -> anyhow::Result<()> {
    let config = ClientConfig::resolve(options)?;

    let transport = match &config.credentials {
        Credentials::Login { username, password } => {
            let transport = HttpTransport::new(config.url.clone())?;
            transport.login(username, password).await?;
            transport
        }
        Credentials::Application { app, key } => {
            HttpTransport::with_application_key(config.url.clone(), app, key)?
        }
    };
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let service = EntryService::new(RpcClient::new(transport));
    let mut shell = Shell::new(service, Some(config.credentials.viewer()), Local);
    let input = BufReader::new(tokio::io::stdin());
    let mut output = std::io::stdout();
    shell.run(input, &mut output).await?;
    Ok(())
}
