use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use uc_xbox_presence::config::ConfigStore;
use uc_xbox_presence::driver::Driver;
use uc_xbox_presence::hub::LoggingHub;
use uc_xbox_presence::logging::{init_tracing, DEFAULT_FILTER};
use uc_xbox_presence::presence::GiantBombSearch;
use uc_xbox_presence::setup::{
    SetupRequest, SetupResponse, FIELD_AUTH_URL, FIELD_GIANTBOMB_API_KEY, FIELD_LIVEID,
    FIELD_REDIRECT_URL,
};
use uc_xbox_presence::util::env as env_util;
use uc_xbox_presence::xbox::auth::OAuthClient;
use uc_xbox_presence::xbox::{TransportSettings, XboxLiveConnector};

const BIN_NAME: &str = "uc-xbox-presence";

#[derive(Parser, Debug)]
#[command(name = "uc-xbox-presence", version, about = "Xbox Live presence bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect with the stored tokens and poll presence (default)
    Run,
    /// Sign in and store tokens for a console
    Setup(SetupArgs),
    /// Print the sign-in URL
    AuthUrl,
}

#[derive(Debug, Args)]
struct SetupArgs {
    /// Console live id
    #[arg(long)]
    liveid: String,
    /// Optional GiantBomb API key for artwork lookups
    #[arg(long)]
    giantbomb_api_key: Option<String>,
    /// Redirect URL after sign-in; read from stdin when omitted
    #[arg(long)]
    redirect_url: Option<String>,
    /// Replace credentials that are already stored
    #[arg(long)]
    reconfigure: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;
    env_util::bootstrap_cli(BIN_NAME);

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
        Command::Setup(args) => setup(args).await,
        Command::AuthUrl => {
            println!("{}", OAuthClient::from_env().authorization_url());
            Ok(())
        }
    }
}

fn build_driver() -> Result<Driver> {
    let config = Arc::new(ConfigStore::in_dir(env_util::config_home()));
    let search = GiantBombSearch::new().context("building GiantBomb client")?;
    Ok(Driver::new(
        config,
        Arc::new(XboxLiveConnector::from_env()),
        Arc::new(search),
        Arc::new(LoggingHub),
        TransportSettings::default(),
        env_util::poll_interval(),
    ))
}

async fn run() -> Result<()> {
    let driver = build_driver()?;

    if let Err(e) = driver.start().await {
        driver.shutdown().await;
        if e.is_user_facing() {
            bail!("{e}; run `{BIN_NAME} setup --liveid <id>` first");
        }
        return Err(e).context("connecting to Xbox Live");
    }

    // The logging hub subscribes to whatever the driver exposes.
    if let Some(id) = driver.entity_id().await {
        driver.subscribe_entities(&[id]).await;
    }

    let outcome = wait_for_shutdown().await;
    driver.shutdown().await;
    outcome
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("waiting for Ctrl-C")?,
            _ = term.recv() => info!("main: SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("main: shutting down");
    Ok(())
}

async fn setup(args: SetupArgs) -> Result<()> {
    let driver = build_driver()?;
    let stored = driver.load_config().await;
    if stored.has_credentials() && !args.reconfigure {
        info!("main: credentials already stored");
    }

    let mut setup_data = HashMap::from([(FIELD_LIVEID.to_string(), args.liveid)]);
    if let Some(key) = args.giantbomb_api_key {
        setup_data.insert(FIELD_GIANTBOMB_API_KEY.to_string(), key);
    }
    let response = driver
        .handle_setup(SetupRequest::DriverSetup {
            reconfigure: args.reconfigure,
            setup_data,
        })
        .await;

    let result = match response {
        SetupResponse::Complete => {
            println!("Already configured. Pass --reconfigure to sign in again.");
            Ok(())
        }
        SetupResponse::RequestUserInput { fields, .. } => {
            if let Some(url) = fields.iter().find(|f| f.id == FIELD_AUTH_URL) {
                println!("Open this URL in a browser and sign in:\n\n  {}\n", url.value);
            }
            finish_setup(&driver, args.redirect_url).await
        }
        other => Err(anyhow::anyhow!("setup failed: {other:?}")),
    };

    driver.shutdown().await;
    result
}

async fn finish_setup(driver: &Driver, redirect_url: Option<String>) -> Result<()> {
    let redirect_url = match redirect_url {
        Some(url) => url,
        None => {
            println!("Paste the URL the browser ended on and press Enter:");
            let stdin = BufReader::new(tokio::io::stdin());
            match read_line_or_interrupt(stdin, ctrl_c()).await? {
                Some(line) => line,
                None => {
                    driver.handle_setup(SetupRequest::Abort).await;
                    bail!("setup cancelled before a redirect URL was given");
                }
            }
        }
    };

    let response = driver
        .handle_setup(SetupRequest::UserInput {
            input_values: HashMap::from([(FIELD_REDIRECT_URL.to_string(), redirect_url)]),
        })
        .await;
    match response {
        SetupResponse::Complete => {
            info!("main: setup complete");
            println!("Signed in. Start the bridge with `{BIN_NAME} run`.");
            Ok(())
        }
        SetupResponse::Error(kind) => {
            error!(?kind, "main: setup failed");
            bail!("setup failed: {kind:?}")
        }
        other => {
            warn!(?other, "main: unexpected setup response");
            bail!("setup did not complete")
        }
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "main: Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}

/// Next line of `input`, or `None` on end of input or when `interrupt`
/// resolves first.
async fn read_line_or_interrupt<R, F>(input: R, interrupt: F) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let mut lines = input.lines();
    tokio::select! {
        line = lines.next_line() => line.context("reading redirect URL"),
        _ = interrupt => {
            info!("main: interrupted while waiting for the redirect URL");
            Ok(None)
        }
    }
}
