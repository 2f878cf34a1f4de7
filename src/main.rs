use std::io;
use std::process::ExitCode;

use livetail_api::{ApiVersion, ClientConfig, Compatibility, Deployment, LiveTailClient};
use livetail_tail::{LiveTail, TailConfig};
use livetail_types::CLIENT_VERSION;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod cli;
mod credentials;
mod error;
mod prompt;

use cli::Mode;
use error::{LiveTailError, RELEASES_URL};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout only carries tailed messages
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), LiveTailError> {
    let config = cli::parse()?;

    match config.mode {
        Mode::Version => {
            println!("{}", version_banner());
            return Ok(());
        }
        Mode::Clear => {
            tracing::info!("Clearing Live Tail CLI session");
            return credentials::clear(&config.credentials_file);
        }
        Mode::Tail => {}
    }

    tracing::info!("Welcome to Sumo Logic Live Tail Command Line Interface");

    let access = credentials::load(config.credentials.clone(), &config.credentials_file).await?;

    let client = LiveTailClient::new(
        access.credentials.clone(),
        Deployment::default(),
        &ClientConfig::default(),
    )
    .map_err(|e| LiveTailError::Config(e.to_string()))?;

    // Only an explicit deployment skips the redirect probe
    let deployment = match config.deployment.clone() {
        Some(deployment) => deployment,
        None => client
            .resolve_deployment()
            .await
            .map_err(LiveTailError::Resolution)?,
    };
    let client = client.with_deployment(deployment);

    tracing::info!("Authenticating");
    let server_version = client.authenticate().await.map_err(LiveTailError::Auth)?;
    tracing::info!("Authentication successful");
    check_version(server_version)?;

    if access.freshly_prompted() {
        credentials::save(
            &config.credentials_file,
            client.deployment(),
            &access.credentials,
        )?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(watch_interrupts(cancel.clone()));

    let mut stdout = io::stdout().lock();
    let report = LiveTail::new(&client, TailConfig::default())
        .run(config.filter.as_deref(), &mut stdout, &cancel)
        .await
        .map_err(LiveTailError::SessionCreate)?;

    tracing::debug!(
        session = %report.session,
        state = ?report.state(),
        polls = report.polls,
        offset = report.offset,
        "Live Tail session finished"
    );
    LiveTailError::from_stop(report.stop)
}

/// First Ctrl-C ends the session cleanly, a second one exits immediately
async fn watch_interrupts(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!("Interrupt received, press Ctrl-C again to exit immediately");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Exiting without deleting the Live Tail session");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

/// Exit status of a process ended by SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

fn version_banner() -> String {
    format!("Sumo Logic Live Tail CLI Version ({})", CLIENT_VERSION)
}

/// Fail on a newer server major version, warn on a newer minor version
fn check_version(server: ApiVersion) -> Result<(), LiveTailError> {
    match CLIENT_VERSION.compatibility_with(&server) {
        Compatibility::Incompatible => Err(LiveTailError::Version {
            server,
            client: CLIENT_VERSION,
        }),
        Compatibility::NewerMinor => {
            tracing::warn!(
                "A newer version of Live Tail CLI ({}) is available, but your current version \
                 will still function. If you would like to download the latest version, go to {}",
                server,
                RELEASES_URL
            );
            Ok(())
        }
        Compatibility::Compatible => Ok(()),
    }
}
