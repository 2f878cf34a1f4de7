use std::path::PathBuf;

use clap::Parser;
use livetail_api::{Credentials, Deployment};

use crate::error::LiveTailError;

/// Default location of the credential file, relative to the working directory
pub const DEFAULT_CREDENTIALS_FILE: &str = "config.json";

/// What this invocation should do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Print the client version and exit
    Version,
    /// Remove stored credentials and exit, without touching the network
    Clear,
    /// Run a Live Tail session
    Tail,
}

/// Immutable configuration used by the rest of the run
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub filter: Option<String>,
    /// Credentials given on the command line, if any
    pub credentials: Option<Credentials>,
    /// Deployment given on the command line, if any
    pub deployment: Option<Deployment>,
    pub credentials_file: PathBuf,
}

/// Live Tail CLI - stream a Sumo Logic Live Tail session to the terminal
#[derive(Parser, Debug)]
#[command(name = "livetail", about, long_about = None, disable_version_flag = true)]
struct Args {
    /// Live Tail filter (matches everything if omitted)
    #[arg(value_name = "FILTER")]
    filter: Option<String>,

    /// Access ID
    #[arg(short = 'i', value_name = "ACCESS_ID")]
    access_id: Option<String>,

    /// Access Key
    #[arg(short = 'k', value_name = "ACCESS_KEY")]
    access_key: Option<String>,

    /// Deployment-specific API host, e.g. api.sumologic.com
    #[arg(short = 'd', value_name = "DEPLOYMENT")]
    deployment: Option<String>,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Clear stored credentials and exit
    #[arg(short = 'c')]
    clear: bool,

    /// File holding stored credentials
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CREDENTIALS_FILE)]
    config_file: PathBuf,
}

impl Args {
    fn into_config(self) -> Result<Config, LiveTailError> {
        let credentials_file = self.config_file;

        if self.version {
            return Ok(Config {
                mode: Mode::Version,
                filter: None,
                credentials: None,
                deployment: None,
                credentials_file,
            });
        }

        let access_id = non_empty(self.access_id);
        let access_key = non_empty(self.access_key);

        let credentials = match (access_id, access_key) {
            (Some(id), Some(key)) => Some(Credentials::new(id, key)),
            (None, None) => None,
            (None, Some(_)) => {
                return Err(LiveTailError::Config(
                    "Please provide the Access ID with the -i argument".into(),
                ));
            }
            (Some(_), None) => {
                return Err(LiveTailError::Config(
                    "Please provide the Access Key with the -k argument".into(),
                ));
            }
        };

        let mode = if self.clear { Mode::Clear } else { Mode::Tail };

        Ok(Config {
            mode,
            filter: self.filter,
            credentials,
            deployment: non_empty(self.deployment).map(Deployment::new),
            credentials_file,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse the process arguments into a [`Config`]
///
/// Usage errors are reported by clap, which exits the process.
pub fn parse() -> Result<Config, LiveTailError> {
    Args::parse().into_config()
}
