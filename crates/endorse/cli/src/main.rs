use clap::{ArgAction, Args, Parser, ValueEnum};
use endorse_uicc::InterfaceKind;
use eyre::WrapErr;
use figment::providers::Serialized;
use serde::Serialize;
use soracom_endorse::{ClientConfig, EndorseClient, cache::NoOpCache};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};
use url::Url;

mod display;

/// Coverage area of the keys API
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum Coverage {
    Global,
    Japan,
}

/// Serial device settings
#[derive(Debug, Default, Args, Serialize)]
struct DeviceArgs {
    /// Port name of the communication device (e.g. COM1 or /dev/ttyUSB2)
    #[arg(short = 'c', long = "port")]
    #[serde(skip_serializing_if = "Option::is_none")]
    port_name: Option<String>,

    /// Baud rate of the communication device
    #[arg(short = 'b', long = "baud")]
    #[serde(skip_serializing_if = "Option::is_none")]
    baud_rate: Option<u32>,

    /// Data bits of the communication device
    #[arg(short = 'd', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    data_bits: Option<u8>,

    /// Stop bits of the communication device
    #[arg(short = 's', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_bits: Option<u8>,

    /// Parity of the communication device (0 none, 1 odd, 2 even)
    #[arg(short = 'p', long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    parity: Option<u8>,
}

/// Command line, doubling as the highest priority configuration layer
#[derive(Debug, Parser, Serialize)]
#[command(
    name = "soracom-endorse",
    version,
    about = "SORACOM Endorse client: SIM (AKA) authentication against the SORACOM keys API",
    after_help = "Examples:\n  soracom-endorse -i iso7816\n  soracom-endorse -i comm -c /dev/ttyUSB2\n  soracom-endorse -i mmcli -m 0"
)]
struct Cli {
    /// UICC interface: iso7816, comm, mmcli or autoDetect
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    interface: Option<InterfaceKind>,

    /// Override the keys API base URL (e.g. https://keyurl.soracom.io/keyservice/)
    #[arg(long = "api-url", visible_alias = "au")]
    #[serde(rename = "api_endpoint_url", skip_serializing_if = "Option::is_none")]
    api_url: Option<Url>,

    /// Coverage area of the keys API
    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage: Option<Coverage>,

    #[command(flatten)]
    #[serde(rename = "device")]
    device: DeviceArgs,

    /// ModemManager modem index for the mmcli interface
    #[arg(short = 'm', long = "modem")]
    #[serde(skip_serializing_if = "Option::is_none")]
    modem_index: Option<u32>,

    /// Application key length in bytes
    #[arg(long = "key-length", visible_alias = "kl")]
    #[serde(skip_serializing_if = "Option::is_none")]
    key_length: Option<usize>,

    /// Application key digest algorithm (SHA-224, SHA-256, SHA-384, SHA-512)
    #[arg(long = "key-algorithm", visible_alias = "ka")]
    #[serde(skip_serializing_if = "Option::is_none")]
    key_algorithm: Option<String>,

    /// List all serial ports and exit
    #[arg(long, action = ArgAction::SetTrue)]
    #[serde(skip)]
    list_com_ports: bool,

    /// Query the communication device and print its identity
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "list_com_ports")]
    #[serde(skip)]
    device_info: bool,

    /// Neither look up nor store agreed keys
    #[arg(long, action = ArgAction::SetTrue)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    disable_key_cache: bool,

    /// Clear the key cache before running
    #[arg(long, alias = "clear-cache", action = ArgAction::SetTrue)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    clear_key_cache: bool,

    /// Debug output
    #[arg(long, action = ArgAction::SetTrue)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    debug: bool,
}

impl Cli {
    /// Layered configuration with the command line on top
    fn config(&self) -> eyre::Result<ClientConfig> {
        Ok(ClientConfig::figment()?
            .merge(Serialized::defaults(self))
            .extract()?)
    }
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let config = cli.config().wrap_err("invalid configuration")?;
    setup_logging(config.debug);

    if cli.list_com_ports {
        let client = EndorseClient::with_cache(config, Box::new(NoOpCache))?;
        println!("{}", display::port_list(&client.list_com_ports()?));
        return Ok(());
    }

    if cli.device_info {
        let client = EndorseClient::with_cache(config, Box::new(NoOpCache))?;
        println!("{}", display::device_info(&client.device_info()?));
        return Ok(());
    }

    tracing::debug!(interface = %config.interface, api = %config.api_base(), "Starting key agreement");
    let mut client = EndorseClient::new(config)?;
    let result = client
        .do_authentication()
        .wrap_err("key agreement failed")?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn setup_logging(debug: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(debug, &directives))
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .init();
}

/// `RUST_LOG` style `directives`, falling back to WARN or DEBUG
fn log_filter(debug: bool, directives: &str) -> EnvFilter {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::WARN };
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}
