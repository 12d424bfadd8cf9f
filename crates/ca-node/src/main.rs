//! # Connectivity Node
//!
//! Runs one connectivity context over UDP/IP.
//!
//! ## Modes
//!
//! - `serve`: starts the listening server and answers every GET with
//!   2.05 Content carrying the requested resource URI.
//! - `discover`: starts the discovery server, multicasts a GET for
//!   `/oic/res`, logs replies for a few seconds and exits.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry from the environment
//! 2. Load configuration (TOML file or defaults)
//! 3. Initialize a threaded context with the UDP adapter
//! 4. Select IP and start the role's server

use std::env;
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use ca_connectivity::{
    ConfigProvider, ConnectivityApi, ConnectivityConfig, ConnectivityContext, ConnectivityMask,
    ConnectivityType, DeliveryModel, MessageType, ResponseCode, ResponseInfo,
    StaticConfigProvider, TomlConfigProvider, UdpAdapter,
};
use ca_telemetry::{init_telemetry, TelemetryConfig};

/// How long `discover` waits for replies.
const DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

/// Resource the discover mode asks for.
const DISCOVERY_RESOURCE: &str = "/oic/res";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Discover,
}

fn parse_args(args: &[String]) -> Result<(Mode, Option<&str>)> {
    let mode = match args.first().map(String::as_str) {
        None | Some("serve") => Mode::Serve,
        Some("discover") => Mode::Discover,
        Some(other) => bail!("unknown mode {other:?}; expected serve or discover"),
    };
    Ok((mode, args.get(1).map(String::as_str)))
}

fn load_config(path: Option<&str>) -> Result<ConnectivityConfig> {
    let config = match path {
        Some(path) => {
            let provider = TomlConfigProvider::load(path)
                .with_context(|| format!("loading configuration from {path}"))?;
            provider.connectivity_config()
        }
        None => ConnectivityConfig::default(),
    };
    // Handlers here reply from the callback, so delivery is always threaded.
    Ok(config.with_delivery_model(DeliveryModel::Threaded))
}

fn build_context(config: ConnectivityConfig) -> Result<Arc<ConnectivityContext>> {
    let provider = StaticConfigProvider::new().with_config(config);
    let adapter = UdpAdapter::new(ConnectivityType::Ip).context("creating UDP adapter")?;
    let ctx = ConnectivityContext::builder()
        .config_provider(&provider)
        .adapter(Arc::new(adapter))
        .initialize()
        .context("initializing connectivity context")?;
    ctx.select_network(ConnectivityMask::from(ConnectivityType::Ip))
        .context("selecting IP transport")?;
    Ok(Arc::new(ctx))
}

fn serve(ctx: &Arc<ConnectivityContext>) -> Result<()> {
    let replier: Weak<ConnectivityContext> = Arc::downgrade(ctx);
    ctx.register_handler(
        Arc::new(move |from, request| {
            let Some(ctx) = replier.upgrade() else { return };
            info!(source = %from, method = %request.method, resource = %from.resource_uri, "request");
            let message_type = if request.info.message_type == MessageType::Confirmable {
                MessageType::Acknowledgement
            } else {
                MessageType::NonConfirmable
            };
            let reply = ResponseInfo::new(ResponseCode::CONTENT, request.info.token)
                .with_type(message_type)
                .with_message_id(request.info.message_id)
                .with_payload(from.resource_uri.as_bytes().to_vec());
            if let Err(e) = ctx.send_response(from, &reply) {
                warn!(destination = %from, error = %e, "reply failed");
            }
        }),
        Arc::new(|from, response| {
            info!(source = %from, code = %response.result, "unexpected response");
        }),
    )?;
    ctx.start_listening_server()
        .context("starting listening server")?;
    for local in ctx.get_network_information().unwrap_or_default() {
        info!(
            transport = %local.connectivity_type,
            interface = %local.interface_name,
            address = %local.address,
            port = local.port,
            "serving"
        );
    }

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for Ctrl+C")?;
    Ok(())
}

fn discover(ctx: &Arc<ConnectivityContext>) -> Result<()> {
    ctx.register_handler(
        Arc::new(|from, request| {
            info!(source = %from, method = %request.method, "ignoring request");
        }),
        Arc::new(|from, response| {
            info!(
                source = %from,
                code = %response.result,
                token = %response.info.token,
                payload = %String::from_utf8_lossy(&response.info.payload),
                "discovery reply"
            );
        }),
    )?;
    ctx.start_discovery_server()
        .context("starting discovery server")?;

    let token = ctx.generate_token()?;
    ctx.find_resource(DISCOVERY_RESOURCE, &token)
        .context("sending discovery")?;
    info!(resource = DISCOVERY_RESOURCE, token = %token.token(), window = ?DISCOVERY_WINDOW, "waiting for replies");
    std::thread::sleep(DISCOVERY_WINDOW);
    ctx.destroy_token(token);
    Ok(())
}

fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())?;

    let args: Vec<String> = env::args().skip(1).collect();
    let (mode, config_path) = parse_args(&args)?;
    let config = load_config(config_path)?;
    info!(?mode, local = %config.local_address, port = config.unicast_port, "starting node");

    let ctx = build_context(config)?;
    let outcome = match mode {
        Mode::Serve => serve(&ctx),
        Mode::Discover => discover(&ctx),
    };
    ctx.terminate();
    info!(stats = ?ctx.stats(), "node stopped");
    outcome
}
