// connect-bridge daemon
// Binds the platform profile, keeps the app channel up and answers sender commands

use anyhow::Result;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use connect_bridge::channel::provider::SOCKET_URL_PARAM;
use connect_bridge::channel::service_bus::{
    CommandChannelFactory, LunaSendBus, NativeChannelFactory, ServiceBus,
};
use connect_bridge::channel::{
    AppChannel, ChannelProvider, ProviderSources, TransportEvent, TransportEvents,
    TransportProvider, WsConnector,
};
use connect_bridge::config::{self, Config};
use connect_bridge::events::{Listener, Observable};
use connect_bridge::logging;
use connect_bridge::media::{HeadlessImage, HeadlessPlayer};
use connect_bridge::platform::host::run_stdout_writer;
use connect_bridge::platform::{
    BridgeEvent, BridgeEventKind, CastMessageBus, ConnectManager, HostEnvironment, HostEvent,
    HostOutput, OutOfBandSignal, Profile, ProfileParts,
};

/// How long a requested channel close may take before exiting anyway
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Command line overrides on top of the config file
#[derive(Debug, Default)]
struct Options {
    config_path: Option<PathBuf>,
    socket_url: Option<String>,
    params: Option<String>,
    user_agent: Option<String>,
    debug: bool,
}

impl Options {
    fn apply(&self, config: &mut Config) {
        if let Some(user_agent) = &self.user_agent {
            config.host.user_agent = user_agent.clone();
        }
        if let Some(params) = &self.params {
            config.host.launch_params = params.clone();
        }
        if let Some(url) = &self.socket_url {
            config.host.launch_params = form_urlencoded::Serializer::new(String::new())
                .append_pair(SOCKET_URL_PARAM, url)
                .finish();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args);

    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(config::get_config_path);
    let mut config = tracing::subscriber::with_default(logging::bootstrap_subscriber(), || {
        config::load_config(&config_path)
    })?;
    options.apply(&mut config);

    logging::init(&config.logging.level, options.debug)?;
    info!("connect-bridge starting (config: {})", config_path.display());
    if options.debug {
        info!("Debug log mirrored to {}", logging::DEBUG_LOG_PATH);
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (output, output_rx) = HostOutput::channel();
    let writer = tokio::spawn(run_stdout_writer(output_rx));

    let env = HostEnvironment::from_config(&config.host);
    let parts = build_profile_parts(&config, events_tx, &output);
    let mut manager = ConnectManager::detect(&env, parts);

    manager.set_media_element(Box::new(HeadlessPlayer::new(
        config.media.assumed_duration_secs,
    )));
    manager.set_image_element(Box::new(HeadlessImage::new()));

    let close_requested = Rc::new(Cell::new(false));
    register_listeners(&mut manager, &close_requested, &output, config.host.stdio_bridge);

    manager.init();

    let mut host_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut host_open = config.host.stdio_bridge;
    if host_open {
        info!("Reading host events from stdin");
    }

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                manager.handle_transport_event(event);
            }
            line = host_lines.next_line(), if host_open => match line {
                Ok(Some(line)) => handle_host_line(&mut manager, &line),
                Ok(None) => {
                    info!("Host input closed");
                    host_open = false;
                }
                Err(e) => {
                    warn!("Failed to read host input: {}", e);
                    host_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        if close_requested.get() {
            info!("Close requested by a sender, shutting down");
            break;
        }
    }

    manager.shutdown();
    if channel_open(&manager) {
        let drained = tokio::time::timeout(CLOSE_GRACE, async {
            while let Some(event) = events_rx.recv().await {
                let closed = matches!(event, TransportEvent::Closed(_));
                manager.handle_transport_event(event);
                if closed {
                    break;
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("App channel did not close within {:?}", CLOSE_GRACE);
        }
    }

    drop(manager);
    drop(output);
    let _ = tokio::time::timeout(CLOSE_GRACE, writer).await;

    info!("connect-bridge stopped");
    Ok(())
}

/// Parse command line arguments
fn parse_args(args: &[String]) -> Options {
    let mut options = Options::default();
    let program = args.first().map(String::as_str).unwrap_or("connect-bridge");
    let mut rest = args.iter().skip(1);

    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                options.config_path = Some(PathBuf::from(value_for(program, arg, rest.next())));
            }
            "--socket-url" | "-s" => {
                options.socket_url = Some(value_for(program, arg, rest.next()));
            }
            "--params" | "-p" => options.params = Some(value_for(program, arg, rest.next())),
            "--user-agent" | "-u" => {
                options.user_agent = Some(value_for(program, arg, rest.next()));
            }
            "--debug" | "-d" => options.debug = true,
            "--help" | "-h" => {
                print_usage(program);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_usage(program);
                std::process::exit(1);
            }
        }
    }

    options
}

fn value_for(program: &str, flag: &str, value: Option<&String>) -> String {
    match value {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            eprintln!("Run '{} --help' for usage", program);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    println!("connect-bridge - receiver side of the second-screen app channel");
    println!();
    println!("Usage:");
    println!(
        "  {}                              # Use the config file as-is",
        program
    );
    println!(
        "  {} --socket-url <ws-url>        # Connect straight to an app channel socket",
        program
    );
    println!(
        "  {} --params <query>             # Launch parameters (webOSAppChannelSocketUrl=...)",
        program
    );
    println!(
        "  {} --user-agent <ua>            # Override the host user agent",
        program
    );
    println!(
        "  {} --config <path>              # Use another config file",
        program
    );
    println!(
        "  {} --debug                      # Mirror logs to {}",
        program,
        logging::DEBUG_LOG_PATH
    );
    println!();
    println!("Examples:");
    println!("  # Against a local relay server:");
    println!("  {} --socket-url ws://127.0.0.1:9998/receiver", program);
    println!();
    println!("Config file: {}", config::get_config_path().display());
    println!("Set [host] stdio_bridge = true to drive the bridge with JSON lines on stdin.");
}

/// Collaborators for whichever profile the host turns out to need
fn build_profile_parts(config: &Config, events: TransportEvents, output: &HostOutput) -> ProfileParts {
    let host = &config.host;

    let sources = ProviderSources {
        service_bus: host
            .service_bus
            .then(|| Arc::new(LunaSendBus::new(host.luna_send_path.clone())) as Arc<dyn ServiceBus>),
        launch_params: Some(host.launch_params.clone()).filter(|params| !params.is_empty()),
        native_factory: CommandChannelFactory::from_command(&host.create_channel_command)
            .map(|factory| Arc::new(factory) as Arc<dyn NativeChannelFactory>),
    };
    let sockets = Arc::new(WsConnector::new(events.clone()));
    let provider = ChannelProvider::select(sources, sockets, config.channel.clone());
    debug!("App channel provider: {}", provider.name());

    ProfileParts {
        channel: Some(AppChannel::new(Box::new(provider), events)),
        cast_bus: host
            .stdio_bridge
            .then(|| Box::new(output.clone()) as Box<dyn CastMessageBus>),
        signal: host
            .stdio_bridge
            .then(|| Box::new(output.clone()) as Box<dyn OutOfBandSignal>),
    }
}

fn register_listeners(
    manager: &mut ConnectManager,
    close_requested: &Rc<Cell<bool>>,
    output: &HostOutput,
    report_to_host: bool,
) {
    let output = output.clone();
    let reporter: Listener<BridgeEvent> = Rc::new(move |event: &BridgeEvent| {
        info!("Bridge event: {:?}", event);
        if report_to_host {
            output.report(&event.to_json());
        }
    });
    for kind in BridgeEventKind::all() {
        manager.on(kind, reporter.clone(), None);
    }

    let flag = close_requested.clone();
    let on_close: Listener<BridgeEvent> = Rc::new(move |_: &BridgeEvent| flag.set(true));
    manager.on(BridgeEventKind::Close, on_close, None);
}

fn handle_host_line(manager: &mut ConnectManager, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match HostEvent::parse_line(line) {
        Ok(event) => manager.handle_host_event(event),
        Err(e) => warn!("Ignoring malformed host event ({}): {}", e, line),
    }
}

fn channel_open(manager: &ConnectManager) -> bool {
    match manager.profile() {
        Profile::WebOs(webos) => webos.channel().has_transport(),
        _ => false,
    }
}
