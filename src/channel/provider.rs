// Transport acquisition strategies
// Exactly one strategy is bound when the channel is built; the others stay inert

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use url::form_urlencoded;

use super::service_bus::{NativeChannelFactory, ServiceBus};
use super::transport::{SocketFactory, Transport};
use crate::config::ChannelConfig;

/// Launch parameter carrying the channel socket URL
pub const SOCKET_URL_PARAM: &str = "webOSAppChannelSocketUrl";

/// Receives the acquired transport; called at most once
pub type OnConnected = Box<dyn FnOnce(Box<dyn Transport>) + Send>;

/// Obtains the process's channel transport
pub trait TransportProvider {
    /// Non-blocking. Calls `on_connected` once when a transport is available,
    /// or never if none can be obtained.
    fn acquire(&mut self, on_connected: OnConnected);

    fn name(&self) -> &'static str;
}

/// Host capabilities probed at startup that can yield a channel socket
#[derive(Default, Clone)]
pub struct ProviderSources {
    pub service_bus: Option<Arc<dyn ServiceBus>>,
    pub launch_params: Option<String>,
    pub native_factory: Option<Arc<dyn NativeChannelFactory>>,
}

/// The strategy bound for this process
pub enum ChannelProvider {
    /// Subscribe to the gateway's status, then ask it to create a channel
    ServiceBus {
        bus: Arc<dyn ServiceBus>,
        sockets: Arc<dyn SocketFactory>,
        uris: ChannelConfig,
    },

    /// Socket URL handed over in the launch parameters
    LaunchParam {
        socket_url: String,
        sockets: Arc<dyn SocketFactory>,
    },

    /// Host's one-shot native creation call
    NativeCall {
        factory: Arc<dyn NativeChannelFactory>,
        sockets: Arc<dyn SocketFactory>,
    },

    /// Nothing matched; acquisition never completes
    Unavailable,
}

impl ChannelProvider {
    /// Bind the highest-priority strategy the host supports
    pub fn select(
        sources: ProviderSources,
        sockets: Arc<dyn SocketFactory>,
        uris: ChannelConfig,
    ) -> Self {
        if let Some(bus) = sources.service_bus {
            return ChannelProvider::ServiceBus { bus, sockets, uris };
        }

        let socket_url = sources
            .launch_params
            .as_deref()
            .and_then(|params| parse_launch_params(params).remove(SOCKET_URL_PARAM))
            .filter(|url| !url.is_empty());
        if let Some(socket_url) = socket_url {
            info!("Found app channel socket URL in launch params: {}", socket_url);
            return ChannelProvider::LaunchParam {
                socket_url,
                sockets,
            };
        }

        if let Some(factory) = sources.native_factory {
            return ChannelProvider::NativeCall { factory, sockets };
        }

        ChannelProvider::Unavailable
    }
}

impl TransportProvider for ChannelProvider {
    fn acquire(&mut self, on_connected: OnConnected) {
        match self {
            ChannelProvider::ServiceBus { bus, sockets, uris } => {
                acquire_via_service_bus(bus.clone(), sockets.clone(), uris, on_connected);
            }
            ChannelProvider::LaunchParam {
                socket_url,
                sockets,
            } => {
                on_connected(sockets.open(socket_url));
            }
            ChannelProvider::NativeCall { factory, sockets } => {
                let sockets = sockets.clone();
                factory.create_app_channel(
                    "{}",
                    Box::new(move |response: Value| {
                        match response.get("socketUrl").and_then(Value::as_str) {
                            Some(url) => on_connected(sockets.open(url)),
                            None => debug!("Native channel response without socketUrl: {}", response),
                        }
                    }),
                );
            }
            ChannelProvider::Unavailable => {
                error!("App channel socket not supported on this host");
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ChannelProvider::ServiceBus { .. } => "service-bus",
            ChannelProvider::LaunchParam { .. } => "launch-param",
            ChannelProvider::NativeCall { .. } => "native-call",
            ChannelProvider::Unavailable => "unavailable",
        }
    }
}

/// Status subscription first; each `connected: true` update requests a channel
/// until one response carries a socket URL
fn acquire_via_service_bus(
    bus: Arc<dyn ServiceBus>,
    sockets: Arc<dyn SocketFactory>,
    uris: &ChannelConfig,
    on_connected: OnConnected,
) {
    let pending = Arc::new(Mutex::new(Some(on_connected)));
    let create_uri = uris.create_app_channel_uri.clone();
    let bus_for_status = bus.clone();

    bus.call(
        &uris.register_server_status_uri,
        json!({ "subscribe": true, "serviceName": uris.gateway_service }),
        Box::new(move |status: Value| {
            if status.get("connected").and_then(Value::as_bool) != Some(true) {
                debug!("Gateway service not available yet: {}", status);
                return;
            }

            let pending = pending.clone();
            let sockets = sockets.clone();
            bus_for_status.call(
                &create_uri,
                json!({}),
                Box::new(move |response: Value| {
                    let Some(url) = response.get("socketUrl").and_then(Value::as_str) else {
                        debug!("createAppChannel response without socketUrl: {}", response);
                        return;
                    };
                    let callback = pending.lock().ok().and_then(|mut slot| slot.take());
                    if let Some(callback) = callback {
                        callback(sockets.open(url));
                    }
                }),
            );
        }),
    );
}

/// Parse `a=b&c=d` launch parameters, percent-decoding the values
pub fn parse_launch_params(params: &str) -> HashMap<String, String> {
    form_urlencoded::parse(params.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}
