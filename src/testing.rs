// Test doubles shared by the unit tests
// Transports, providers, host services and media elements that record what happened

use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::channel::service_bus::{NativeCallback, NativeChannelFactory, ServiceBus, ServiceCallback};
use crate::channel::{MessageSink, OnConnected, SocketFactory, Transport, TransportId, TransportProvider};
use crate::media::{ImageElement, MediaElement, MediaEvent};

#[derive(Default)]
struct TransportLog {
    sent: Vec<String>,
    closed: bool,
}

/// Transport that keeps every frame written to it
#[derive(Clone)]
pub struct RecordingTransport {
    id: TransportId,
    log: Arc<Mutex<TransportLog>>,
}

impl RecordingTransport {
    pub fn new(id: u64) -> Self {
        Self {
            id: TransportId(id),
            log: Arc::new(Mutex::new(TransportLog::default())),
        }
    }

    pub fn id(&self) -> TransportId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().unwrap().closed
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn send(&mut self, frame: String) {
        self.log.lock().unwrap().sent.push(frame);
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

/// Socket factory handing out recording transports
pub struct FakeSockets {
    next_id: AtomicU64,
    opened: Mutex<Vec<String>>,
}

impl FakeSockets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl SocketFactory for FakeSockets {
    fn open(&self, url: &str) -> Box<dyn Transport> {
        self.opened.lock().unwrap().push(url.to_string());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Box::new(RecordingTransport::new(id))
    }
}

/// Provider whose acquisitions complete only when the test says so
#[derive(Clone, Default)]
pub struct ManualProvider {
    pending: Arc<Mutex<VecDeque<OnConnected>>>,
    acquired: Arc<AtomicU64>,
}

impl ManualProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire_count(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Complete the oldest outstanding acquisition
    pub fn complete(&self, transport: RecordingTransport) {
        let callback = self.pending.lock().unwrap().pop_front();
        let callback = callback.expect("no acquisition pending");
        callback(Box::new(transport));
    }
}

impl TransportProvider for ManualProvider {
    fn acquire(&mut self, on_connected: OnConnected) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().unwrap().push_back(on_connected);
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

/// Service bus answering from canned responses
///
/// Subscriptions receive every status response in order; one-shot calls
/// receive the next create response.
pub struct ScriptedBus {
    status_responses: Vec<Value>,
    create_responses: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBus {
    pub fn new(status_responses: Vec<Value>, create_responses: Vec<Value>) -> Self {
        Self {
            status_responses,
            create_responses: Mutex::new(create_responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ServiceBus for ScriptedBus {
    fn call(&self, uri: &str, params: Value, mut on_response: ServiceCallback) {
        let subscribe = params.get("subscribe").and_then(Value::as_bool) == Some(true);
        self.calls.lock().unwrap().push((uri.to_string(), params));

        // Callbacks may call back into the bus, so no lock is held here
        if subscribe {
            for response in self.status_responses.clone() {
                on_response(response);
            }
        } else {
            let response = self.create_responses.lock().unwrap().pop_front();
            if let Some(response) = response {
                on_response(response);
            }
        }
    }
}

/// Native factory that answers immediately with a fixed response
pub struct ScriptedNativeFactory {
    response: Value,
}

impl ScriptedNativeFactory {
    pub fn new(response: Value) -> Self {
        Self { response }
    }
}

impl NativeChannelFactory for ScriptedNativeFactory {
    fn create_app_channel(&self, _params: &str, on_response: NativeCallback) {
        on_response(self.response.clone());
    }
}

struct MediaState {
    position: f64,
    duration: f64,
    src: Option<String>,
    calls: Vec<&'static str>,
    events: VecDeque<MediaEvent>,
}

/// Media element with a fixed duration and a log of play/pause/load calls
#[derive(Clone)]
pub struct FakeMedia {
    state: Rc<RefCell<MediaState>>,
}

impl FakeMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(MediaState {
                position: 0.0,
                duration,
                src: None,
                calls: Vec::new(),
                events: VecDeque::new(),
            })),
        }
    }

    pub fn set_position(&self, position: f64) {
        self.state.borrow_mut().position = position;
    }

    pub fn position(&self) -> f64 {
        self.state.borrow().position
    }

    pub fn source(&self) -> Option<String> {
        self.state.borrow().src.clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    /// Queue an event as if the element raised it
    pub fn raise(&self, event: MediaEvent) {
        self.state.borrow_mut().events.push_back(event);
    }
}

impl MediaElement for FakeMedia {
    fn current_time(&self) -> f64 {
        self.state.borrow().position
    }

    fn set_current_time(&mut self, position: f64) {
        self.state.borrow_mut().position = position;
    }

    fn duration(&self) -> f64 {
        self.state.borrow().duration
    }

    fn play(&mut self) {
        self.state.borrow_mut().calls.push("play");
    }

    fn pause(&mut self) {
        self.state.borrow_mut().calls.push("pause");
    }

    fn src(&self) -> Option<String> {
        self.source()
    }

    fn set_src(&mut self, url: &str) {
        self.state.borrow_mut().src = Some(url.to_string());
    }

    fn load(&mut self) {
        self.state.borrow_mut().calls.push("load");
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.state.borrow_mut().events.pop_front()
    }
}

/// Image element remembering the last source
#[derive(Clone, Default)]
pub struct FakeImage {
    src: Rc<RefCell<Option<String>>>,
}

impl FakeImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<String> {
        self.src.borrow().clone()
    }
}

impl ImageElement for FakeImage {
    fn src(&self) -> Option<String> {
        self.source()
    }

    fn set_src(&mut self, url: &str) {
        *self.src.borrow_mut() = Some(url.to_string());
    }
}

/// Sink recording `(to, payload)`; broadcasts have no `to`
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Rc<RefCell<Vec<(Option<String>, Value)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Option<String>, Value)> {
        self.sent.borrow().clone()
    }
}

impl MessageSink for RecordingSink {
    fn send_message(&mut self, to: &str, payload: Value) {
        self.sent.borrow_mut().push((Some(to.to_string()), payload));
    }

    fn broadcast_message(&mut self, payload: Value) {
        self.sent.borrow_mut().push((None, payload));
    }
}
