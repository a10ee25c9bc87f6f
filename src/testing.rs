//! Test doubles shared by the component tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;

use crate::api::{ApiClient, ClientConfig, HttpRequest, HttpResponse, Transport, TransportError};
use crate::browser::{Navigator, Scheduler};
use crate::csrf::StaticCsrf;
use crate::toast::ToastQueue;

pub const BASE_URL: &str = "http://arena.test/";

type Scripted = Result<HttpResponse, TransportError>;

#[derive(Clone, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push_text(status, &body.to_string());
    }

    pub fn push_text(&self, status: u16, body: &str) {
        self.responses.lock().push_back(Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(TransportError(message.to_string())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response".into())))
    }
}

/// Holds every request until the test releases it.
pub struct GatedTransport {
    inner: ScriptedTransport,
    entered: Sender<()>,
    release: Receiver<()>,
}

pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl GatedTransport {
    pub fn new(inner: ScriptedTransport) -> (Self, Gate) {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        (
            Self {
                inner,
                entered: entered_tx,
                release: release_rx,
            },
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl Transport for GatedTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let _ = self.entered.send(());
        let _ = self.release.recv_timeout(Duration::from_secs(5));
        self.inner.send(request)
    }
}

#[derive(Clone, Default)]
pub struct RecordingNavigator {
    visited: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, location: &str) {
        self.visited.lock().push(location.to_string());
    }
}

/// Runs scheduled work immediately, remembering the requested delay.
#[derive(Clone, Default)]
pub struct ImmediateScheduler {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl ImmediateScheduler {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        self.delays.lock().push(delay);
        task();
    }
}

pub struct Harness {
    pub api: Arc<ApiClient>,
    pub toasts: Arc<ToastQueue>,
    pub navigator: RecordingNavigator,
    pub scheduler: ImmediateScheduler,
}

pub fn harness<T: Transport + 'static>(transport: T) -> Harness {
    harness_with(
        transport,
        ClientConfig {
            base_url: BASE_URL.into(),
            ..ClientConfig::default()
        },
    )
}

pub fn harness_with<T: Transport + 'static>(transport: T, config: ClientConfig) -> Harness {
    let toasts = Arc::new(ToastQueue::default());
    let navigator = RecordingNavigator::default();
    let scheduler = ImmediateScheduler::default();
    let api = ApiClient::new(
        Arc::new(transport),
        Arc::new(StaticCsrf::new("test-token")),
        toasts.clone(),
        config,
    )
    .expect("test client")
    .with_navigator(Arc::new(navigator.clone()))
    .with_scheduler(Arc::new(scheduler.clone()));
    Harness {
        api: Arc::new(api),
        toasts,
        navigator,
        scheduler,
    }
}
