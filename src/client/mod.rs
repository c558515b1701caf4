//! Streaming chat-completion client.
//!
//! One call to [`ChatClient::run`] is one outbound request and one response
//! stream. Parsed events are fanned out through an [`EventHub`] to any
//! number of subscribers; the run ends with exactly one terminal signal.

mod hub;
mod request;
mod stream;

pub use hub::{EventHub, EventStream, HubMessage, StreamEnd, StreamError, StreamEvent};
pub use stream::FunctionCallAccumulator;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tokio_stream::StreamExt;

use crate::config::ClientConfiguration;
use crate::conversation::Conversation;
use crate::functions::FunctionDeclaration;
use stream::{LineBuffer, LineOutcome};

/// Per-run snapshot of the target model: endpoint, credentials, timeouts and
/// capability flags. Built once from the configuration provider; never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub model: String,
    pub api_url: String,
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub function_calling: bool,
    pub vision: bool,
    /// Sampling temperature in tenths (7 = 0.7).
    pub temperature_tenths: u32,
}

impl ModelDescriptor {
    /// Snapshot the configuration provider together with capability flags.
    pub fn from_configuration(
        config: &dyn ClientConfiguration,
        function_calling: bool,
        vision: bool,
        temperature_tenths: u32,
    ) -> Self {
        Self {
            model: config.model_name(),
            api_url: config.api_url(),
            api_key: config.api_key(),
            connect_timeout_secs: config.connect_timeout_secs(),
            request_timeout_secs: config.request_timeout_secs(),
            function_calling,
            vision,
            temperature_tenths,
        }
    }

    pub fn temperature(&self) -> f64 {
        f64::from(self.temperature_tenths) / 10.0
    }
}

/// Cancellation predicate, polled between line reads. Never preemptive.
pub type CancelProvider = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

/// The client: owns the HTTP client, a descriptor snapshot, the declared
/// functions and the event hub. One client drives one exchange; concurrent
/// exchanges each get their own client and are fully independent.
pub struct ChatClient {
    http: reqwest::Client,
    descriptor: ModelDescriptor,
    system_prompt: String,
    functions: Vec<FunctionDeclaration>,
    hub: EventHub,
    cancel: CancelProvider,
}

impl ChatClient {
    pub fn new(
        descriptor: ModelDescriptor,
        system_prompt: impl Into<String>,
        functions: Vec<FunctionDeclaration>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(descriptor.connect_timeout_secs))
            .timeout(Duration::from_secs(descriptor.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            descriptor,
            system_prompt: system_prompt.into(),
            functions,
            hub: EventHub::new(),
            cancel: Arc::new(|| false),
        })
    }

    /// Install the cancellation predicate. Configure before scheduling a run.
    pub fn set_cancel_provider(&mut self, cancel: CancelProvider) {
        self.cancel = cancel;
    }

    /// Register a subscriber; safe before or during a run.
    pub fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Build the run as a schedulable unit of work.
    ///
    /// Nothing happens until the returned future is polled, typically via
    /// `tokio::spawn`. The conversation is snapshotted at call time; the
    /// caller keeps ownership of the original.
    pub fn run(&self, conversation: &Conversation) -> impl Future<Output = ()> + Send + 'static {
        let http = self.http.clone();
        let descriptor = self.descriptor.clone();
        let system_prompt = self.system_prompt.clone();
        let functions = self.functions.clone();
        let hub = self.hub.clone();
        let cancel = Arc::clone(&self.cancel);
        let conversation = conversation.clone();

        async move {
            let end = execute(
                &http,
                &descriptor,
                &system_prompt,
                &functions,
                &conversation,
                &hub,
                &cancel,
            )
            .await;
            hub.close(end);
        }
    }
}

async fn execute(
    http: &reqwest::Client,
    descriptor: &ModelDescriptor,
    system_prompt: &str,
    functions: &[FunctionDeclaration],
    conversation: &Conversation,
    hub: &EventHub,
    cancel: &CancelProvider,
) -> StreamEnd {
    let mut state = RunState::Idle;
    tracing::debug!(?state, model = %descriptor.model, "run created");

    let body = match request::build_request_body(descriptor, system_prompt, functions, conversation)
        .and_then(|value| {
            serde_json::to_string(&value).map_err(|e| StreamError::Serialize(e.to_string()))
        }) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "aborting before network I/O");
            return StreamEnd::Failed(e);
        }
    };

    state = RunState::Connecting;
    tracing::debug!(?state, url = %descriptor.api_url, "sending request");

    let response = match http
        .post(&descriptor.api_url)
        .header(AUTHORIZATION, format!("Bearer {}", descriptor.api_key))
        .header(ACCEPT, "text/event-stream")
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            state = RunState::Failed;
            tracing::error!(?state, error = %e, "connection attempt failed");
            return StreamEnd::Failed(StreamError::Transport(e.to_string()));
        }
    };

    let status = response.status();
    let error_status = !status.is_success();
    if error_status {
        // Documented quirk: a non-success status is logged (with its body
        // lines below) but the read attempt still proceeds.
        tracing::error!(%status, "request failed, reading response body anyway");
    }

    state = RunState::Streaming;
    tracing::debug!(?state, "response received");

    let mut body_stream = response.bytes_stream();
    let mut lines = LineBuffer::new();
    let mut pending: VecDeque<String> = VecDeque::new();

    let end = loop {
        if cancel() {
            break StreamEnd::Cancelled;
        }

        let Some(line) = pending.pop_front() else {
            match body_stream.next().await {
                Some(Ok(chunk)) => match lines.push(&chunk) {
                    Ok(complete) => pending.extend(complete),
                    Err(e) => break StreamEnd::Failed(e),
                },
                Some(Err(e)) => break StreamEnd::Failed(StreamError::Transport(e.to_string())),
                None => match lines.take_remainder() {
                    Ok(Some(rest)) => pending.push_back(rest),
                    Ok(None) => break StreamEnd::Done,
                    Err(e) => break StreamEnd::Failed(e),
                },
            }
            continue;
        };

        if error_status && !line.is_empty() {
            tracing::error!(line = %line, "error response body");
        }

        match stream::parse_line(&line) {
            Ok(LineOutcome::Ignored) => {}
            Ok(LineOutcome::Done) => break StreamEnd::Done,
            Ok(LineOutcome::Events(events)) => {
                for event in events {
                    hub.publish(event);
                }
            }
            Err(e) => break StreamEnd::Failed(e),
        }
    };

    state = match &end {
        StreamEnd::Done => RunState::Completed,
        StreamEnd::Cancelled => RunState::Cancelled,
        StreamEnd::Failed(_) => RunState::Failed,
    };
    tracing::debug!(?state, "run finished");

    end
}
