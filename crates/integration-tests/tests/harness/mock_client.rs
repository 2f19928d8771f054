//! In-process client that records vendor requests and answers with canned payloads

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_llm::{ChatClient, VendorEvent, VendorEventStream, VendorRequest, VendorResponse};

enum Reply {
    Complete(Value),
    Events(Vec<Value>),
    Fail(String),
}

/// Mock vendor client
pub struct MockClient {
    reply: Reply,
    requests: Mutex<Vec<VendorRequest>>,
}

impl MockClient {
    /// Answer `complete` with `body`, decoded for whichever vendor is called
    pub fn replying(body: Value) -> Self {
        Self::new(Reply::Complete(body))
    }

    /// Answer `stream` with `events`
    pub fn streaming(events: Vec<Value>) -> Self {
        Self::new(Reply::Events(events))
    }

    /// Fail every call with `message`
    pub fn failing(message: &str) -> Self {
        Self::new(Reply::Fail(message.to_owned()))
    }

    fn new(reply: Reply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls received
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Most recent vendor request
    pub fn last_request(&self) -> VendorRequest {
        self.requests.lock().unwrap().last().cloned().expect("client was not called")
    }

    /// Most recent vendor request as the JSON body a real client would post
    pub fn last_body(&self) -> Value {
        serde_json::to_value(self.last_request()).unwrap()
    }

    fn record(&self, request: VendorRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

#[async_trait]
impl ChatClient for MockClient {
    async fn complete(&self, request: VendorRequest) -> anyhow::Result<VendorResponse> {
        let protocol = request.protocol();
        self.record(request);

        match &self.reply {
            Reply::Complete(body) => VendorResponse::from_json(protocol, body.clone()),
            Reply::Events(_) => anyhow::bail!("mock client is configured for streaming"),
            Reply::Fail(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }

    async fn stream(&self, request: VendorRequest) -> anyhow::Result<VendorEventStream> {
        let protocol = request.protocol();
        self.record(request);

        match &self.reply {
            Reply::Events(events) => {
                let events: Vec<_> = events
                    .iter()
                    .map(|event| VendorEvent::from_json(protocol, &event.to_string()))
                    .collect();
                Ok(Box::pin(futures_util::stream::iter(events)))
            }
            Reply::Complete(_) => anyhow::bail!("mock client is configured for complete replies"),
            Reply::Fail(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }
}
