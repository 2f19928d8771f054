//! Client that answers from recorded vendor payloads

use std::path::PathBuf;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use switchboard_llm::{ChatClient, Protocol, VendorEvent, VendorEventStream, VendorRequest, VendorResponse};

/// Replays a recorded response body or event log for whatever request it is sent
pub struct ReplayClient {
    recording: PathBuf,
}

impl ReplayClient {
    pub const fn new(recording: PathBuf) -> Self {
        Self { recording }
    }

    fn read(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(&self.recording)
            .map_err(|e| anyhow::anyhow!("failed to read recording {}: {e}", self.recording.display()))
    }
}

#[async_trait]
impl ChatClient for ReplayClient {
    async fn complete(&self, request: VendorRequest) -> anyhow::Result<VendorResponse> {
        log_request(&request);

        let body = serde_json::from_str(&self.read()?)
            .map_err(|e| anyhow::anyhow!("recording {} is not JSON: {e}", self.recording.display()))?;

        VendorResponse::from_json(request.protocol(), body)
    }

    async fn stream(&self, request: VendorRequest) -> anyhow::Result<VendorEventStream> {
        log_request(&request);

        let raw = self.read()?;
        let protocol = request.protocol();

        if is_sse(&raw) {
            let bytes = futures_util::stream::iter([Ok::<_, std::io::Error>(raw)]);
            let events = bytes
                .eventsource()
                .map(move |result| match result {
                    Ok(event) => decode(protocol, event.data.trim()),
                    Err(e) => Some(Err(anyhow::anyhow!("malformed SSE recording: {e}"))),
                })
                .filter_map(std::future::ready);

            return Ok(Box::pin(events));
        }

        let events: Vec<_> = raw.lines().filter_map(|line| decode(protocol, line.trim())).collect();
        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}

fn log_request(request: &VendorRequest) {
    if let Ok(body) = serde_json::to_string(request) {
        tracing::debug!(protocol = %request.protocol(), model = request.model(), %body, "replaying vendor request");
    }
}

/// Server-sent events rather than newline-delimited JSON
fn is_sse(raw: &str) -> bool {
    raw.lines()
        .map(str::trim_start)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.starts_with("data:") || line.starts_with("event:"))
}

/// Decode one payload; blank payloads and the `[DONE]` sentinel are skipped
fn decode(protocol: Protocol, data: &str) -> Option<anyhow::Result<VendorEvent>> {
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(VendorEvent::from_json(protocol, data).map_err(|e| anyhow::anyhow!("unparseable {protocol} event `{data}`: {e}")))
}
