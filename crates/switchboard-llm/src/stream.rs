//! Streaming reconstruction
//!
//! Adapters turn vendor events into [`StreamEvent`]s; a
//! [`StreamReconstructor`] owned by one streaming call turns those into
//! canonical [`ChatCompletionChunk`]s. It remembers the last role and the
//! tool call in flight so that argument fragments without a name are
//! attributed to the call they continue.

use serde_json::Value;

use crate::types::{
    ChatCompletionChoiceStream, ChatCompletionChunk, ChatCompletionDelta, DeltaRole, StreamDelta, StreamEvent,
    ToolCall,
};

/// Per-stream reconstruction state
#[derive(Debug, Default)]
pub struct StreamReconstructor {
    last_role: Option<DeltaRole>,
    last_tool_name: Option<String>,
    last_tool_call_id: Option<String>,
}

impl StreamReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one normalized event into a canonical chunk
    ///
    /// Returns `None` for events that carry neither content nor usage. Plain
    /// content following a tool call is emitted as `assistant`, not `tool`,
    /// so tool chunks only ever hold argument fragments.
    pub fn push(&mut self, event: StreamEvent) -> Option<ChatCompletionChunk> {
        let choices: Vec<ChatCompletionChoiceStream> = event
            .choices
            .into_iter()
            .filter_map(|delta| self.reconstruct(delta))
            .collect();

        if choices.is_empty() {
            let usage = event.usage?;
            return Some(ChatCompletionChunk {
                choices: vec![ChatCompletionChoiceStream {
                    delta: ChatCompletionDelta {
                        content: String::new(),
                        role: DeltaRole::Usage,
                        tool_calls: None,
                        refusal: None,
                    },
                    index: 0,
                    finish_reason: None,
                    logprobs: None,
                }],
                diagnostics: Vec::new(),
                completion_tokens: usage.completion_tokens,
                prompt_tokens: usage.prompt_tokens,
                response_duration: None,
                system_fingerprint: event.system_fingerprint,
            });
        }

        Some(ChatCompletionChunk {
            choices,
            diagnostics: Vec::new(),
            completion_tokens: event.usage.and_then(|u| u.completion_tokens),
            prompt_tokens: event.usage.and_then(|u| u.prompt_tokens),
            response_duration: None,
            system_fingerprint: event.system_fingerprint,
        })
    }

    fn reconstruct(&mut self, delta: StreamDelta) -> Option<ChatCompletionChoiceStream> {
        let StreamDelta {
            index,
            role,
            content,
            tool_call,
            refusal,
            finish_reason,
            logprobs,
        } = delta;

        let tool_call = tool_call.filter(|call| {
            let attributable = call.name.is_some() || self.last_tool_name.is_some();
            if !attributable {
                tracing::debug!(fragment = %call.arguments, "dropping tool-call fragment with no call in flight");
            }
            attributable
        });
        let role = role.map(DeltaRole::from);
        let has_payload = content.is_some() || refusal.is_some();

        let delta = if let Some(call) = tool_call {
            if let Some(name) = call.name {
                self.last_role = Some(DeltaRole::Tool);
                self.last_tool_name = Some(name);
                self.last_tool_call_id = call.id;
            }
            self.tool_delta(call.arguments)?
        } else if let Some(role) = role.filter(|role| Some(*role) != self.last_role) {
            self.last_role = Some(role);
            ChatCompletionDelta {
                content: content.unwrap_or_default(),
                role,
                tool_calls: None,
                refusal,
            }
        } else if has_payload {
            let role = match self.last_role {
                None | Some(DeltaRole::Tool) => DeltaRole::Assistant,
                Some(role) => role,
            };
            self.last_role = Some(role);
            ChatCompletionDelta {
                content: content.unwrap_or_default(),
                role,
                tool_calls: None,
                refusal,
            }
        } else if finish_reason.is_some() || logprobs.is_some() {
            match self.last_role {
                Some(DeltaRole::Tool) => self.tool_delta(String::new())?,
                last => ChatCompletionDelta {
                    content: String::new(),
                    role: last.unwrap_or(DeltaRole::Assistant),
                    tool_calls: None,
                    refusal: None,
                },
            }
        } else {
            return None;
        };

        Some(ChatCompletionChoiceStream {
            delta,
            index,
            finish_reason,
            logprobs,
        })
    }

    /// Fragment of the tool call in flight
    fn tool_delta(&self, fragment: String) -> Option<ChatCompletionDelta> {
        let name = self.last_tool_name.as_deref()?;
        Some(ChatCompletionDelta::tool_fragment(
            name,
            self.last_tool_call_id.as_deref(),
            fragment,
        ))
    }
}

/// Reassembles complete tool calls from canonical chunks
///
/// Fragments are grouped by tool call id in order of first appearance.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: Vec<(Option<String>, String, String)>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tool fragments of one chunk
    pub fn push(&mut self, chunk: &ChatCompletionChunk) {
        for choice in &chunk.choices {
            let Some(call) = choice.delta.tool_calls.as_ref().and_then(|calls| calls.first()) else {
                continue;
            };
            let fragment = call.function.arguments.to_fragment();

            let existing = self
                .calls
                .iter_mut()
                .find(|(id, name, _)| *id == call.id && *name == call.function.name);
            match existing {
                Some((_, _, arguments)) => arguments.push_str(&fragment),
                None => self.calls.push((call.id.clone(), call.function.name.clone(), fragment)),
            }
        }
    }

    /// Completed calls; arguments that are not JSON are kept as text
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|(id, name, arguments)| {
                let arguments = if arguments.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&arguments).unwrap_or(Value::String(arguments))
                };
                ToolCall::new(id.unwrap_or_default(), name, arguments)
            })
            .collect()
    }
}
