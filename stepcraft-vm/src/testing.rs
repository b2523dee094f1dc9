//! Test doubles for the engine's external collaborators.
//!
//! [`ScriptedInvoker`] stands in for a model backend and [`RecordingDispatcher`]
//! for a tool dispatcher. Both are cheap to clone; clones share their
//! recordings so a test can keep a handle after giving one to an interpreter.

use crate::error::{Error, Result};
use crate::provider::ModelInvoker;
use crate::state::Message;
use crate::tool::{ToolDispatcher, ToolInput, ToolResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request the invoker received
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
}

#[derive(Debug)]
enum Reply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct InvokerLog {
    replies: VecDeque<Reply>,
    requests: Vec<Invocation>,
    in_flight: usize,
    peak: usize,
}

/// A model invoker that replays canned responses.
///
/// Responses are handed out in order; once the script runs dry every call
/// gets the fallback ("Done." unless changed).
#[derive(Debug, Clone)]
pub struct ScriptedInvoker {
    log: Arc<Mutex<InvokerLog>>,
    fallback: String,
    delay: Option<Duration>,
}

impl Default for ScriptedInvoker {
    fn default() -> Self {
        Self {
            log: Arc::default(),
            fallback: "Done.".to_string(),
            delay: None,
        }
    }
}

impl ScriptedInvoker {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invoker = Self::default();
        {
            let mut log = invoker.lock();
            log.replies = replies.into_iter().map(|r| Reply::Text(r.into())).collect();
        }
        invoker
    }

    /// Every call returns the same text
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: text.into(),
            ..Self::default()
        }
    }

    /// Queue a failing call after the replies already scripted
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.lock().replies.push_back(Reply::Fail(message.into()));
        self
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<Invocation> {
        self.lock().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Largest number of calls that were in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.lock().peak
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InvokerLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    async fn invoke(&self, model: &str, system: &str, messages: &[Message]) -> Result<String> {
        let reply = {
            let mut log = self.lock();
            log.requests.push(Invocation {
                model: model.to_string(),
                system: system.to_string(),
                messages: messages.to_vec(),
            });
            log.in_flight += 1;
            log.peak = log.peak.max(log.in_flight);
            log.replies.pop_front()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.lock().in_flight -= 1;

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => {
                Err(Error::inference_failed(message).with_operation("ScriptedInvoker::invoke"))
            }
            None => Ok(self.fallback.clone()),
        }
    }
}

type Handler = Arc<dyn Fn(&ToolInput) -> ToolResult + Send + Sync>;

/// One call the dispatcher received
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedCall {
    pub name: String,
    pub input: ToolInput,
}

/// A tool dispatcher with canned results that records every call.
///
/// Names without a result answer like [`crate::ToolRegistry`] does for an
/// unknown tool.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    handlers: HashMap<String, Handler>,
    delays: HashMap<String, Duration>,
    calls: Arc<Mutex<Vec<DispatchedCall>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, name: impl Into<String>, result: ToolResult) -> Self {
        self.with_handler(name, move |_| result.clone())
    }

    pub fn with_handler<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ToolInput) -> ToolResult + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Make `name` take `delay` before answering
    pub fn with_delay(mut self, name: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(name.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<DispatchedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.name == name).count()
    }
}

#[async_trait]
impl ToolDispatcher for RecordingDispatcher {
    async fn execute(&self, name: &str, input: &ToolInput) -> ToolResult {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(DispatchedCall {
                name: name.to_string(),
                input: input.clone(),
            });

        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }

        match self.handlers.get(name) {
            Some(handler) => handler(input),
            None => ToolResult::unknown_tool(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_then_fallback() {
        let invoker = ScriptedInvoker::new(["one", "two"]).then_fail("boom");
        let msgs = [Message::user("hi")];

        assert_eq!(invoker.invoke("m", "sys", &msgs).await.unwrap(), "one");
        assert_eq!(invoker.invoke("m", "sys", &msgs).await.unwrap(), "two");
        assert!(invoker.invoke("m", "sys", &msgs).await.is_err());
        assert_eq!(invoker.invoke("m", "sys", &msgs).await.unwrap(), "Done.");

        let requests = invoker.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].system, "sys");
    }

    #[tokio::test]
    async fn test_peak_concurrency() {
        let invoker = ScriptedInvoker::always("x").with_delay(Duration::from_millis(10));
        let msgs = [Message::user("hi")];
        let calls = (0..4).map(|_| invoker.invoke("m", "", &msgs));
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(results.len(), 4);
        assert_eq!(invoker.peak_concurrency(), 4);
    }

    #[tokio::test]
    async fn test_dispatcher_records_calls() {
        let dispatcher = RecordingDispatcher::new().with_result("search", ToolResult::ok("3 results", "a\nb\nc"));
        let handle = dispatcher.clone();

        let mut input = ToolInput::new();
        input.insert("q".to_string(), serde_json::json!("x"));
        assert!(dispatcher.execute("search", &input).await.success);
        assert!(!dispatcher.execute("missing", &ToolInput::new()).await.success);

        assert_eq!(handle.call_count("search"), 1);
        assert_eq!(handle.calls()[0].input, input);
    }
}
