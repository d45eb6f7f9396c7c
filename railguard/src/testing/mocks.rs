//! Test doubles for generators and checks.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use crate::cancellation::{CancellationToken, Cancelled};
use crate::checks::Check;
use crate::client::Generator;
use crate::errors::BoxError;

/// One scripted generator reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Return this text.
    Text(String),
    /// Fail with this message.
    Fail(String),
}

impl Reply {
    /// A successful reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// A failing reply.
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// A generator that plays back a fixed script of replies.
///
/// Call `n` gets reply `n`; once the script runs out the last reply
/// repeats. Every input is recorded.
#[derive(Debug)]
pub struct ScriptedGenerator {
    replies: Vec<Reply>,
    delay: Option<Duration>,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Creates a generator from a script.
    #[must_use]
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            delay: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `text`.
    #[must_use]
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![Reply::text(text)])
    }

    /// Always fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(vec![Reply::fail(message)])
    }

    /// Returns each text in turn, repeating the last.
    #[must_use]
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(Reply::text).collect())
    }

    /// Fails `failures` times, then returns `text`.
    #[must_use]
    pub fn failing_then(failures: usize, message: &str, text: impl Into<String>) -> Self {
        let mut replies = vec![Reply::fail(message); failures];
        replies.push(Reply::text(text));
        Self::new(replies)
    }

    /// Makes every call take `delay`, cut short by cancellation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Returns the inputs of every call, in order.
    #[must_use]
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }

    fn next_reply(&self, input: &str) -> Option<Reply> {
        let mut inputs = self.inputs.lock();
        let index = inputs.len().min(self.replies.len().saturating_sub(1));
        inputs.push(input.to_string());
        self.replies.get(index).cloned()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, input: &str, token: &CancellationToken) -> Result<String, BoxError> {
        let reply = self.next_reply(input);

        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    return Err(Cancelled::new(token.reason().unwrap_or_default()).into());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(anyhow::anyhow!(message).into()),
            None => Err(anyhow::anyhow!("no scripted reply").into()),
        }
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Pass,
    Reject(String),
    FailTimes(usize, String),
    RejectContaining(String),
}

/// A check with scripted behavior that records every text it sees.
#[derive(Debug)]
pub struct RecordingCheck {
    name: String,
    behavior: Behavior,
    texts: Mutex<Vec<String>>,
}

impl RecordingCheck {
    fn with_behavior(name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Accepts everything.
    #[must_use]
    pub fn passing(name: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Pass)
    }

    /// Rejects everything with `reason`.
    #[must_use]
    pub fn rejecting(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Reject(reason.into()))
    }

    /// Rejects the first `times` calls, then accepts.
    #[must_use]
    pub fn failing_times(name: impl Into<String>, times: usize, reason: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::FailTimes(times, reason.into()))
    }

    /// Rejects any text containing `needle`.
    #[must_use]
    pub fn rejecting_containing(name: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::RejectContaining(needle.into()))
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.texts.lock().len()
    }

    /// Returns every checked text, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl Check for RecordingCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, text: &str, _token: &CancellationToken) -> Result<(), BoxError> {
        let calls_before = {
            let mut texts = self.texts.lock();
            texts.push(text.to_string());
            texts.len() - 1
        };

        match &self.behavior {
            Behavior::Pass => Ok(()),
            Behavior::Reject(reason) => Err(reason.clone().into()),
            Behavior::FailTimes(times, reason) if calls_before < *times => Err(reason.clone().into()),
            Behavior::FailTimes(..) => Ok(()),
            Behavior::RejectContaining(needle) if text.contains(needle.as_str()) => {
                Err(format!("text contains '{needle}'").into())
            }
            Behavior::RejectContaining(_) => Ok(()),
        }
    }
}
