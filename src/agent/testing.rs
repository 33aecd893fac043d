//! In-memory advisor used by tests across the crate.

use crate::agent::advisor::{Advisor, AdvisorError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the scripted advisor does for a given system prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    Empty,
    Panic,
    Slow(Duration, String),
}

/// Replies keyed by system prompt. Unknown prompts fail.
#[derive(Default)]
pub struct ScriptedAdvisor {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, system_prompt: &str, reply: Reply) -> Self {
        self.replies.insert(system_prompt.to_string(), reply);
        self
    }

    /// Every (system_prompt, prompt) pair received, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompt received for a system prompt, if it was called.
    pub fn prompt_for(&self, system_prompt: &str) -> Option<String> {
        self.calls()
            .into_iter()
            .find(|(s, _)| s == system_prompt)
            .map(|(_, p)| p)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, AdvisorError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), prompt.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let reply = self
            .replies
            .get(system_prompt)
            .cloned()
            .unwrap_or_else(|| Reply::Fail(format!("no reply scripted for {}", system_prompt)));

        let result = match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(AdvisorError::Request(message)),
            Reply::Empty => Ok(String::new()),
            Reply::Panic => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted panic for {}", system_prompt);
            }
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
