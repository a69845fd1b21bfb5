//! Scripted [`EventBus`] mock.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::port::bus::{EventBus, PublishError};

/// Behavior of one scripted publish call.
#[derive(Debug, Clone)]
pub enum ScriptedPublish {
    Ok,
    Err(PublishError),
    /// Never completes; exercises the caller's deadline.
    Hang,
}

/// A downstream bus with pre-loaded publish outcomes.
///
/// Each publish pops the next scripted behavior (defaulting to `Ok` when
/// the script is exhausted) and records the key/payload it was given, in
/// call order.
#[derive(Default)]
pub struct ScriptedBus {
    script: Mutex<VecDeque<ScriptedPublish>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append behaviors to the script.
    pub fn script(&self, behaviors: Vec<ScriptedPublish>) {
        self.script.lock().extend(behaviors);
    }

    /// Keys of every record published so far, in order.
    pub fn published_keys(&self) -> Vec<String> {
        self.published.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Payloads of every record published so far, in order.
    pub fn published_payloads(&self) -> Vec<Vec<u8>> {
        self.published.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }
}

#[async_trait]
impl EventBus for ScriptedBus {
    async fn publish(&self, key: &str, payload: &[u8]) -> std::result::Result<(), PublishError> {
        self.published
            .lock()
            .push((key.to_string(), payload.to_vec()));
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(ScriptedPublish::Ok);
        match behavior {
            ScriptedPublish::Ok => Ok(()),
            ScriptedPublish::Err(err) => Err(err),
            ScriptedPublish::Hang => std::future::pending().await,
        }
    }
}
