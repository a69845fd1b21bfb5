//! Scripted [`TradeStream`] mock and offset recorders.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::codec;
use crate::domain::{AckHandle, TradeEvent};
use crate::error::Result;
use crate::port::stream::{OffsetStore, StreamMessage, TradeStream};

/// A source stream with a fixed message queue; returns `None` when drained.
pub struct ScriptedStream {
    messages: VecDeque<StreamMessage>,
    paused: Arc<Mutex<bool>>,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            paused: Arc::new(Mutex::new(false)),
        }
    }

    /// Queue a raw frame at the given offset.
    pub fn push_raw(mut self, payload: impl Into<Bytes>, offset: i64) -> Self {
        self.messages.push_back(StreamMessage {
            payload: payload.into(),
            offset,
            ack: AckHandle {
                partition: 0,
                offset,
            },
        });
        self
    }

    /// Queue an encoded trade at the given offset.
    pub fn push_trade(self, trade: &TradeEvent, offset: i64) -> Self {
        let payload = codec::encode(trade);
        self.push_raw(payload, offset)
    }

    pub fn pause_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.paused)
    }
}

impl Default for ScriptedStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeStream for ScriptedStream {
    async fn next_message(&mut self) -> Result<Option<StreamMessage>> {
        Ok(self.messages.pop_front())
    }

    fn pause(&self) {
        *self.paused.lock() = true;
    }

    fn resume(&self) {
        *self.paused.lock() = false;
    }
}

/// Offset store that remembers every stored handle, in call order.
#[derive(Default)]
pub struct RecordingOffsetStore {
    stored: Mutex<Vec<AckHandle>>,
}

impl RecordingOffsetStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stored(&self) -> Vec<AckHandle> {
        self.stored.lock().clone()
    }

    /// The highest offset stored so far, if any.
    pub fn last_offset(&self) -> Option<i64> {
        self.stored.lock().last().map(|ack| ack.offset)
    }
}

impl OffsetStore for RecordingOffsetStore {
    fn store_offset(&self, ack: &AckHandle) -> Result<()> {
        self.stored.lock().push(*ack);
        Ok(())
    }
}

/// Offset store that discards everything.
pub struct NullOffsetStore;

impl OffsetStore for NullOffsetStore {
    fn store_offset(&self, _ack: &AckHandle) -> Result<()> {
        Ok(())
    }
}
