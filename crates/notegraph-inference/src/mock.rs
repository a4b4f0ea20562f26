//! Mock inference backends for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notegraph_inference::mock::{HashingEmbedder, ScriptedGenerator};
//!
//! let generator = ScriptedGenerator::new()
//!     .with_reply(r#"{"concepts":[{"name":"Idempotency","confidence":0.9}]}"#)
//!     .with_failure("model offline");
//! let embedder = HashingEmbedder::new(256);
//! assert_eq!(generator.pending(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use notegraph_core::{EmbeddingBackend, Error, GenerationBackend, Result, Vector};

/// One scripted generation outcome.
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// A recorded generation call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub prompt: String,
}

/// Generation backend that replays queued replies in order.
///
/// When the queue is empty the default reply is returned.
#[derive(Clone)]
pub struct ScriptedGenerator {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    default_reply: Reply,
    latency: Duration,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            default_reply: Reply::Text(r#"{"concepts":[]}"#.to_string()),
            latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful reply.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(Reply::Text(text.into()));
        self
    }

    /// Queue a failed call.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Reply::Fail(message.into()));
        self
    }

    /// Reply returned once the queue is drained.
    pub fn with_default_reply(mut self, text: impl Into<String>) -> Self {
        self.default_reply = Reply::Text(text.into());
        self
    }

    /// Make every call fail once the queue is drained.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.default_reply = Reply::Fail(message.into());
        self
    }

    /// Delay every call, for timeout and cancellation tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a reply on an existing (possibly shared) generator.
    pub fn enqueue(&self, text: impl Into<String>) {
        self.push(Reply::Text(text.into()));
    }

    pub fn pending(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(MockCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(Error::Inference(message)),
        }
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Embedding backend that hashes character trigrams into a fixed number of
/// buckets and L2-normalizes the counts.
///
/// Lexically close strings land close together, so near-duplicate concept
/// names and reasons behave like they would with a real model.
#[derive(Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    fail_with: Option<String>,
    calls: Arc<Mutex<usize>>,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            fail_with: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Make every call fail with an embedding error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Number of texts embedded so far.
    pub fn embedded_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Deterministic embedding of one text.
    pub fn embed_one(&self, text: &str) -> Vector {
        let normalized = format!(
            " {} ",
            text.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        );
        let chars: Vec<char> = normalized.chars().collect();
        let mut vector = vec![0.0f32; self.dimension];

        let grams: Vec<String> = if chars.len() < 3 {
            vec![normalized.clone()]
        } else {
            chars.windows(3).map(|w| w.iter().collect()).collect()
        };
        for gram in grams {
            let bucket = (fnv1a(gram.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if let Some(message) = &self.fail_with {
            return Err(Error::Embedding(message.clone()));
        }
        *self.calls.lock().unwrap() += texts.len();
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-trigram"
    }
}
