use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use mojarung_llm::{ChatModel, ChatRequest};
use mojarung_shared::{MojarungError, Result};
use mojarung_storage::Storage;

/// Replies with canned answers in order; an exhausted script is an LLM error.
/// An empty canned answer is also returned as an error, like a blank reply.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.seen.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.seen.lock().expect("lock").push(request);
        match self.replies.lock().expect("lock").pop_front() {
            Some(reply) if !reply.trim().is_empty() => Ok(reply),
            Some(_) => Err(MojarungError::Llm("empty reply".into())),
            None => Err(MojarungError::Llm("script exhausted".into())),
        }
    }
}

pub async fn test_storage() -> Storage {
    let path = std::env::temp_dir().join(format!("mojarung-core-{}.db", uuid::Uuid::now_v7()));
    test_storage_at(&path).await
}

pub async fn test_storage_at(path: &std::path::Path) -> Storage {
    Storage::open(path).await.expect("open storage")
}
