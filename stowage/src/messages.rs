//! Completion messages passed from the downloader side to the client.
//!
//! When a job ends, the downloader writes one [`ClientMessage`] listing the
//! new state of every bundle in the job. The client applies them later
//! through [`MessageConsumer`]. [`FileCacheMessageQueue`] stores each message
//! as its own file so producers and consumers never rewrite each other's
//! data.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::CatalogState;
use crate::error::{StowageError, StowageResult};
use crate::storage::{read_json, write_json, FileCache};
use crate::urls::remove_slash_at_end;

/// New state for one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub canonical_url: String,
    pub state: CatalogState,
}

/// Outcome of one finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    pub id: String,
    pub timestamp: u64,
    pub download_id: String,
    pub state_updates: Vec<StateUpdate>,
}

/// Consumer side of the completion message queue.
pub trait MessageConsumer: Send + Sync {
    fn get_all_messages(&self) -> impl Future<Output = StowageResult<Vec<ClientMessage>>> + Send;

    /// Returns `false` if no message with `id` was queued.
    fn delete_message(&self, id: &str) -> impl Future<Output = StowageResult<bool>> + Send;

    fn delete_all_messages(&self) -> impl Future<Output = StowageResult<()>> + Send;
}

impl<T: MessageConsumer> MessageConsumer for Arc<T> {
    fn get_all_messages(&self) -> impl Future<Output = StowageResult<Vec<ClientMessage>>> + Send {
        (**self).get_all_messages()
    }

    fn delete_message(&self, id: &str) -> impl Future<Output = StowageResult<bool>> + Send {
        (**self).delete_message(id)
    }

    fn delete_all_messages(&self) -> impl Future<Output = StowageResult<()>> + Send {
        (**self).delete_all_messages()
    }
}

/// Message queue kept in a [`FileCache`] under
/// `{origin}/__client-messages__/{id}.json`.
pub struct FileCacheMessageQueue<C> {
    cache: C,
    prefix: String,
}

impl<C: FileCache> FileCacheMessageQueue<C> {
    pub fn new(cache: C, origin: &str) -> Self {
        Self {
            cache,
            prefix: format!("{}/__client-messages__/", remove_slash_at_end(origin)),
        }
    }

    fn message_url(&self, id: &str) -> String {
        format!("{}{}.json", self.prefix, id)
    }

    /// Producer side: queue a message, replacing one with the same id.
    pub async fn push_message(&self, message: &ClientMessage) -> StowageResult<()> {
        debug!(
            message_id = %message.id,
            download_id = %message.download_id,
            updates = message.state_updates.len(),
            "Queueing client message"
        );
        write_json(&self.cache, &self.message_url(&message.id), message).await
    }

    async fn message_urls(&self) -> StowageResult<Vec<String>> {
        Ok(self
            .cache
            .list()
            .await?
            .into_iter()
            .filter(|url| url.starts_with(&self.prefix))
            .collect())
    }
}

impl<C: FileCache> MessageConsumer for FileCacheMessageQueue<C> {
    async fn get_all_messages(&self) -> StowageResult<Vec<ClientMessage>> {
        let mut messages = Vec::new();
        for url in self.message_urls().await? {
            match read_json::<_, ClientMessage>(&self.cache, &url).await {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                Err(StowageError::CorruptRecord { source, .. }) => {
                    // A message that cannot be decoded will never apply.
                    warn!(url = %url, error = %source, "Discarding unreadable client message");
                    self.cache.delete(&url).await?;
                }
                Err(e) => return Err(e),
            }
        }
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn delete_message(&self, id: &str) -> StowageResult<bool> {
        self.cache.delete(&self.message_url(id)).await
    }

    async fn delete_all_messages(&self) -> StowageResult<()> {
        for url in self.message_urls().await? {
            self.cache.delete(&url).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryFileCache;

    fn message(id: &str, timestamp: u64) -> ClientMessage {
        ClientMessage {
            id: id.to_string(),
            timestamp,
            download_id: id.to_string(),
            state_updates: vec![StateUpdate {
                canonical_url: "https://a.com/stowage.json".to_string(),
                state: CatalogState::Cached,
            }],
        }
    }

    #[tokio::test]
    async fn test_push_and_consume() {
        let cache = Arc::new(MemoryFileCache::new());
        let queue = FileCacheMessageQueue::new(Arc::clone(&cache), "https://games.local/");
        queue.push_message(&message("b", 20)).await.unwrap();
        queue.push_message(&message("a", 10)).await.unwrap();
        cache
            .put(
                "https://games.local/other.json",
                crate::storage::CachedFile::new("{}", "application/json"),
            )
            .await
            .unwrap();

        let all = queue.get_all_messages().await.unwrap();
        assert_eq!(all.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(queue.delete_message("a").await.unwrap());
        assert!(!queue.delete_message("a").await.unwrap());
        queue.delete_all_messages().await.unwrap();
        assert!(queue.get_all_messages().await.unwrap().is_empty());
        assert!(cache.get("https://games.local/other.json").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_message_is_discarded() {
        let cache = Arc::new(MemoryFileCache::new());
        let queue = FileCacheMessageQueue::new(Arc::clone(&cache), "https://games.local");
        queue.push_message(&message("good", 1)).await.unwrap();
        let torn_url = "https://games.local/__client-messages__/torn.json";
        cache
            .put(
                torn_url,
                crate::storage::CachedFile::new("{\"id\": \"torn\", \"times", "application/json"),
            )
            .await
            .unwrap();

        let all = queue.get_all_messages().await.unwrap();
        assert_eq!(all.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["good"]);
        assert!(cache.get(torn_url).await.unwrap().is_none());
        assert_eq!(queue.get_all_messages().await.unwrap().len(), 1);
    }

    #[test]
    fn test_message_json_field_names() {
        let json = serde_json::to_value(message("x", 1)).unwrap();
        assert_eq!(json["downloadId"], "x");
        assert_eq!(json["stateUpdates"][0]["state"], "cached");
    }
}
