// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Generic store operations over a shared Redis connection.

use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, JsonAsyncCommands};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("malformed document at {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Cheap-to-clone handle on the store.  One per process is plenty; the
/// underlying `ConnectionManager` multiplexes and reconnects on its own.
#[derive(Clone)]
pub struct StateStore {
    client: redis::Client,
    con: ConnectionManager,
}

impl StateStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let con = client.get_connection_manager().await?;
        debug!(url, "connected to state store");
        Ok(Self { client, con })
    }

    // ── JSON documents ────────────────────────────────────────────────────────

    /// Read the whole document at `key`.  `None` when the key does not exist.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.json_get(key, "$").await?;
        let Some(raw) = raw else { return Ok(None) };
        // A `$` query returns a one-element array of matches.
        let parsed: Vec<T> = serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })?;
        Ok(parsed.into_iter().next())
    }

    /// Replace the whole document at `key`.
    pub async fn set_json<T: Serialize + Sync + Send>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.json_set(key, "$", value).await?;
        Ok(())
    }

    /// Overwrite one field inside the document.  `path` is a RedisJSON path
    /// relative to the root, e.g. `$.pid` or `$[3].turn_summary`; the write
    /// is a single server-side command, so concurrent writers to sibling
    /// fields never clobber each other.
    pub async fn patch_field<T: Serialize + Sync + Send>(
        &self,
        key: &str,
        path: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.json_set(key, path, value).await?;
        Ok(())
    }

    /// Append one element to the array at `path` (e.g. `$` or `$[0].messages`).
    pub async fn append_to_array<T: Serialize + Sync + Send>(
        &self,
        key: &str,
        path: &str,
        element: &T,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.json_arr_append(key, path, element).await?;
        Ok(())
    }

    // ── Plain keys ────────────────────────────────────────────────────────────

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.del(key).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        Ok(con.exists(key).await?)
    }

    /// Set an expiring string value (plain SET with EX, not RedisJSON).
    pub async fn set_string_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.con.clone();
        Ok(con.get(key).await?)
    }

    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut con = self.con.clone();
        Ok(con.keys(pattern).await?)
    }

    // ── Pub/sub ───────────────────────────────────────────────────────────────

    pub async fn publish<T: Serialize>(&self, channel: &str, payload: &T) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let text = serde_json::to_string(payload).map_err(|source| StoreError::Malformed {
            key: channel.to_string(),
            source,
        })?;
        let _: () = con.publish(channel, text).await?;
        Ok(())
    }

    /// Open a dedicated subscriber connection on `channel`.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(Subscription { pubsub })
    }
}

/// One subscribed pub/sub connection.  Dropping it unsubscribes.
pub struct Subscription {
    pubsub: redis::aio::PubSub,
}

impl Subscription {
    /// Wait for the next message payload.  `None` when the connection closes.
    pub async fn next_payload(&mut self) -> Option<String> {
        let msg = self.pubsub.on_message().next().await?;
        msg.get_payload().ok()
    }

    /// Non-blocking poll: the next payload if one is already buffered.
    pub async fn try_next_payload(&mut self) -> Option<String> {
        let mut stream = self.pubsub.on_message();
        match futures::poll!(std::pin::pin!(stream.next())) {
            std::task::Poll::Ready(Some(msg)) => msg.get_payload().ok(),
            _ => None,
        }
    }
}
