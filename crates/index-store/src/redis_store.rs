//! Redis-backed index store.
//!
//! Each item is one hash at `book:{item_id}`:
//! - `title`: display title
//! - `stock`: integer stock count
//! - `condition`: condition tag, empty string meaning absent
//! - `stock_as_of`: epoch milliseconds of the event that set `stock` (optional)
//!
//! Upserts run as Lua scripts so the existence check, the stock guard and
//! the field writes of one record are a single atomic server-side step.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use common::ItemId;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::item::{from_millis, to_millis};
use crate::{
    FieldUpdates, IndexStoreError, IndexedItem, Result, WriteOutcome,
    store::{IndexStore, validate_item_id},
};

/// Default key prefix for index records.
pub const DEFAULT_KEY_PREFIX: &str = "book:";

/// ARGV[1] stock or '', ARGV[2] guard millis or '', ARGV[3..] field/value pairs.
/// Returns {existed, stock_skipped}.
const UPSERT_SCRIPT: &str = r"
local existed = redis.call('EXISTS', KEYS[1])
local skipped = 0
if ARGV[1] ~= '' then
  local guard = tonumber(ARGV[2])
  local stored = tonumber(redis.call('HGET', KEYS[1], 'stock_as_of') or '')
  if guard and stored and stored > guard then
    skipped = 1
  else
    redis.call('HSET', KEYS[1], 'stock', ARGV[1])
    if guard then
      redis.call('HSET', KEYS[1], 'stock_as_of', ARGV[2])
    end
  end
end
for i = 3, #ARGV, 2 do
  redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
if existed == 0 then
  redis.call('HSETNX', KEYS[1], 'title', '')
  redis.call('HSETNX', KEYS[1], 'stock', '0')
  redis.call('HSETNX', KEYS[1], 'condition', '')
end
return {existed, skipped}
";

/// ARGV: title, stock, condition, guard millis or ''. Returns 1 if written.
const INSERT_IF_ABSENT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'title', ARGV[1], 'stock', ARGV[2], 'condition', ARGV[3])
if ARGV[4] ~= '' then
  redis.call('HSET', KEYS[1], 'stock_as_of', ARGV[4])
end
return 1
";

/// Redis-backed index store.
///
/// Holds a `ConnectionManager`, which reconnects on its own after the
/// server drops the connection; clones share it.
#[derive(Clone)]
pub struct RedisIndexStore {
    conn_manager: ConnectionManager,
    key_prefix: String,
    upsert: Script,
    insert_if_absent: Script,
}

impl RedisIndexStore {
    /// Connects to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::Unavailable`] if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            IndexStoreError::Unavailable(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            IndexStoreError::Unavailable(format!(
                "Failed to create Redis connection manager: {e}"
            ))
        })?;

        Ok(Self::new(conn_manager))
    }

    /// Creates a store over an existing connection manager.
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            upsert: Script::new(UPSERT_SCRIPT),
            insert_if_absent: Script::new(INSERT_IF_ABSENT_SCRIPT),
        }
    }

    /// Uses a different key prefix, e.g. to isolate tests sharing one server.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn record_key(&self, item_id: &ItemId) -> String {
        format!("{}{}", self.key_prefix, item_id)
    }

    fn item_id_from_key(&self, key: &str) -> ItemId {
        ItemId::new(key.strip_prefix(&self.key_prefix).unwrap_or(key))
    }

    /// Enumerates record keys with `SCAN`.
    ///
    /// `SCAN` may report a key more than once; duplicates are dropped while
    /// keeping first-seen order.
    async fn scan_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let pattern = format!("{}*", self.key_prefix);

        let raw: Vec<String> = conn.scan_match::<_, String>(&pattern).await?.collect().await;

        let mut seen = HashSet::with_capacity(raw.len());
        Ok(raw.into_iter().filter(|k| seen.insert(k.clone())).collect())
    }

    fn item_from_hash(item_id: ItemId, fields: &HashMap<String, String>) -> IndexedItem {
        let stock_count = match fields.get("stock") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(item_id = %item_id, stock = %raw, "unparseable stock field, reading as 0");
                0
            }),
            None => 0,
        };

        IndexedItem {
            title: fields.get("title").cloned().unwrap_or_default(),
            stock_count,
            condition: fields.get("condition").filter(|c| !c.is_empty()).cloned(),
            stock_as_of: fields
                .get("stock_as_of")
                .and_then(|raw| raw.parse().ok())
                .and_then(from_millis),
            item_id,
        }
    }
}

#[async_trait]
impl IndexStore for RedisIndexStore {
    async fn get(&self, item_id: &ItemId) -> Result<Option<IndexedItem>> {
        let mut conn = self.conn_manager.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.record_key(item_id)).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::item_from_hash(item_id.clone(), &fields)))
    }

    async fn upsert_fields(
        &self,
        item_id: &ItemId,
        updates: FieldUpdates,
    ) -> Result<WriteOutcome> {
        validate_item_id(item_id)?;

        let mut conn = self.conn_manager.clone();
        let mut invocation = self.upsert.key(self.record_key(item_id));

        invocation
            .arg(updates.stock_count.map(|s| s.to_string()).unwrap_or_default())
            .arg(
                updates
                    .stock_as_of
                    .map(|ts| to_millis(ts).to_string())
                    .unwrap_or_default(),
            );
        if let Some(title) = &updates.title {
            invocation.arg("title").arg(title);
        }
        if let Some(condition) = &updates.condition {
            invocation
                .arg("condition")
                .arg(condition.as_deref().unwrap_or_default());
        }

        let (existed, skipped): (i64, i64) = invocation.invoke_async(&mut conn).await?;

        Ok(WriteOutcome {
            created: existed == 0,
            stock_skipped: skipped == 1,
        })
    }

    async fn insert_if_absent(&self, item: IndexedItem) -> Result<bool> {
        validate_item_id(&item.item_id)?;

        let mut conn = self.conn_manager.clone();
        let written: i64 = self
            .insert_if_absent
            .key(self.record_key(&item.item_id))
            .arg(&item.title)
            .arg(item.stock_count)
            .arg(item.condition.as_deref().unwrap_or_default())
            .arg(
                item.stock_as_of
                    .map(|ts| to_millis(ts).to_string())
                    .unwrap_or_default(),
            )
            .invoke_async(&mut conn)
            .await?;

        Ok(written == 1)
    }

    async fn list_all(&self) -> Result<Vec<IndexedItem>> {
        let keys = self.scan_keys().await?;
        let mut conn = self.conn_manager.clone();

        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let fields: HashMap<String, String> = match conn.hgetall(&key).await {
                Ok(fields) => fields,
                Err(err) if is_wrong_type(&err) => {
                    tracing::warn!(%key, "record key does not hold a hash, skipping");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            // Gone between SCAN and HGETALL.
            if fields.is_empty() {
                continue;
            }
            items.push(Self::item_from_hash(self.item_id_from_key(&key), &fields));
        }
        Ok(items)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.scan_keys().await?.len())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn is_wrong_type(err: &redis::RedisError) -> bool {
    err.code() == Some("WRONGTYPE")
}
