//! Redis connection management and the typed primitive adapter

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

use crate::broker::{BrokerConfig, BrokerError, BrokerResult};

/// Shared handle to the broker
///
/// `ConnectionManager` multiplexes one auto-reconnecting connection; clones
/// are cheap, so each task grabs its own `BrokerConnection` via `get()`.
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
    config: BrokerConfig,
}

impl RedisPool {
    /// Connect to the broker and validate the link with a PING
    pub async fn connect(config: BrokerConfig) -> BrokerResult<Self> {
        let client = redis::Client::open(config.connection_url())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let manager_config =
            ConnectionManagerConfig::new().set_connection_timeout(Some(config.connect_timeout()));
        let manager = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let pool = Self { manager, config };

        let mut conn = pool.get();
        conn.ping().await?;

        info!(addr = %pool.config.addr, db = pool.config.database, "connected to broker");

        Ok(pool)
    }

    /// Get a connection handle
    pub fn get(&self) -> BrokerConnection {
        BrokerConnection {
            manager: self.manager.clone(),
        }
    }
}

/// Typed adapter over the broker primitives the pipeline consumes
///
/// No domain logic lives here; all errors surface as `BrokerError`.
pub struct BrokerConnection {
    manager: ConnectionManager,
}

impl BrokerConnection {
    /// Validate the connection
    pub async fn ping(&mut self) -> BrokerResult<()> {
        let pong: String = redis::cmd("PING")
            .query_async(&mut self.manager)
            .await
            .map_err(BrokerError::from)?;

        if pong != "PONG" {
            return Err(BrokerError::Connection(format!("unexpected PING reply: {}", pong)));
        }

        Ok(())
    }

    /// LPUSH: push a value to the head of a list
    pub async fn push_head(&mut self, list: &str, value: &str) -> BrokerResult<()> {
        let _: () = self.manager.lpush(list, value).await?;
        Ok(())
    }

    /// BRPOP: block until a value is available at the tail of the list, or
    /// the timeout elapses (returns None)
    pub async fn pop_tail_blocking(
        &mut self,
        list: &str,
        timeout: Duration,
    ) -> BrokerResult<Option<(String, String)>> {
        let popped: Option<(String, String)> =
            self.manager.brpop(list, timeout.as_secs_f64()).await?;
        Ok(popped)
    }

    /// DEL: remove a key; true when the key existed
    pub async fn del(&mut self, key: &str) -> BrokerResult<bool> {
        let removed: i64 = self.manager.del(key).await?;
        Ok(removed > 0)
    }

    /// SETEX: set a key with a TTL
    pub async fn set_with_ttl(&mut self, key: &str, value: &str, ttl: Duration) -> BrokerResult<()> {
        let _: () = self.manager.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    /// EXISTS
    pub async fn exists(&mut self, key: &str) -> BrokerResult<bool> {
        let exists: bool = self.manager.exists(key).await?;
        Ok(exists)
    }

    /// ZADD a single member with a score
    pub async fn zadd(&mut self, key: &str, score: f64, member: &str) -> BrokerResult<()> {
        let _: () = self.manager.zadd(key, member, score).await?;
        Ok(())
    }

    /// ZRANGEBYSCORE with scores, inclusive on both ends
    pub async fn zrange_by_score_with_scores(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> BrokerResult<Vec<(String, f64)>> {
        let entries: Vec<(String, f64)> =
            self.manager.zrangebyscore_withscores(key, min, max).await?;
        Ok(entries)
    }

    /// ZRANGEBYSCORE with scores and a LIMIT clause
    pub async fn zrange_by_score_with_scores_limit(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
        offset: isize,
        count: isize,
    ) -> BrokerResult<Vec<(String, f64)>> {
        let entries: Vec<(String, f64)> = self
            .manager
            .zrangebyscore_limit_withscores(key, min, max, offset, count)
            .await?;
        Ok(entries)
    }

    /// ZREM a single member; true when the member existed
    pub async fn zrem(&mut self, key: &str, member: &str) -> BrokerResult<bool> {
        let removed: i64 = self.manager.zrem(key, member).await?;
        Ok(removed > 0)
    }

    /// ZCARD
    pub async fn zcard(&mut self, key: &str) -> BrokerResult<i64> {
        let cardinality: i64 = self.manager.zcard(key).await?;
        Ok(cardinality)
    }

    /// ZREMRANGEBYSCORE, inclusive on both ends; returns the removed count
    pub async fn zrem_range_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> BrokerResult<i64> {
        let removed: i64 = self.manager.zrembyscore(key, min, max).await?;
        Ok(removed)
    }

    /// EXPIRE: refresh a key's TTL; true when the key exists
    pub async fn expire(&mut self, key: &str, ttl: Duration) -> BrokerResult<bool> {
        let set: bool = self.manager.expire(key, ttl.as_secs() as i64).await?;
        Ok(set)
    }

    /// LLEN (inspection)
    pub async fn list_len(&mut self, list: &str) -> BrokerResult<i64> {
        let len: i64 = self.manager.llen(list).await?;
        Ok(len)
    }

    /// LRANGE (inspection)
    pub async fn list_range(
        &mut self,
        list: &str,
        start: isize,
        stop: isize,
    ) -> BrokerResult<Vec<String>> {
        let values: Vec<String> = self.manager.lrange(list, start, stop).await?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against a local broker and pass trivially when none is
    // reachable, so `cargo test` works on machines without Redis.
    async fn test_pool() -> Option<RedisPool> {
        RedisPool::connect(BrokerConfig::default()).await.ok()
    }

    #[tokio::test]
    async fn test_list_push_and_pop_order() {
        if let Some(pool) = test_pool().await {
            let mut conn = pool.get();
            let list = format!("cronnect:test:list:{}", uuid::Uuid::new_v4());

            conn.push_head(&list, "first").await.unwrap();
            conn.push_head(&list, "second").await.unwrap();

            // Workers consume the tail, so publish order is preserved
            let popped = conn
                .pop_tail_blocking(&list, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(popped, Some((list.clone(), "first".to_string())));

            let popped = conn
                .pop_tail_blocking(&list, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(popped, Some((list.clone(), "second".to_string())));

            conn.del(&list).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_blocking_pop_timeout_returns_none() {
        if let Some(pool) = test_pool().await {
            let mut conn = pool.get();
            let list = format!("cronnect:test:empty:{}", uuid::Uuid::new_v4());

            let popped = conn
                .pop_tail_blocking(&list, Duration::from_secs(1))
                .await
                .unwrap();
            assert!(popped.is_none());
        }
    }

    #[tokio::test]
    async fn test_key_ttl_and_exists() {
        if let Some(pool) = test_pool().await {
            let mut conn = pool.get();
            let key = format!("cronnect:test:key:{}", uuid::Uuid::new_v4());

            assert!(!conn.exists(&key).await.unwrap());

            conn.set_with_ttl(&key, "value", Duration::from_secs(60)).await.unwrap();
            assert!(conn.exists(&key).await.unwrap());

            assert!(conn.del(&key).await.unwrap());
            assert!(!conn.exists(&key).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_sorted_set_range_and_remove() {
        if let Some(pool) = test_pool().await {
            let mut conn = pool.get();
            let key = format!("cronnect:test:zset:{}", uuid::Uuid::new_v4());

            conn.zadd(&key, 10.0, "early").await.unwrap();
            conn.zadd(&key, 20.0, "late").await.unwrap();
            assert_eq!(conn.zcard(&key).await.unwrap(), 2);

            let due = conn.zrange_by_score_with_scores(&key, 0.0, 15.0).await.unwrap();
            assert_eq!(due, vec![("early".to_string(), 10.0)]);

            assert!(conn.zrem(&key, "early").await.unwrap());
            assert_eq!(conn.zcard(&key).await.unwrap(), 1);

            let removed = conn.zrem_range_by_score(&key, 0.0, 30.0).await.unwrap();
            assert_eq!(removed, 1);

            conn.del(&key).await.unwrap();
        }
    }
}
