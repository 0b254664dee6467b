use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::EngineError;
use crate::metrics::{record_cache_hit, record_cache_miss};

use super::ResponseCache;

/// Redis-backed idempotency cache for graded submissions. A retried submit
/// with the same key gets the already-graded response instead of producing
/// a second audit record.
pub struct RedisResponseCache {
    redis: ConnectionManager,
}

impl RedisResponseCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let mut conn = self.redis.clone();
        let cached: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;

        match cached {
            Some(value) => {
                record_cache_hit();
                Ok(Some(value))
            }
            None => {
                record_cache_miss();
                Ok(None)
            }
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), EngineError> {
        let mut conn = self.redis.clone();
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
