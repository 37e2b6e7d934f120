use redis::RedisResult;
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Takes a named lease for `ttl_seconds` if nobody holds it.
    /// The lease is never released early; it simply expires.
    pub async fn acquire_lease(&self, name: &str, holder: &str, ttl_seconds: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("lease:{}", name);

        // SET NX: only set if key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(holder)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await?;

        debug!(lease = %key, acquired = result.is_some(), "lease attempt");
        Ok(result.is_some())
    }
}
