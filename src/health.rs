//! Health Probe (spec.md §4.H): pings both backends and reports an
//! aggregate health record at `/health`.

use serde::Serialize;

use crate::client::ProxyState;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendHealth {
    fn ok() -> Self {
        Self {
            status: "OK",
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            status: "Error",
            error: Some(message),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    #[serde(rename = "sourceRedis")]
    pub source_redis: BackendHealth,
    #[serde(rename = "destinationRedis")]
    pub destination_redis: BackendHealth,
}

impl HealthReport {
    /// HTTP status the instrumentation server should respond with.
    pub fn http_status(&self) -> u16 {
        if self.source_redis.status == "OK" && self.destination_redis.status == "OK" {
            200
        } else {
            500
        }
    }
}

async fn ping(pool: &crate::pool::BackendPool) -> BackendHealth {
    match pool.acquire().await {
        Ok(mut conn) => match conn.do_cmd(&[b"PING"]).await {
            Ok(reply) if !reply.is_error() => BackendHealth::ok(),
            Ok(reply) => BackendHealth::err(
                reply
                    .error_text()
                    .unwrap_or("backend returned an error")
                    .to_string(),
            ),
            Err(e) => BackendHealth::err(e.to_string()),
        },
        Err(e) => BackendHealth::err(e.to_string()),
    }
}

pub async fn probe(state: &ProxyState) -> HealthReport {
    let (source_redis, destination_redis) =
        tokio::join!(ping(&state.source), ping(&state.destination));
    HealthReport {
        source_redis,
        destination_redis,
    }
}
