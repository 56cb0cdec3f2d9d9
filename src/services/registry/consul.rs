use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};

use super::error::RegistryError;
use super::gateway::RegistryGateway;
use super::types::{
    HealthCheck, HealthStatus, Instance, Notification, Registration, ServiceEntry, WatchStream,
};
pub use crate::config::ConsulConfig;

// 健康检查探测间隔
pub const HEALTH_CHECK_INTERVAL: &str = "15s";
// 持续失败多久后由注册中心自动摘除实例
pub const DEREGISTER_CRITICAL_AFTER: &str = "30s";

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// 基于 Consul agent HTTP API 的注册中心网关
#[derive(Debug, Clone)]
pub struct ConsulGateway {
    client: Client,
    base_url: Url,
    token: Option<String>,
    datacenter: Option<String>,
    request_timeout: Duration,
    watch_wait: Duration,
}

impl ConsulGateway {
    pub fn new(config: &ConsulConfig, watch_wait: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;

        let base_url = Url::parse(&config.base_url())
            .map_err(|e| RegistryError::InvalidAddress(format!("{}: {}", config.base_url(), e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidAddress(config.base_url()));
        }

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            datacenter: config.datacenter.clone(),
            request_timeout: config.request_timeout(),
            watch_wait,
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = match &self.token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        };
        match &self.datacenter {
            Some(dc) => builder.query(&[("dc", dc)]),
            None => builder,
        }
    }

    async fn check_status(response: Response) -> Result<Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RegistryError::Status {
            status: status.as_u16(),
            body,
        })
    }

    // 逐段拼接路径，服务名和实例 id 中的 `/`、`?`、`#` 会被转义
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn health_url(&self, service_name: &str) -> Url {
        self.endpoint(&["v1", "health", "service", service_name])
    }

    // Consul 会给阻塞查询附加最多 wait/16 的随机抖动
    fn blocking_timeout(&self) -> Duration {
        self.watch_wait + self.watch_wait / 16 + self.request_timeout
    }

    // 阻塞查询：index 为 0 时立即返回，否则等待变化或 wait 超时
    async fn blocking_query(
        &self,
        service_name: &str,
        index: u64,
    ) -> Result<(u64, String), RegistryError> {
        let wait = format!("{}s", self.watch_wait.as_secs());
        let builder = self
            .client
            .get(self.health_url(service_name))
            .query(&[("index", index.to_string()), ("wait", wait)])
            .timeout(self.blocking_timeout());

        let response = Self::check_status(self.request(builder).send().await?).await?;
        // 没有索引就无法阻塞，交给监听任务退避重试
        let new_index = response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| {
                RegistryError::Decode(format!("response is missing a valid {INDEX_HEADER} header"))
            })?;
        let body = response.text().await?;
        Ok((new_index, body))
    }
}

impl RegistryGateway for ConsulGateway {
    async fn register(&self, registration: &Registration) -> Result<(), RegistryError> {
        let body = AgentServiceRegistration {
            id: &registration.instance_id,
            name: &registration.service_name,
            address: &registration.host,
            port: registration.port,
            meta: &registration.metadata,
            check: AgentServiceCheck {
                http: registration.health_check_url(),
                interval: HEALTH_CHECK_INTERVAL,
                deregister_critical_service_after: DEREGISTER_CRITICAL_AFTER,
            },
        };

        let builder = self
            .client
            .put(self.endpoint(&["v1", "agent", "service", "register"]))
            .json(&body)
            .timeout(self.request_timeout);
        Self::check_status(self.request(builder).send().await?).await?;
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        let builder = self
            .client
            .put(self.endpoint(&["v1", "agent", "service", "deregister", instance_id]))
            .timeout(self.request_timeout);
        Self::check_status(self.request(builder).send().await?).await?;
        Ok(())
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<Instance>, RegistryError> {
        let builder = self
            .client
            .get(self.health_url(service_name))
            .timeout(self.request_timeout);
        let response = Self::check_status(self.request(builder).send().await?).await?;
        let body = response.text().await?;

        let entries: Option<Vec<ConsulServiceEntry>> =
            serde_json::from_str(&body).map_err(|e| RegistryError::Decode(e.to_string()))?;

        Ok(entries
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.into_service_entry().instance)
            .collect())
    }

    fn watch_changes(&self, service_name: &str) -> WatchStream {
        let state = WatchState {
            gateway: self.clone(),
            service_name: service_name.to_string(),
            index: 0,
            delivered: false,
        };

        Box::pin(futures::stream::unfold(state, |mut state| async move {
            loop {
                let (new_index, body) =
                    match state.gateway.blocking_query(&state.service_name, state.index).await {
                        Ok(result) => result,
                        Err(e) => return Some((Err(e), state)),
                    };

                let previous = state.index;
                // 索引回退时重新拉取全量；索引至少为 1，否则查询不会阻塞
                state.index = if new_index < previous { 1 } else { new_index.max(1) };

                // 索引未变化说明只是 wait 超时
                if state.delivered && new_index == previous {
                    continue;
                }
                state.delivered = true;

                return Some((Ok(decode_notification(new_index, &body)), state));
            }
        }))
    }
}

struct WatchState {
    gateway: ConsulGateway,
    service_name: String,
    index: u64,
    delivered: bool,
}

fn decode_notification(index: u64, body: &str) -> Notification {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            return Notification::Malformed {
                reason: e.to_string(),
            };
        }
    };

    if value.is_null() {
        return Notification::Nil;
    }

    match serde_json::from_value::<Vec<ConsulServiceEntry>>(value) {
        Ok(entries) => Notification::Snapshot {
            index,
            entries: entries
                .into_iter()
                .map(ConsulServiceEntry::into_service_entry)
                .collect(),
        },
        Err(e) => Notification::Malformed {
            reason: e.to_string(),
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    meta: &'a HashMap<String, String>,
    check: AgentServiceCheck,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "HTTP")]
    http: String,
    interval: &'static str,
    deregister_critical_service_after: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulServiceEntry {
    #[serde(default)]
    node: Option<ConsulNode>,
    service: ConsulService,
    #[serde(default)]
    checks: Option<Vec<ConsulCheck>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulNode {
    #[serde(default)]
    address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulCheck {
    #[serde(rename = "CheckID")]
    check_id: String,
    status: String,
}

impl ConsulCheck {
    fn status(&self) -> HealthStatus {
        if self.check_id == "_node_maintenance"
            || self.check_id.starts_with("_service_maintenance:")
        {
            return HealthStatus::Maintenance;
        }
        HealthStatus::parse(&self.status)
    }
}

impl ConsulServiceEntry {
    fn into_service_entry(self) -> ServiceEntry {
        // 服务未声明地址时回落到节点地址
        let host = if self.service.address.is_empty() {
            self.node.map(|node| node.address).unwrap_or_default()
        } else {
            self.service.address
        };

        let checks = self
            .checks
            .unwrap_or_default()
            .into_iter()
            .map(|check| HealthCheck {
                status: check.status(),
                check_id: check.check_id,
            })
            .collect();

        ServiceEntry {
            instance: Instance {
                id: self.service.id,
                service_name: self.service.service,
                host,
                port: self.service.port,
                metadata: self.service.meta.unwrap_or_default(),
            },
            checks,
        }
    }
}
