use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use super::error::RegistryError;

// 服务实例：服务的一个运行副本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub metadata: HashMap<String, String>,
}

impl Instance {
    /// `host:port` 形式的地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// 健康检查状态，按严重程度从低到高排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
    Maintenance,
}

impl HealthStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "passing" => HealthStatus::Passing,
            "warning" => HealthStatus::Warning,
            "maintenance" => HealthStatus::Maintenance,
            // 未知状态一律视为不健康
            _ => HealthStatus::Critical,
        }
    }
}

// 实例上挂载的一个健康检查
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub check_id: String,
    pub status: HealthStatus,
}

/// 注册中心返回的一条成员记录：实例本身加上它的健康检查
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub instance: Instance,
    pub checks: Vec<HealthCheck>,
}

impl ServiceEntry {
    /// 汇总所有检查得出单一状态。
    ///
    /// 维护模式优先于 critical，critical 优先于 warning；没有任何检查时为 passing。
    pub fn aggregated_status(&self) -> HealthStatus {
        self.checks
            .iter()
            .map(|check| check.status)
            .max()
            .unwrap_or(HealthStatus::Passing)
    }

    pub fn is_passing(&self) -> bool {
        self.aggregated_status() == HealthStatus::Passing
    }
}

// 一次监听推送的内容
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// 完整的成员快照
    Snapshot {
        index: u64,
        entries: Vec<ServiceEntry>,
    },
    /// 注册中心推送了空载荷
    Nil,
    /// 载荷不是合法的实例列表
    Malformed { reason: String },
}

/// 服务注册请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub service_name: String,
    pub instance_id: String,
    pub health_check_path: String,
    pub host: String,
    pub port: u16,
    pub metadata: HashMap<String, String>,
}

impl Registration {
    /// 健康检查地址：`http://host:port/path`
    pub fn health_check_url(&self) -> String {
        let path = self.health_check_path.trim_start_matches('/');
        format!("http://{}:{}/{}", self.host, self.port, path)
    }
}

pub type WatchStream = Pin<Box<dyn Stream<Item = Result<Notification, RegistryError>> + Send>>;
