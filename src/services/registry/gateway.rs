use std::future::Future;

use super::error::RegistryError;
use super::types::{Instance, Registration, WatchStream};

/// 对外部注册中心的最小操作集合
pub trait RegistryGateway: Send + Sync + 'static {
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn deregister(&self, instance_id: &str)
    -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// 一次性查询当前成员，不做健康过滤
    fn list_instances(
        &self,
        service_name: &str,
    ) -> impl Future<Output = Result<Vec<Instance>, RegistryError>> + Send;

    /// 开始监听某个服务名的成员变化。
    ///
    /// 返回的流在两次变化之间阻塞，每次变化推送一份完整快照。
    fn watch_changes(&self, service_name: &str) -> WatchStream;
}
