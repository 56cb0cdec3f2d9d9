#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use service_discovery::services::registry::{
    HealthCheck, HealthStatus, Instance, Notification, Registration, RegistryError,
    RegistryGateway, ServiceEntry, WatchStream,
};

type WatchSender = mpsc::UnboundedSender<Result<Notification, RegistryError>>;

/// 内存中的注册中心网关，记录调用次数并允许测试手动推送监听通知
#[derive(Default)]
pub struct FakeGateway {
    pub list_calls: AtomicUsize,
    pub watch_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub deregister_calls: AtomicUsize,
    list_delay: Mutex<Option<Duration>>,
    list_failure: Mutex<Option<String>>,
    write_failure: Mutex<Option<String>>,
    members: Mutex<HashMap<String, Vec<Instance>>>,
    watchers: Mutex<HashMap<String, Vec<WatchSender>>>,
    pub registrations: Mutex<Vec<Registration>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(self, service_name: &str, members: Vec<Instance>) -> Self {
        self.members
            .lock()
            .unwrap()
            .insert(service_name.to_string(), members);
        self
    }

    pub fn with_list_delay(self, delay: Duration) -> Self {
        *self.list_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fail_list(&self, reason: Option<&str>) {
        *self.list_failure.lock().unwrap() = reason.map(str::to_string);
    }

    pub fn fail_writes(&self, reason: Option<&str>) {
        *self.write_failure.lock().unwrap() = reason.map(str::to_string);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// 向某服务名的所有监听者推送一条通知，返回送达的监听者数量
    pub fn notify(&self, service_name: &str, notification: Notification) -> usize {
        self.push(service_name, || Ok(notification.clone()))
    }

    pub fn fail_watch(&self, service_name: &str, reason: &str) -> usize {
        self.push(service_name, || {
            Err(RegistryError::Unavailable(reason.to_string()))
        })
    }

    /// 关闭某服务名当前的所有监听流，返回关闭的数量
    pub fn close_watches(&self, service_name: &str) -> usize {
        self.watchers
            .lock()
            .unwrap()
            .remove(service_name)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }

    fn push<F>(&self, service_name: &str, make: F) -> usize
    where
        F: Fn() -> Result<Notification, RegistryError>,
    {
        let watchers = self.watchers.lock().unwrap();
        watchers
            .get(service_name)
            .map(|senders| senders.iter().filter(|tx| tx.send(make()).is_ok()).count())
            .unwrap_or(0)
    }

    fn write_result(&self) -> Result<(), RegistryError> {
        match self.write_failure.lock().unwrap().clone() {
            Some(reason) => Err(RegistryError::Unavailable(reason)),
            None => Ok(()),
        }
    }
}

impl RegistryGateway for FakeGateway {
    async fn register(&self, registration: &Registration) -> Result<(), RegistryError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.write_result()?;
        self.registrations.lock().unwrap().push(registration.clone());
        Ok(())
    }

    async fn deregister(&self, _instance_id: &str) -> Result<(), RegistryError> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        self.write_result()
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<Instance>, RegistryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.list_failure.lock().unwrap().clone();
        if let Some(reason) = failure {
            return Err(RegistryError::Unavailable(reason));
        }

        Ok(self
            .members
            .lock()
            .unwrap()
            .get(service_name)
            .cloned()
            .unwrap_or_default())
    }

    fn watch_changes(&self, service_name: &str) -> WatchStream {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers
            .lock()
            .unwrap()
            .entry(service_name.to_string())
            .or_default()
            .push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

pub fn instance(service_name: &str, id: &str, port: u16) -> Instance {
    Instance {
        id: id.to_string(),
        service_name: service_name.to_string(),
        host: "10.0.0.1".to_string(),
        port,
        metadata: HashMap::new(),
    }
}

pub fn entry(instance: Instance, status: HealthStatus) -> ServiceEntry {
    ServiceEntry {
        checks: vec![HealthCheck {
            check_id: format!("service:{}", instance.id),
            status,
        }],
        instance,
    }
}

pub fn ids(instances: &[Instance]) -> Vec<String> {
    let mut ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();
    ids.sort();
    ids
}

/// 轮询直到条件成立或超时
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
