//! 测试用内存集群

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use svcat_common::{Error, Result};

use crate::assets::Manifest;
use crate::client::ClusterClient;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    manifests: HashMap<String, String>,
    manifest_attempts: Vec<String>,
    failing_manifests: HashSet<String>,
    apply_delay: Option<Duration>,
    config_maps: BTreeMap<Key, ConfigMap>,
    secrets: BTreeMap<Key, Secret>,
    daemon_sets: BTreeMap<Key, DaemonSet>,
    ready: i32,
    rollout_lag: bool,
    fail_daemon_set: bool,
    fail_namespace_delete: bool,
    deleted_namespaces: Vec<String>,
    config_map_writes: usize,
    daemon_set_writes: usize,
}

/// 内存中的 `ClusterClient`，DaemonSet 的 spec 变化时递增代数
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail_manifest(&self, path: &str) {
        self.state().failing_manifests.insert(path.to_string());
    }

    /// 每次应用清单前等待的时间
    pub fn delay_manifests(&self, delay: Duration) {
        self.state().apply_delay = Some(delay);
    }

    /// 丢弃已应用的内容，下次应用该清单会报告变化
    pub fn forget_manifest(&self, path: &str) {
        self.state().manifests.remove(path);
    }

    pub fn manifest_attempts(&self) -> Vec<String> {
        self.state().manifest_attempts.clone()
    }

    pub fn insert_config_map(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        };
        self.state().config_maps.insert(key(namespace, name), cm);
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        self.state().secrets.insert(key(namespace, name), secret);
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state().config_maps.get(&key(namespace, name)).cloned()
    }

    pub fn daemon_set(&self, namespace: &str, name: &str) -> Option<DaemonSet> {
        self.state().daemon_sets.get(&key(namespace, name)).cloned()
    }

    /// 设置所有 DaemonSet 的可用实例数
    pub fn set_ready(&self, ready: i32) {
        let mut state = self.state();
        state.ready = ready;
        for ds in state.daemon_sets.values_mut() {
            if let Some(status) = ds.status.as_mut() {
                status.number_available = Some(ready);
            }
        }
    }

    /// 之后写入的 DaemonSet 不会被立即观察到
    pub fn lag_rollouts(&self) {
        self.state().rollout_lag = true;
    }

    pub fn fail_daemon_set_writes(&self) {
        self.state().fail_daemon_set = true;
    }

    pub fn fail_namespace_delete(&self) {
        self.state().fail_namespace_delete = true;
    }

    pub fn deleted_namespaces(&self) -> Vec<String> {
        self.state().deleted_namespaces.clone()
    }

    pub fn config_map_writes(&self) -> usize {
        self.state().config_map_writes
    }

    pub fn daemon_set_writes(&self) -> usize {
        self.state().daemon_set_writes
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn apply_manifest(&self, manifest: &Manifest) -> Result<bool> {
        let delay = self.state().apply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.manifest_attempts.push(manifest.path.clone());
        if state.failing_manifests.contains(&manifest.path) {
            return Err(Error::Apply(format!("admission webhook denied {}", manifest.path)));
        }

        let previous = state.manifests.insert(manifest.path.clone(), manifest.content.clone());
        Ok(previous.as_deref() != Some(manifest.content.as_str()))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.config_map(namespace, name))
    }

    async fn put_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let namespace = config_map.metadata.namespace.clone().unwrap_or_default();
        let name = config_map.metadata.name.clone().unwrap_or_default();
        let mut state = self.state();
        state.config_map_writes += 1;
        state.config_maps.insert(key(&namespace, &name), config_map.clone());
        Ok(config_map.clone())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.state().secrets.get(&key(namespace, name)).cloned())
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        Ok(self.daemon_set(namespace, name))
    }

    async fn put_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let mut state = self.state();
        if state.fail_daemon_set {
            return Err(Error::Apply("daemonsets.apps is forbidden".to_string()));
        }

        let id = key(
            daemon_set.metadata.namespace.as_deref().unwrap_or_default(),
            daemon_set.metadata.name.as_deref().unwrap_or_default(),
        );
        let (generation, observed) = match state.daemon_sets.get(&id) {
            Some(existing) => {
                let current = existing.metadata.generation.unwrap_or_default();
                let observed = existing.status.as_ref().and_then(|s| s.observed_generation);
                if existing.spec == daemon_set.spec {
                    (current, observed)
                } else {
                    (current + 1, observed)
                }
            }
            None => (1, None),
        };

        let mut written = daemon_set.clone();
        written.metadata.generation = Some(generation);
        written.status = Some(DaemonSetStatus {
            observed_generation: if state.rollout_lag { observed } else { Some(generation) },
            number_available: Some(state.ready),
            ..Default::default()
        });

        state.daemon_set_writes += 1;
        state.daemon_sets.insert(id, written.clone());
        Ok(written)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_namespace_delete {
            return Err(Error::Apply(format!("namespaces \"{}\" is forbidden", name)));
        }

        state.config_maps.retain(|(ns, _), _| ns != name);
        state.secrets.retain(|(ns, _), _| ns != name);
        state.daemon_sets.retain(|(ns, _), _| ns != name);
        state.deleted_namespaces.push(name.to_string());
        Ok(())
    }
}
