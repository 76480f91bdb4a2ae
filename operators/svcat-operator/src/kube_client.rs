//! kube-rs 实现
//!
//! 使用服务端应用（SSA）写入资源，字段管理者固定为 `svcat-operator`。
//! 静态清单通过 API 发现解析为 `DynamicObject` 后应用，
//! 应用前后比较 `resourceVersion` 判断是否发生变化。

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    core::{DynamicObject, GroupVersionKind},
    discovery::{self, Scope},
    Client, ResourceExt,
};
use serde_json::Value as Json;
use svcat_common::{Error, Result};
use tracing::{debug, info};

use crate::assets::Manifest;
use crate::client::{ClusterClient, OperatorConfigStore};
use crate::crd::ServiceCatalogControllerManager;

/// SSA 字段管理者
pub const FIELD_MANAGER: &str = "svcat-operator";

fn apply_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER).force()
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == code)
}

/// 解析清单的 GVK、名称与命名空间
fn parse_target(json: &Json) -> Result<(GroupVersionKind, String, Option<String>)> {
    let api_version = json
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Apply("manifest missing apiVersion".to_string()))?;
    let kind = json
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Apply("manifest missing kind".to_string()))?;
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    let metadata = json.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Apply("manifest missing metadata.name".to_string()))?
        .to_string();
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok((GroupVersionKind::gvk(&group, &version, kind), name, namespace))
}

/// 基于 kube 客户端的集群访问实现
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn apply_manifest(&self, manifest: &Manifest) -> Result<bool> {
        let json = manifest.to_json()?;
        let (gvk, name, namespace) = parse_target(&json)?;
        let (ar, caps) = discovery::pinned_kind(&self.client, &gvk).await?;

        let api: Api<DynamicObject> = match (caps.scope, namespace.as_deref()) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            (Scope::Namespaced, None) => {
                return Err(Error::Apply(format!("{} requires a namespace", manifest.path)))
            }
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &ar),
        };

        let before = api.get_opt(&name).await?.and_then(|o| o.resource_version());
        let applied = api.patch(&name, &apply_params(), &Patch::Apply(&json)).await?;
        let changed = before != applied.resource_version();

        debug!(manifest = %manifest.path, changed, "已应用静态资源");
        Ok(changed)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn put_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let namespace = config_map.namespace().unwrap_or_default();
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.patch(&config_map.name_any(), &apply_params(), &Patch::Apply(config_map)).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn put_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let namespace = daemon_set.namespace().unwrap_or_default();
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.patch(&daemon_set.name_any(), &apply_params(), &Patch::Apply(daemon_set)).await?)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = name, "已请求删除命名空间");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 基于 kube 客户端的期望状态对象存取
#[derive(Clone)]
pub struct KubeOperatorConfigStore {
    api: Api<ServiceCatalogControllerManager>,
}

impl KubeOperatorConfigStore {
    pub fn new(client: Client) -> Self {
        Self { api: Api::all(client) }
    }
}

#[async_trait]
impl OperatorConfigStore for KubeOperatorConfigStore {
    async fn get(&self, name: &str) -> Result<ServiceCatalogControllerManager> {
        Ok(self.api.get(name).await?)
    }

    async fn update_status(
        &self,
        record: &ServiceCatalogControllerManager,
    ) -> Result<ServiceCatalogControllerManager> {
        let name = record.name_any();
        let data = serde_json::to_vec(record)?;
        match self.api.replace_status(&name, &PostParams::default(), data).await {
            Ok(updated) => Ok(updated),
            Err(e) if is_status(&e, 409) => Err(Error::PersistenceConflict(format!(
                "servicecatalogcontrollermanagers/{}",
                name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
