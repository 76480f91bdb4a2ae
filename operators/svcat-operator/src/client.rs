//! 集群访问接口
//!
//! 同步周期只通过这里的 trait 访问集群，生产实现见 [`crate::kube_client`]，
//! 测试中使用内存实现替换。

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use svcat_common::Result;

use crate::assets::Manifest;
use crate::crd::ServiceCatalogControllerManager;

/// 受管集群的资源操作
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// 创建或更新一份静态资源定义，返回内容是否发生变化
    async fn apply_manifest(&self, manifest: &Manifest) -> Result<bool>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// 创建或替换 ConfigMap
    async fn put_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>>;

    /// 创建或替换 DaemonSet，返回服务端写入后的对象
    async fn put_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet>;

    /// 删除命名空间，不存在时视为成功
    async fn delete_namespace(&self, name: &str) -> Result<()>;
}

/// 期望状态对象的存取
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OperatorConfigStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<ServiceCatalogControllerManager>;

    /// 写回 status，写入冲突返回 `Error::PersistenceConflict`
    async fn update_status(
        &self,
        record: &ServiceCatalogControllerManager,
    ) -> Result<ServiceCatalogControllerManager>;
}
