//! 客户端 CA 镜像
//!
//! apiserver 所在命名空间中的 CA 是权威来源，这里只负责把它复制到工作负载命名空间。
//! 目标对象不带 owner reference，删除期望状态对象后仍然保留，轮换不会丢失。

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use svcat_common::{Error, Result};
use tracing::info;

use crate::client::ClusterClient;

/// 同步一个 ConfigMap，返回目标内容是否发生变化
pub async fn sync_config_map(
    client: &dyn ClusterClient,
    source_namespace: &str,
    source_name: &str,
    target_namespace: &str,
    target_name: &str,
) -> Result<bool> {
    let source = client
        .get_config_map(source_namespace, source_name)
        .await?
        .ok_or_else(|| Error::Resolution {
            kind: "configmap".to_string(),
            namespace: source_namespace.to_string(),
            name: source_name.to_string(),
        })?;

    let existing = client.get_config_map(target_namespace, target_name).await?;
    if let Some(existing) = &existing {
        if existing.data == source.data && existing.binary_data == source.binary_data {
            return Ok(false);
        }
    }

    let required = ConfigMap {
        metadata: ObjectMeta {
            name: Some(target_name.to_string()),
            namespace: Some(target_namespace.to_string()),
            ..Default::default()
        },
        data: source.data,
        binary_data: source.binary_data,
        ..Default::default()
    };
    client.put_config_map(&required).await?;

    info!(
        source = %format!("{}/{}", source_namespace, source_name),
        target = %format!("{}/{}", target_namespace, target_name),
        "已同步客户端 CA"
    );
    Ok(true)
}
