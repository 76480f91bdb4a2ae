//! 运行配置组装
//!
//! 从内嵌默认配置出发，依次叠加管理员的不受支持覆盖和上一轮观察到的配置，
//! 再把依赖对象的内容哈希写入 ConfigMap 的 data。依赖内容一变，ConfigMap 随之变化，
//! 进而驱动工作负载重新部署。

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use svcat_common::util::content_hash;
use svcat_common::{Error, Result};
use tracing::{debug, info};

use crate::assets::{self, CONFIG_KEY};
use crate::client::ClusterClient;
use crate::crd::ServiceCatalogControllerManager;

/// 被哈希的依赖对象引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRef {
    ConfigMap { namespace: String, name: String },
    Secret { namespace: String, name: String },
}

impl ObjectRef {
    pub fn config_map(namespace: &str, name: &str) -> Self {
        ObjectRef::ConfigMap {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn secret(namespace: &str, name: &str) -> Self {
        ObjectRef::Secret {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// 写入 data 时使用的键，形如 `configmaps.<namespace>.<name>`
    pub fn key(&self) -> String {
        match self {
            ObjectRef::ConfigMap { namespace, name } => format!("configmaps.{}.{}", namespace, name),
            ObjectRef::Secret { namespace, name } => format!("secrets.{}.{}", namespace, name),
        }
    }

    fn missing(&self) -> Error {
        let (kind, namespace, name) = match self {
            ObjectRef::ConfigMap { namespace, name } => ("configmap", namespace, name),
            ObjectRef::Secret { namespace, name } => ("secret", namespace, name),
        };
        Error::Resolution {
            kind: kind.to_string(),
            namespace: namespace.clone(),
            name: name.clone(),
        }
    }
}

fn parse_layer(raw: &Json, layer: &str) -> Result<Map<String, Json>> {
    match raw {
        Json::Object(map) => Ok(map.clone()),
        other => Err(Error::Merge(format!(
            "{} must be a mapping, got {}",
            layer,
            json_type(other)
        ))),
    }
}

fn json_type(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "mapping",
    }
}

/// 递归合并：两侧都是映射时逐键合并，否则补丁一侧覆盖
fn merge_into(base: &mut Map<String, Json>, patch: Map<String, Json>) {
    for (key, value) in patch {
        match value {
            Json::Object(incoming) => match base.get_mut(&key) {
                Some(Json::Object(existing)) => merge_into(existing, incoming),
                _ => {
                    base.insert(key, Json::Object(incoming));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// 合并默认配置与各层补丁，后面的层在冲突键上胜出
///
/// 缺失或为 null 的层被跳过。
pub fn merge_config(default_yaml: &str, layers: &[Option<&Json>]) -> Result<Json> {
    let default: serde_yaml::Value = serde_yaml::from_str(default_yaml)
        .map_err(|e| Error::Merge(format!("default config: {}", e)))?;
    let default = serde_json::to_value(default).map_err(|e| Error::Merge(format!("default config: {}", e)))?;
    let mut merged = parse_layer(&default, "default config")?;

    for (idx, layer) in layers.iter().enumerate() {
        match layer {
            None | Some(Json::Null) => continue,
            Some(raw) => {
                let patch = parse_layer(raw, &format!("config layer {}", idx + 1))?;
                merge_into(&mut merged, patch);
            }
        }
    }

    Ok(Json::Object(merged))
}

/// 计算依赖对象的内容哈希，任何一个不存在都返回 `Error::Resolution`
pub async fn object_hashes(client: &dyn ClusterClient, refs: &[ObjectRef]) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();

    for obj in refs {
        let hash = match obj {
            ObjectRef::ConfigMap { namespace, name } => {
                let cm = client.get_config_map(namespace, name).await?.ok_or_else(|| obj.missing())?;
                content_hash(&(cm.data, cm.binary_data))?
            }
            ObjectRef::Secret { namespace, name } => {
                let secret = client.get_secret(namespace, name).await?.ok_or_else(|| obj.missing())?;
                content_hash(&secret.data)?
            }
        };
        debug!(key = %obj.key(), hash = %hash, "已计算依赖哈希");
        hashes.insert(obj.key(), hash);
    }

    Ok(hashes)
}

/// 组装需要写入的 ConfigMap
pub async fn required_config_map(
    client: &dyn ClusterClient,
    record: &ServiceCatalogControllerManager,
    dependencies: &[ObjectRef],
) -> Result<ConfigMap> {
    let mut required: ConfigMap = assets::read_typed(assets::CONFIG_MAP_ASSET)?;
    let merged = merge_config(
        assets::asset(assets::DEFAULT_CONFIG_ASSET)?,
        &[
            record.spec.unsupported_config_overrides.as_ref(),
            record.spec.observed_config.as_ref(),
        ],
    )?;

    let hashes = object_hashes(client, dependencies).await?;

    let data = required.data.get_or_insert_with(BTreeMap::new);
    data.insert(CONFIG_KEY.to_string(), serde_json::to_string(&merged)?);
    data.extend(hashes);

    Ok(required)
}

/// 组装并写入运行配置，返回写入后的对象与内容是否变化
pub async fn manage_config_map(
    client: &dyn ClusterClient,
    record: &ServiceCatalogControllerManager,
    dependencies: &[ObjectRef],
) -> Result<(ConfigMap, bool)> {
    let required = required_config_map(client, record, dependencies).await?;
    let namespace = required.metadata.namespace.clone().unwrap_or_default();
    let name = required.metadata.name.clone().unwrap_or_default();

    if let Some(existing) = client.get_config_map(&namespace, &name).await? {
        if existing.data == required.data && existing.binary_data == required.binary_data {
            return Ok((existing, false));
        }
    }

    let written = client.put_config_map(&required).await?;
    info!(configmap = %format!("{}/{}", namespace, name), "运行配置已更新");
    Ok((written, true))
}
