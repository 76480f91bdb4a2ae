//! 内嵌清单
//!
//! 所有静态资源定义在编译期嵌入二进制，以稳定的类路径字符串标识。
//! 同一个标识既用于应用，也用于判断是否属于触发重新部署的资源。

use serde_json::Value as Json;
use svcat_common::{Error, Result};

/// 工作负载所在命名空间
pub const OPERAND_NAMESPACE: &str = "openshift-svcat-controller-manager";
/// 工作负载 DaemonSet 名称
pub const WORKLOAD_NAME: &str = "controller-manager";
/// 运行配置 ConfigMap 名称
pub const CONFIG_MAP_NAME: &str = "config";
/// 运行配置在 ConfigMap 中的键
pub const CONFIG_KEY: &str = "config.yaml";

pub const CONFIG_MAP_ASSET: &str = "v3.11.0/openshift-svcat-controller-manager/cm.yaml";
pub const DEFAULT_CONFIG_ASSET: &str = "v3.11.0/openshift-svcat-controller-manager/defaultconfig.yaml";
pub const DAEMON_SET_ASSET: &str = "v3.11.0/openshift-svcat-controller-manager/ds.yaml";

macro_rules! asset {
    ($path:literal) => {
        ($path, include_str!(concat!("../manifests/", $path)))
    };
}

static ASSETS: &[(&str, &str)] = &[
    asset!("v3.11.0/openshift-svcat-controller-manager/ns.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/crb-catalog-controller.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/crb-controller-namespace-viewer-binding.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/cr-catalog-controller.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/rolebinding-cluster-info-configmap.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/rolebinding-configmap-accessor.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/role-cluster-info-configmap.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/role-configmap-accessor.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/sa.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/svc.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/servicemonitor-role.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/servicemonitor-rolebinding.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/cm.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/defaultconfig.yaml"),
    asset!("v3.11.0/openshift-svcat-controller-manager/ds.yaml"),
];

/// 每个周期按顺序直接应用的静态资源
pub const STATIC_MANIFESTS: &[&str] = &[
    "v3.11.0/openshift-svcat-controller-manager/ns.yaml",
    "v3.11.0/openshift-svcat-controller-manager/crb-catalog-controller.yaml",
    "v3.11.0/openshift-svcat-controller-manager/crb-controller-namespace-viewer-binding.yaml",
    "v3.11.0/openshift-svcat-controller-manager/cr-catalog-controller.yaml",
    "v3.11.0/openshift-svcat-controller-manager/rolebinding-cluster-info-configmap.yaml",
    "v3.11.0/openshift-svcat-controller-manager/rolebinding-configmap-accessor.yaml",
    "v3.11.0/openshift-svcat-controller-manager/role-cluster-info-configmap.yaml",
    "v3.11.0/openshift-svcat-controller-manager/role-configmap-accessor.yaml",
    "v3.11.0/openshift-svcat-controller-manager/sa.yaml",
    "v3.11.0/openshift-svcat-controller-manager/svc.yaml",
    "v3.11.0/openshift-svcat-controller-manager/servicemonitor-role.yaml",
    "v3.11.0/openshift-svcat-controller-manager/servicemonitor-rolebinding.yaml",
];

/// 发生变化时强制重新部署工作负载的资源
pub const FORCE_REDEPLOY_MANIFESTS: &[&str] = &["v3.11.0/openshift-svcat-controller-manager/sa.yaml"];

/// 一份静态资源定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// 稳定的类路径标识
    pub path: String,
    /// YAML 原文
    pub content: String,
}

impl Manifest {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// 从内嵌资源加载
    pub fn load(path: &str) -> Result<Self> {
        asset(path).map(|content| Self::new(path, content))
    }

    /// 解析为 JSON 文档
    pub fn to_json(&self) -> Result<Json> {
        let val: serde_yaml::Value = serde_yaml::from_str(&self.content)?;
        Ok(serde_json::to_value(val)?)
    }

    /// 资源类型，解析失败时为 `Unknown`
    pub fn kind(&self) -> String {
        self.to_json()
            .ok()
            .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(str::to_string))
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// 按标识读取内嵌资源
pub fn asset(path: &str) -> Result<&'static str> {
    ASSETS
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, content)| *content)
        .ok_or_else(|| Error::Apply(format!("asset {} not found", path)))
}

/// 按顺序加载全部静态资源
pub fn static_manifests() -> Result<Vec<Manifest>> {
    STATIC_MANIFESTS.iter().map(|p| Manifest::load(p)).collect()
}

/// 是否属于触发重新部署的资源
pub fn forces_redeploy(path: &str) -> bool {
    FORCE_REDEPLOY_MANIFESTS.contains(&path)
}

/// 读取内嵌 YAML 并反序列化为具体类型
pub fn read_typed<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    Ok(serde_yaml::from_str(asset(path)?)?)
}
