//! 工作负载发布
//!
//! 从内嵌模板生成期望的 DaemonSet：覆盖镜像，追加 `-v=N` 参数。
//! 需要强制发布时，在 Pod 模板上写入新的标记注解，即使模板其余部分完全相同，
//! 平台也会滚动更新 Pod。

use k8s_openapi::api::apps::v1::DaemonSet;
use std::collections::BTreeMap;
use svcat_common::{Error, LogLevel, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assets;
use crate::client::ClusterClient;
use crate::crd::ServiceCatalogControllerManager;

/// Pod 模板上的强制发布标记
pub const FORCE_ANNOTATION: &str = "operator.svcat.io/force";
/// 对象上记录的镜像
pub const PULL_SPEC_ANNOTATION: &str = "operator.svcat.io/pull-spec";

/// 一次发布请求
#[derive(Debug, Clone, Default)]
pub struct RolloutRequest {
    /// 外部提供的镜像，空字符串表示沿用模板
    pub image_pull_spec: String,
    pub log_level: Option<LogLevel>,
    /// 账本中记录的代数
    pub expected_generation: Option<i64>,
    pub force: bool,
}

/// 是否需要强制发布
pub fn should_force(
    requested: bool,
    record: &ServiceCatalogControllerManager,
    config_changed: bool,
    ca_changed: bool,
) -> bool {
    requested || record.generation() != record.observed_generation() || config_changed || ca_changed
}

/// 根据模板生成期望的 DaemonSet
pub fn required_daemon_set(image_pull_spec: &str, log_level: Option<LogLevel>) -> Result<DaemonSet> {
    let mut required: DaemonSet = assets::read_typed(assets::DAEMON_SET_ASSET)
        .map_err(|e| Error::Rollout(format!("unable to load workload template: {}", e)))?;

    let container = required
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .and_then(|p| p.containers.first_mut())
        .ok_or_else(|| Error::Rollout("workload template has no container".to_string()))?;

    if !image_pull_spec.is_empty() {
        container.image = Some(image_pull_spec.to_string());
    }
    container
        .args
        .get_or_insert_with(Vec::new)
        .push(format!("-v={}", LogLevel::verbosity_of(log_level)));

    let image = container.image.clone().unwrap_or_default();
    required
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(PULL_SPEC_ANNOTATION.to_string(), image);

    Ok(required)
}

fn template_annotations(ds: &mut DaemonSet) -> Option<&mut BTreeMap<String, String>> {
    ds.spec.as_mut().map(|s| {
        s.template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
    })
}

fn force_marker(ds: &DaemonSet) -> Option<String> {
    ds.spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(FORCE_ANNOTATION).cloned())
}

/// 应用工作负载，返回写入后的对象与是否发生了写入
///
/// 不强制发布且线上代数等于账本记录时不做任何写入。
pub async fn manage_daemon_set(client: &dyn ClusterClient, request: &RolloutRequest) -> Result<(DaemonSet, bool)> {
    let mut required = required_daemon_set(&request.image_pull_spec, request.log_level)?;
    let namespace = required.metadata.namespace.clone().unwrap_or_default();
    let name = required.metadata.name.clone().unwrap_or_default();

    let existing = client
        .get_daemon_set(&namespace, &name)
        .await
        .map_err(|e| Error::Rollout(e.to_string()))?;

    if let Some(existing) = &existing {
        let live_generation = existing.metadata.generation;
        if !request.force && live_generation.is_some() && live_generation == request.expected_generation {
            debug!(daemonset = %name, generation = ?live_generation, "工作负载无需更新");
            return Ok((existing.clone(), false));
        }
    }

    let marker = if request.force {
        Some(Uuid::new_v4().to_string())
    } else {
        existing.as_ref().and_then(force_marker)
    };
    if let (Some(marker), Some(annotations)) = (marker, template_annotations(&mut required)) {
        annotations.insert(FORCE_ANNOTATION.to_string(), marker);
    }

    let written = client
        .put_daemon_set(&required)
        .await
        .map_err(|e| Error::Rollout(e.to_string()))?;

    info!(
        daemonset = %format!("{}/{}", namespace, name),
        generation = ?written.metadata.generation,
        forced = request.force,
        "工作负载已应用"
    );
    Ok((written, true))
}
