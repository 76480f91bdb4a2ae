//! 同步周期
//!
//! 一个周期依次执行：静态资源应用、运行配置组装、客户端 CA 镜像、工作负载发布、状态汇总，
//! 最后在状态有变化时写回。前四步各自收集错误，不会提前中止周期。

use std::sync::Arc;

use k8s_openapi::api::apps::v1::DaemonSet;
use svcat_common::{expected_generation, Error, ManagementState, ObjectIdentity, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::apply::{self, ApplyResult};
use crate::assets::{self, OPERAND_NAMESPACE, WORKLOAD_NAME};
use crate::ca_mirror;
use crate::client::{ClusterClient, OperatorConfigStore};
use crate::config_composer::{self, ObjectRef};
use crate::crd::{ServiceCatalogControllerManager, ServiceCatalogControllerManagerStatus};
use crate::rollout::{self, RolloutRequest};
use crate::settings::OperatorSettings;
use crate::status::{self, CycleFacts, StepError};

const WORKLOAD: ObjectIdentity<'static> = ObjectIdentity {
    group: "apps",
    resource: "daemonsets",
    namespace: OPERAND_NAMESPACE,
    name: WORKLOAD_NAME,
};

/// 一个周期的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// 有子步骤失败，需要尽快重新调度
    pub needs_retry: bool,
    /// 本周期写回了 status
    pub status_updated: bool,
}

/// 同步周期执行器
pub struct OperatorSync {
    client: Arc<dyn ClusterClient>,
    store: Arc<dyn OperatorConfigStore>,
    settings: OperatorSettings,
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

impl OperatorSync {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        store: Arc<dyn OperatorConfigStore>,
        settings: OperatorSettings,
    ) -> Self {
        Self { client, store, settings }
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn OperatorConfigStore> {
        &self.store
    }

    /// 执行一个周期
    ///
    /// 只有不可恢复的错误（如 status 写入冲突、取消）才以 `Err` 返回；
    /// 子步骤错误体现在 Degraded 条件和 `needs_retry` 中。
    pub async fn sync(&self, record: &ServiceCatalogControllerManager, cancel: &CancellationToken) -> Result<SyncOutcome> {
        match record.spec.management_state {
            ManagementState::Managed => self.sync_managed(record, cancel).await,
            ManagementState::Unmanaged => {
                debug!("管理状态为 Unmanaged，跳过同步");
                Ok(SyncOutcome::default())
            }
            ManagementState::Removed => self.sync_removed(record, cancel).await,
        }
    }

    fn dependencies(&self) -> Vec<ObjectRef> {
        vec![
            ObjectRef::config_map(OPERAND_NAMESPACE, &self.settings.client_ca_name),
            ObjectRef::secret(OPERAND_NAMESPACE, &self.settings.serving_cert_name),
        ]
    }

    async fn sync_managed(
        &self,
        record: &ServiceCatalogControllerManager,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let client = self.client.as_ref();
        let mut errors = Vec::new();

        checkpoint(cancel)?;
        let manifests = assets::static_manifests()?;
        let results = apply::apply_directly(client, &manifests, cancel).await;
        let force_requested = results.iter().any(ApplyResult::forces_redeploy);
        for result in results {
            if let Some(error) = result.error {
                errors.push(StepError::manifest(&result.file, &result.kind, error));
            }
        }

        checkpoint(cancel)?;
        let config_changed = match config_composer::manage_config_map(client, record, &self.dependencies()).await {
            Ok((_, changed)) => changed,
            Err(e) => {
                warn!(error = %e, "运行配置组装失败");
                errors.push(StepError::step("configmap", e));
                false
            }
        };

        checkpoint(cancel)?;
        let ca_changed = match ca_mirror::sync_config_map(
            client,
            &self.settings.ca_source_namespace,
            &self.settings.client_ca_name,
            OPERAND_NAMESPACE,
            &self.settings.client_ca_name,
        )
        .await
        {
            Ok(changed) => changed,
            Err(e) => {
                warn!(error = %e, "客户端 CA 同步失败");
                errors.push(StepError::step("client-ca", e));
                false
            }
        };

        checkpoint(cancel)?;
        let prior = record.status.clone().unwrap_or_default();
        let request = RolloutRequest {
            image_pull_spec: self.settings.image_pull_spec.clone(),
            log_level: record.spec.log_level,
            expected_generation: expected_generation(&prior.generations, &WORKLOAD),
            force: rollout::should_force(force_requested, record, config_changed, ca_changed),
        };
        let workload: Option<DaemonSet> = match rollout::manage_daemon_set(client, &request).await {
            Ok((ds, _)) => Some(ds),
            Err(e) => {
                warn!(error = %e, "工作负载发布失败");
                errors.push(StepError::step("daemonset", e));
                None
            }
        };

        let name = self.record_name(record);
        let status = status::aggregate(
            &prior,
            &CycleFacts {
                record_name: &name,
                generation: record.generation(),
                workload: workload.as_ref(),
                errors: &errors,
            },
        );

        checkpoint(cancel)?;
        let status_updated = self.persist(record, &prior, status).await?;
        Ok(SyncOutcome {
            needs_retry: !errors.is_empty(),
            status_updated,
        })
    }

    async fn sync_removed(
        &self,
        record: &ServiceCatalogControllerManager,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let mut errors = Vec::new();

        checkpoint(cancel)?;
        if let Err(e) = self.client.delete_namespace(OPERAND_NAMESPACE).await {
            warn!(namespace = OPERAND_NAMESPACE, error = %e, "删除工作负载命名空间失败");
            errors.push(StepError::step("namespace", e));
        }

        let prior = record.status.clone().unwrap_or_default();
        let status = status::removed(&prior, record.generation(), &errors);

        checkpoint(cancel)?;
        let status_updated = self.persist(record, &prior, status).await?;
        Ok(SyncOutcome {
            needs_retry: !errors.is_empty(),
            status_updated,
        })
    }

    fn record_name(&self, record: &ServiceCatalogControllerManager) -> String {
        record
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| self.settings.operator_config_name.clone())
    }

    /// 结构上有变化时才写回 status
    async fn persist(
        &self,
        record: &ServiceCatalogControllerManager,
        prior: &ServiceCatalogControllerManagerStatus,
        status: ServiceCatalogControllerManagerStatus,
    ) -> Result<bool> {
        if record.status.is_some() && *prior == status {
            debug!("status 未变化，跳过写入");
            return Ok(false);
        }

        let mut updated = record.clone();
        updated.status = Some(status);
        self.store.update_status(&updated).await?;
        info!(name = %self.record_name(record), "status 已更新");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockOperatorConfigStore;
    use crate::crd::ServiceCatalogControllerManagerSpec;
    use crate::fake::FakeCluster;
    use crate::rollout::FORCE_ANNOTATION;
    use crate::status::{REASON_NO_INSTANCES, REASON_REMOVED};
    use serde_json::json;
    use std::sync::Mutex;
    use svcat_common::{find_condition, CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_PROGRESSING};

    const SVC: &str = "v3.11.0/openshift-svcat-controller-manager/svc.yaml";

    fn record(observed: serde_json::Value) -> ServiceCatalogControllerManager {
        let mut cr = ServiceCatalogControllerManager::new(
            "cluster",
            ServiceCatalogControllerManagerSpec {
                observed_config: Some(observed),
                ..Default::default()
            },
        );
        cr.metadata.generation = Some(1);
        cr
    }

    fn seeded() -> Arc<FakeCluster> {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_config_map("kube-system", "client-ca", &[("ca-bundle.crt", "CA1")]);
        cluster.insert_config_map(OPERAND_NAMESPACE, "client-ca", &[("ca-bundle.crt", "CA1")]);
        cluster.insert_secret(OPERAND_NAMESPACE, "serving-cert", &[("tls.crt", "CERT")]);
        cluster
    }

    /// 记录写入内容的 store
    fn recording_store(slot: Arc<Mutex<Option<ServiceCatalogControllerManager>>>) -> MockOperatorConfigStore {
        let mut store = MockOperatorConfigStore::new();
        store.expect_update_status().times(1).returning(move |r| {
            *slot.lock().unwrap() = Some(r.clone());
            Ok(r.clone())
        });
        store
    }

    fn silent_store() -> MockOperatorConfigStore {
        let mut store = MockOperatorConfigStore::new();
        store.expect_update_status().times(0);
        store
    }

    fn operator(cluster: &Arc<FakeCluster>, store: MockOperatorConfigStore) -> OperatorSync {
        OperatorSync::new(cluster.clone(), Arc::new(store), OperatorSettings::default())
    }

    async fn run_recorded(
        cluster: &Arc<FakeCluster>,
        record: &ServiceCatalogControllerManager,
    ) -> (SyncOutcome, ServiceCatalogControllerManager) {
        let slot = Arc::new(Mutex::new(None));
        let outcome = operator(cluster, recording_store(slot.clone()))
            .sync(record, &CancellationToken::new())
            .await
            .unwrap();
        let written = slot.lock().unwrap().take().unwrap();
        (outcome, written)
    }

    fn force_marker(cluster: &FakeCluster) -> Option<String> {
        cluster
            .daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME)
            .and_then(|ds| ds.spec)
            .and_then(|s| s.template.metadata)
            .and_then(|m| m.annotations)
            .and_then(|a| a.get(FORCE_ANNOTATION).cloned())
    }

    fn condition(record: &ServiceCatalogControllerManager, type_: &str) -> svcat_common::OperatorCondition {
        find_condition(&record.status.as_ref().unwrap().conditions, type_).unwrap().clone()
    }

    #[test_log::test(tokio::test)]
    async fn test_converged_cycle_is_idempotent() {
        let cluster = seeded();
        let (outcome, written) = run_recorded(&cluster, &record(json!({"a": "1"}))).await;
        assert!(!outcome.needs_retry);
        assert!(outcome.status_updated);
        assert!(!condition(&written, CONDITION_PROGRESSING).is_true());
        assert!(!condition(&written, CONDITION_DEGRADED).is_true());

        let attempts = cluster.manifest_attempts().len();
        let ds_writes = cluster.daemon_set_writes();
        let cm_writes = cluster.config_map_writes();

        let outcome = operator(&cluster, silent_store())
            .sync(&written, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::default());
        assert_eq!(cluster.manifest_attempts().len(), attempts * 2);
        assert_eq!(cluster.daemon_set_writes(), ds_writes);
        assert_eq!(cluster.config_map_writes(), cm_writes);
    }

    #[tokio::test]
    async fn test_config_change_forces_rollout() {
        let cluster = seeded();
        let (_, written) = run_recorded(&cluster, &record(json!({"a": "1"}))).await;
        let before = force_marker(&cluster);
        let generation = cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).unwrap().metadata.generation;

        let mut edited = written.clone();
        edited.spec.observed_config = Some(json!({"a": "2"}));
        let (outcome, _) = run_recorded(&cluster, &edited).await;

        let after = cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).unwrap();
        assert!(!outcome.needs_retry);
        assert!(force_marker(&cluster).is_some());
        assert_ne!(force_marker(&cluster), before);
        assert!(after.metadata.generation > generation);
    }

    #[tokio::test]
    async fn test_service_account_change_forces_rollout() {
        let cluster = seeded();
        let (_, written) = run_recorded(&cluster, &record(json!({"a": "1"}))).await;
        let before = force_marker(&cluster);
        let generation = cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).unwrap().metadata.generation;

        cluster.forget_manifest(SVC);
        let outcome = operator(&cluster, silent_store())
            .sync(&written, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::default());
        assert_eq!(force_marker(&cluster), before);

        cluster.forget_manifest(assets::FORCE_REDEPLOY_MANIFESTS[0]);
        let (outcome, _) = run_recorded(&cluster, &written).await;

        let after = cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).unwrap();
        assert!(!outcome.needs_retry);
        assert!(force_marker(&cluster).is_some());
        assert_ne!(force_marker(&cluster), before);
        assert!(after.metadata.generation > generation);
    }

    #[tokio::test]
    async fn test_manifest_failure_is_isolated() {
        let cluster = seeded();
        cluster.fail_manifest(SVC);

        let (outcome, written) = run_recorded(&cluster, &record(json!({}))).await;

        assert!(outcome.needs_retry);
        assert_eq!(cluster.manifest_attempts().len(), assets::STATIC_MANIFESTS.len());
        let degraded = condition(&written, CONDITION_DEGRADED);
        assert!(degraded.is_true());
        let lines: Vec<&str> = degraded.message.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(&format!("{:?} (Service): ", SVC)), "line={}", lines[0]);
        assert!(cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).is_some());
    }

    #[tokio::test]
    async fn test_missing_serving_cert_degrades_and_blocks_config() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_config_map("kube-system", "client-ca", &[("ca-bundle.crt", "CA1")]);
        cluster.insert_config_map(OPERAND_NAMESPACE, "client-ca", &[("ca-bundle.crt", "CA1")]);

        let (outcome, written) = run_recorded(&cluster, &record(json!({}))).await;

        assert!(outcome.needs_retry);
        let degraded = condition(&written, CONDITION_DEGRADED);
        assert!(degraded.message.starts_with("\"configmap\": unable to resolve secret"));
        assert!(degraded.message.contains("serving-cert"));
        assert!(cluster.config_map(OPERAND_NAMESPACE, assets::CONFIG_MAP_NAME).is_none());
        assert!(cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).is_some());
    }

    #[tokio::test]
    async fn test_availability_follows_ready_instances() {
        let cluster = seeded();
        let (_, written) = run_recorded(&cluster, &record(json!({}))).await;
        let available = condition(&written, CONDITION_AVAILABLE);
        assert!(!available.is_true());
        assert_eq!(available.reason, REASON_NO_INSTANCES);

        cluster.set_ready(1);
        let (_, written) = run_recorded(&cluster, &written).await;
        assert!(condition(&written, CONDITION_AVAILABLE).is_true());
    }

    #[tokio::test]
    async fn test_rollout_lag_reports_progressing() {
        let cluster = seeded();
        let (_, written) = run_recorded(&cluster, &record(json!({"a": "1"}))).await;

        cluster.lag_rollouts();
        let mut edited = written.clone();
        edited.spec.observed_config = Some(json!({"a": "2"}));
        let (_, written) = run_recorded(&cluster, &edited).await;

        let progressing = condition(&written, CONDITION_PROGRESSING);
        assert!(progressing.is_true());
        assert_eq!(
            progressing.message,
            "daemonset/controller-manager: observed generation is 1, desired generation is 2."
        );
    }

    #[tokio::test]
    async fn test_status_write_conflict_is_hard_error() {
        let cluster = seeded();
        let mut store = MockOperatorConfigStore::new();
        store
            .expect_update_status()
            .times(1)
            .returning(|_| Err(Error::PersistenceConflict("servicecatalogcontrollermanagers/cluster".to_string())));

        let err = operator(&cluster, store)
            .sync(&record(json!({})), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_cancelled_cycle_writes_nothing() {
        let cluster = seeded();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = operator(&cluster, silent_store())
            .sync(&record(json!({})), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(cluster.manifest_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_unmanaged_does_nothing() {
        let cluster = seeded();
        let mut cr = record(json!({}));
        cr.spec.management_state = ManagementState::Unmanaged;

        let outcome = operator(&cluster, silent_store())
            .sync(&cr, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::default());
        assert!(cluster.manifest_attempts().is_empty());
        assert!(cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).is_none());
    }

    #[tokio::test]
    async fn test_removed_deletes_operand_namespace() {
        let cluster = seeded();
        let (_, written) = run_recorded(&cluster, &record(json!({}))).await;

        let mut removed = written.clone();
        removed.spec.management_state = ManagementState::Removed;
        removed.metadata.generation = Some(2);
        let (outcome, written) = run_recorded(&cluster, &removed).await;

        assert!(!outcome.needs_retry);
        assert_eq!(cluster.deleted_namespaces(), vec![OPERAND_NAMESPACE.to_string()]);
        assert!(cluster.daemon_set(OPERAND_NAMESPACE, WORKLOAD_NAME).is_none());
        assert_eq!(written.observed_generation(), 2);
        assert_eq!(condition(&written, CONDITION_AVAILABLE).reason, REASON_REMOVED);
        assert!(!condition(&written, CONDITION_PROGRESSING).is_true());

        let outcome = operator(&cluster, silent_store())
            .sync(&written, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.status_updated);
    }

    #[tokio::test]
    async fn test_removed_delete_failure_needs_retry() {
        let cluster = seeded();
        cluster.fail_namespace_delete();
        let mut cr = record(json!({}));
        cr.spec.management_state = ManagementState::Removed;

        let (outcome, written) = run_recorded(&cluster, &cr).await;

        assert!(outcome.needs_retry);
        assert!(condition(&written, CONDITION_DEGRADED).message.starts_with("\"namespace\": "));
    }
}
