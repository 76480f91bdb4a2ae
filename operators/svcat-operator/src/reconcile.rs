//! 资源协调模块
//!
//! 把 kube 运行时的一次协调请求转换为一个同步周期：为周期设置超时，
//! 并根据周期结果决定下次重新排队的时间。

use kube::{runtime::controller::Action, ResourceExt};
use std::sync::Arc;
use svcat_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crd::ServiceCatalogControllerManager;
use crate::settings::OperatorSettings;
use crate::sync::{OperatorSync, SyncOutcome};

/// 协调器结构体
pub struct Reconciler {
    sync: OperatorSync,
}

impl Reconciler {
    /// 创建新的协调器
    pub fn new(sync: OperatorSync) -> Self {
        Self { sync }
    }

    pub fn settings(&self) -> &OperatorSettings {
        self.sync.settings()
    }

    /// 协调 ServiceCatalogControllerManager 资源
    pub async fn reconcile(&self, record: Arc<ServiceCatalogControllerManager>) -> Result<Action> {
        let name = record.name_any();
        if name != self.settings().operator_config_name {
            warn!(name = %name, expected = %self.settings().operator_config_name, "忽略非单例的期望状态对象");
            return Ok(Action::await_change());
        }

        info!(name = %name, generation = record.generation(), "开始同步周期");
        let outcome = self.run_cycle(&record).await?;
        debug!(name = %name, ?outcome, "同步周期完成");

        Ok(next_action(outcome, self.settings()))
    }

    /// 在超时限制内执行一个周期
    ///
    /// 超时后整个周期被丢弃，正在进行的 API 调用随之中断，status 不会写回。
    pub async fn run_cycle(&self, record: &ServiceCatalogControllerManager) -> Result<SyncOutcome> {
        let timeout = self.settings().cycle_timeout();
        let cancel = CancellationToken::new();

        match tokio::time::timeout(timeout, self.sync.sync(record, &cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(name = %record.name_any(), timeout = ?timeout, "同步周期超时");
                Err(Error::Cancelled)
            }
        }
    }

    /// 处理错误
    pub fn handle_error(&self, record: Arc<ServiceCatalogControllerManager>, error: &Error) -> Action {
        error!(name = %record.name_any(), error = %error, "同步周期失败");
        Action::requeue(self.settings().error_requeue())
    }
}

/// 子步骤失败时尽快重试，否则按正常间隔重新同步
fn next_action(outcome: SyncOutcome, settings: &OperatorSettings) -> Action {
    if outcome.needs_retry {
        Action::requeue(settings.error_requeue())
    } else {
        Action::requeue(settings.resync_interval())
    }
}
