//! 控制器模块
//!
//! 基于 kube 运行时的控制器：监听期望状态对象，同时监听工作负载 DaemonSet，
//! 后者的任何变化都映射回单例期望状态对象。运行时保证同一对象的周期串行执行。

use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller as KubeController},
        reflector::ObjectRef,
        watcher,
    },
};
use std::sync::Arc;
use svcat_common::{Error, Result};
use tracing::{debug, error, info};

use crate::assets::OPERAND_NAMESPACE;
use crate::crd::ServiceCatalogControllerManager;
use crate::kube_client::{KubeClusterClient, KubeOperatorConfigStore};
use crate::reconcile::Reconciler;
use crate::settings::OperatorSettings;
use crate::sync::OperatorSync;

/// 控制器结构体
pub struct Controller {
    /// Kubernetes 客户端
    client: Client,
    /// 协调器
    reconciler: Arc<Reconciler>,
}

async fn reconcile(record: Arc<ServiceCatalogControllerManager>, ctx: Arc<Reconciler>) -> Result<Action> {
    ctx.reconcile(record).await
}

fn error_policy(record: Arc<ServiceCatalogControllerManager>, error: &Error, ctx: Arc<Reconciler>) -> Action {
    ctx.handle_error(record, error)
}

impl Controller {
    /// 创建新的控制器
    pub fn new(client: Client, settings: OperatorSettings) -> Self {
        let sync = OperatorSync::new(
            Arc::new(KubeClusterClient::new(client.clone())),
            Arc::new(KubeOperatorConfigStore::new(client.clone())),
            settings,
        );

        Self {
            client,
            reconciler: Arc::new(Reconciler::new(sync)),
        }
    }

    /// 获取协调器
    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    /// 运行控制器直到收到终止信号
    pub async fn run(&self) {
        let records: Api<ServiceCatalogControllerManager> = Api::all(self.client.clone());
        let daemon_sets: Api<DaemonSet> = Api::namespaced(self.client.clone(), OPERAND_NAMESPACE);
        let singleton = self.reconciler.settings().operator_config_name.clone();

        info!(name = %singleton, namespace = OPERAND_NAMESPACE, "启动 ServiceCatalogControllerManager 控制器");

        KubeController::new(records, watcher::Config::default())
            .watches(daemon_sets, watcher::Config::default(), move |_: DaemonSet| {
                Some(ObjectRef::<ServiceCatalogControllerManager>::new(&singleton))
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|result| async move {
                match result {
                    Ok((obj, action)) => debug!(name = %obj.name, ?action, "协调成功"),
                    Err(e) => error!(error = %e, "协调错误"),
                }
            })
            .await;

        info!("ServiceCatalogControllerManager 控制器已停止");
    }
}
