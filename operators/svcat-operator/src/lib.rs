//! Svcat Operator - 管理 Service Catalog 控制器管理器的 Kubernetes Operator
//!
//! 该模块根据期望状态对象 ServiceCatalogControllerManager 驱动集群中的工作负载收敛：
//! 应用静态资源、组装运行配置、镜像客户端 CA、发布 DaemonSet，并汇总健康条件。

pub mod apply;
pub mod assets;
pub mod ca_mirror;
pub mod client;
pub mod config_composer;
pub mod controller;
pub mod crd;
pub mod kube_client;
pub mod reconcile;
pub mod rollout;
pub mod settings;
pub mod status;
pub mod sync;

#[cfg(test)]
mod fake;

use anyhow::{Context, Result};
use kube::Client;

use crate::settings::OperatorSettings;
use crate::sync::SyncOutcome;

/// Operator 主结构体
pub struct SvcatOperator {
    /// Kubernetes 客户端
    client: Client,
    /// 控制器
    controller: controller::Controller,
}

impl SvcatOperator {
    /// 创建新的 Operator 实例
    pub async fn new(settings: OperatorSettings) -> Result<Self> {
        let client = Client::try_default().await.context("创建 Kubernetes 客户端失败")?;
        let controller = controller::Controller::new(client.clone(), settings);

        Ok(Self { client, controller })
    }

    /// 启动控制器，直到收到终止信号
    pub async fn run(&self) -> Result<()> {
        self.controller.run().await;
        Ok(())
    }

    /// 对单例期望状态对象执行一个周期
    pub async fn run_once(&self) -> Result<SyncOutcome> {
        let reconciler = self.controller.reconciler();
        let name = reconciler.settings().operator_config_name.clone();
        let store = kube_client::KubeOperatorConfigStore::new(self.client.clone());

        let record = client::OperatorConfigStore::get(&store, &name)
            .await
            .with_context(|| format!("读取 servicecatalogcontrollermanagers/{} 失败", name))?;
        let outcome = reconciler.run_cycle(&record).await?;
        Ok(outcome)
    }
}
