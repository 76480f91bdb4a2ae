//! 静态资源应用
//!
//! 按清单顺序逐个应用，每份定义只尝试一次；某一份失败不会阻止其余定义。
//! 取消信号在两份定义之间检查，触发后剩余定义不再尝试。

use svcat_common::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::assets::{self, Manifest};
use crate::client::ClusterClient;

/// 单份清单的应用结果，只在本周期内使用
#[derive(Debug)]
pub struct ApplyResult {
    /// 清单标识
    pub file: String,
    /// 资源类型
    pub kind: String,
    pub changed: bool,
    pub error: Option<Error>,
}

impl ApplyResult {
    /// 成功且发生变化、并且属于触发重新部署的资源
    pub fn forces_redeploy(&self) -> bool {
        self.error.is_none() && self.changed && assets::forces_redeploy(&self.file)
    }
}

/// 依次应用全部清单
pub async fn apply_directly(
    client: &dyn ClusterClient,
    manifests: &[Manifest],
    cancel: &CancellationToken,
) -> Vec<ApplyResult> {
    let mut results = Vec::with_capacity(manifests.len());

    for manifest in manifests {
        if cancel.is_cancelled() {
            debug!(remaining = manifests.len() - results.len(), "同步周期已取消，停止应用清单");
            break;
        }
        let kind = manifest.kind();
        let result = match client.apply_manifest(manifest).await {
            Ok(changed) => {
                debug!(file = %manifest.path, kind = %kind, changed, "清单已应用");
                ApplyResult {
                    file: manifest.path.clone(),
                    kind,
                    changed,
                    error: None,
                }
            }
            Err(e) => {
                warn!(file = %manifest.path, kind = %kind, error = %e, "清单应用失败");
                ApplyResult {
                    file: manifest.path.clone(),
                    kind,
                    changed: false,
                    error: Some(match e {
                        Error::Apply(_) => e,
                        other => Error::Apply(other.to_string()),
                    }),
                }
            }
        };
        results.push(result);
    }

    results
}
