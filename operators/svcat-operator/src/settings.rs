//! 配置管理模块
//!
//! 该模块负责加载 Operator 的运行配置，支持可选的 YAML/JSON 配置文件，
//! 以及 `SVCAT_` 前缀的环境变量覆盖（如 `SVCAT_IMAGE_PULL_SPEC`）。
//! 工作负载命名空间随内嵌清单固定，不在这里配置。

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use svcat_common::{Error, Result};

/// Operator 配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSettings {
    /// 期望状态对象的名称
    pub operator_config_name: String,
    /// 客户端 CA 的权威来源命名空间
    pub ca_source_namespace: String,
    /// 客户端 CA ConfigMap 名称
    pub client_ca_name: String,
    /// 服务证书 Secret 名称
    pub serving_cert_name: String,
    /// 外部提供的工作负载镜像，空字符串表示沿用模板
    pub image_pull_spec: String,
    /// 正常重新同步间隔（秒）
    pub resync_interval_seconds: u64,
    /// 出错后重新排队间隔（秒）
    pub error_requeue_seconds: u64,
    /// 单个同步周期的超时（秒）
    pub cycle_timeout_seconds: u64,
    /// 日志级别
    pub log_level: String,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            operator_config_name: "cluster".to_string(),
            ca_source_namespace: "kube-system".to_string(),
            client_ca_name: "client-ca".to_string(),
            serving_cert_name: "serving-cert".to_string(),
            image_pull_spec: String::new(),
            resync_interval_seconds: 300,
            error_requeue_seconds: 10,
            cycle_timeout_seconds: 60,
            log_level: "info".to_string(),
        }
    }
}

impl OperatorSettings {
    /// 加载配置：默认值 < 配置文件 < 环境变量
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            let config_file = path
                .to_str()
                .ok_or_else(|| Error::Config(format!("config path is not valid utf-8: {:?}", path)))?;

            let format = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(Error::Config("only yaml or json config files are supported".to_string())),
            };

            builder = builder.add_source(File::with_name(config_file).format(format));
        }

        let settings = builder
            .add_source(Environment::with_prefix("SVCAT").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<OperatorSettings>())
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.ca_source_namespace.is_empty() {
            return Err(Error::Config("ca_source_namespace must not be empty".to_string()));
        }
        if self.cycle_timeout_seconds == 0 {
            return Err(Error::Config("cycle_timeout_seconds must be positive".to_string()));
        }
        Ok(())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_seconds)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_seconds)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_seconds)
    }
}
