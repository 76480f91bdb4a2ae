//! Operator 规格枚举
//!
//! 管理状态与日志级别，两者都来自期望状态对象的 spec。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// 管理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum ManagementState {
    /// 完整同步受管资源
    #[default]
    Managed,
    /// 不触碰任何受管资源
    Unmanaged,
    /// 删除受管资源
    Removed,
}

impl fmt::Display for ManagementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagementState::Managed => write!(f, "Managed"),
            ManagementState::Unmanaged => write!(f, "Unmanaged"),
            ManagementState::Removed => write!(f, "Removed"),
        }
    }
}

impl FromStr for ManagementState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "managed" => Ok(ManagementState::Managed),
            "unmanaged" => Ok(ManagementState::Unmanaged),
            "removed" => Ok(ManagementState::Removed),
            _ => Err(Error::Config(format!("unknown management state: {}", s))),
        }
    }
}

/// 日志级别档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum LogLevel {
    Normal,
    Debug,
    Trace,
    TraceAll,
}

impl LogLevel {
    /// 未设置时使用的 `-v` 级别
    pub const DEFAULT_VERBOSITY: u8 = 2;

    /// 对应的 `-v` 数值
    pub fn verbosity(self) -> u8 {
        match self {
            LogLevel::Normal => 2,
            LogLevel::Debug => 4,
            LogLevel::Trace => 6,
            LogLevel::TraceAll => 8,
        }
    }

    /// 将可选档位映射为 `-v` 数值，未设置时回退到默认值
    pub fn verbosity_of(level: Option<LogLevel>) -> u8 {
        level.map_or(Self::DEFAULT_VERBOSITY, LogLevel::verbosity)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Normal => write!(f, "Normal"),
            LogLevel::Debug => write!(f, "Debug"),
            LogLevel::Trace => write!(f, "Trace"),
            LogLevel::TraceAll => write!(f, "TraceAll"),
        }
    }
}
