//! Svcat Common - 跨模块共享工具与数据结构
//!
//! 该模块提供 Svcat Operator 所有组件共享的错误类型、状态模型和哈希工具。

pub mod error;
pub mod models;
pub mod util;

/// 重新导出常用类型，方便使用
pub use error::Error;
pub use error::Result;
pub use models::condition::*;
pub use models::generation::*;
pub use models::operator::*;
