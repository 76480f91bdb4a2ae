//! 数据模型模块
//!
//! 该模块定义了期望状态对象 status 中使用的模型：条件集合、代数账本，
//! 以及 spec 中的管理状态与日志级别枚举。

pub mod condition;
pub mod generation;
pub mod operator;
