//! 通用工具函数
//!
//! 依赖对象的内容哈希。

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// 计算字节串的 SHA-256 哈希（小写十六进制）
pub fn sha256_hash(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    let result = hasher.finalize();

    format!("{:x}", result)
}

/// 先序列化为 JSON 再计算哈希
///
/// 调用方需传入键有序的结构（如 `BTreeMap`），保证相同内容得到相同哈希。
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hash(&bytes))
}
