//! DPB 错误类型定义.
//!
//! 所有错误都只影响当前图像/slice, 不会使解码器实例失效.

use thiserror::Error;

/// HEVC DPB 错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DpbError {
    /// 回收后仍无空闲槽位, 当前图像无法解码
    #[error("DPB 已满, 无法为 POC {poc} 分配槽位")]
    DpbFull { poc: i32 },

    /// RPS 引用的 POC 在 DPB 中没有匹配槽位
    #[error("未找到参考帧: POC {poc}")]
    ReferenceNotFound { poc: i32 },

    /// 参考列表重排索引越界
    #[error("参考列表重排命令无效: list{list}, 索引 {index}, 上限 {limit}")]
    MalformedReorder { list: usize, index: usize, limit: usize },

    /// 调用方传入的参数超出取值范围
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 在开始图像之前调用了 slice 级操作
    #[error("当前没有正在解码的图像")]
    NoCurrentPicture,

    /// 内部状态不一致 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// DPB 统一 Result 类型
pub type DpbResult<T> = Result<T, DpbError>;
