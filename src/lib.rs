//! # Tao DPB
//!
//! 纯 Rust 实现的 HEVC 解码图像缓冲 (DPB) 管理, 对标 FFmpeg `hevc_refs.c`.
//!
//! - **POC 计算**: 按 `poc_tid0` 锚点恢复 MSB, 处理 BLA/IRAP 序列边界
//! - **RPS 分类**: 五类参考图像集, 每个条目解析为 DPB 槽位
//! - **参考列表**: 逐 slice 构建 list0/list1, 按 CTB 记录
//! - **输出调度**: 按重排深度输出, 旧序列先于新序列显示
//! - **轨迹回放**: 从 JSON 轨迹驱动 DPB, 得到显示顺序
//!
//! # 快速开始
//!
//! ```rust
//! use tao_dpb::trace::{ReplayOptions, parse_trace, replay};
//!
//! let trace = parse_trace(
//!     r#"{
//!         "config": { "width": 64, "height": 64 },
//!         "pictures": [
//!             { "nal_type": 19, "poc_lsb": 0, "slices": [{ "slice_type": "I" }] }
//!         ]
//!     }"#,
//! )
//! .unwrap();
//! let report = replay(&trace, &ReplayOptions::default()).unwrap();
//! assert_eq!(report.display_pocs(), vec![0]);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-hevc` | DPB 核心: 槽位池、POC、RPS、参考列表、输出与回收 |
//! | `tao-dpb` | 本 crate: 重导出与轨迹回放 |

pub mod trace;

/// HEVC DPB 核心 (对标 libavcodec hevc_refs)
pub use tao_hevc as hevc;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
