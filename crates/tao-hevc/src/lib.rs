//! # tao-hevc
//!
//! Tao 多媒体框架 HEVC 解码图像缓冲 (DPB) 核心库.
//!
//! 对标 FFmpeg libavcodec 的 `hevc_refs.c`, 负责:
//! - POC 计算 (含跨编码视频序列的回绕处理)
//! - 参考图像集 (RPS) 五类分类与槽位解析
//! - 逐 slice 构建 list0/list1 参考列表, 按 CTB 记录
//! - 按重排深度调度输出, 回收不再需要的槽位
//!
//! 熵解码、参数集解析与像素重建不在本 crate 范围内, 由调用方以结构化输入提供.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_hevc::config::DpbConfig;
//! use tao_hevc::dpb::{Dpb, PictureParams, PictureStart, SliceParams, SliceRefParams};
//! use tao_hevc::nal::HevcNalUnitType;
//!
//! let mut dpb = Dpb::with_plane_allocator(DpbConfig::new(64, 64)).unwrap();
//! let start = dpb
//!     .begin_picture(&PictureParams {
//!         nal_type: HevcNalUnitType::IdrNLp,
//!         temporal_id: 0,
//!         poc_lsb: 0,
//!         pts: 0,
//!     })
//!     .unwrap();
//! assert_eq!(start, PictureStart::Decode { poc: 0 });
//! dpb.decode_slice(&SliceParams {
//!     first_slice: true,
//!     rps: None,
//!     refs: SliceRefParams::default(),
//! })
//! .unwrap();
//! let out = dpb.finish_stream();
//! assert_eq!(out[0].poc, 0);
//! ```

pub mod config;
pub mod dpb;
pub mod error;
pub mod nal;
pub mod picture;

// 重导出常用类型
pub use config::{CtbLayout, DpbConfig};
pub use dpb::{Dpb, OutputPicture, PictureParams, PictureStart, SliceParams};
pub use error::{DpbError, DpbResult};
pub use nal::HevcNalUnitType;
pub use picture::{DecodedPicture, FrameAllocator, FrameRef, PlaneAllocator};
