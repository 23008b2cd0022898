//! 解码轨迹回放.
//!
//! 轨迹是一份 JSON 文档, 记录解析器已经得到的图像/slice 级数值字段,
//! 回放时按解码顺序驱动 [`Dpb`], 收集输出顺序与可恢复的错误.
//!
//! ```json
//! {
//!   "config": { "width": 64, "height": 64, "num_reorder_pics": 2 },
//!   "pictures": [
//!     { "nal_type": 19, "poc_lsb": 0, "slices": [{ "slice_type": "I" }] },
//!     {
//!       "nal_type": 1, "poc_lsb": 4,
//!       "slices": [{
//!         "slice_type": "P",
//!         "short_term_rps": { "delta_poc": [-4], "used": [true], "num_negative": 1 },
//!         "num_ref_idx_active": [1, 0]
//!       }]
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use tao_hevc::config::DpbConfig;
use tao_hevc::dpb::{
    Dpb, LongTermRps, OutputPicture, PictureParams, PictureStart, RpsInput, ShortTermRps,
    SliceParams, SliceRefParams,
};
use tao_hevc::error::DpbError;
use tao_hevc::nal::HevcNalUnitType;
use tao_hevc::picture::FrameRef;

// ============================================================
// 轨迹格式
// ============================================================

/// 完整轨迹
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamTrace {
    /// DPB 配置
    pub config: DpbConfig,
    /// 按解码顺序排列的图像
    pub pictures: Vec<PictureTrace>,
}

/// 图像级记录
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PictureTrace {
    /// nal_unit_type 数值 (0-31)
    pub nal_type: u8,
    /// TemporalId
    #[serde(default)]
    pub temporal_id: u8,
    /// slice_pic_order_cnt_lsb
    pub poc_lsb: u32,
    /// 显示时间戳, 缺省为解码序号
    #[serde(default)]
    pub pts: Option<i64>,
    /// 图像之后紧跟 EOS NAL
    #[serde(default)]
    pub end_of_sequence: bool,
    /// 按码流顺序排列的 slice
    pub slices: Vec<SliceTrace>,
}

/// slice 级记录
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SliceTrace {
    /// 短期 RPS
    #[serde(default)]
    pub short_term_rps: Option<ShortTermRps>,
    /// 长期 RPS
    #[serde(default)]
    pub long_term_rps: Option<LongTermRps>,
    /// slice 类型、地址、激活数与重排命令
    #[serde(flatten)]
    pub refs: SliceRefParams,
}

impl SliceTrace {
    fn rps(&self) -> Option<RpsInput> {
        if self.short_term_rps.is_none() && self.long_term_rps.is_none() {
            return None;
        }
        Some(RpsInput {
            short_term: self.short_term_rps.clone().unwrap_or_default(),
            long_term: self.long_term_rps.clone().unwrap_or_default(),
        })
    }
}

/// 从字符串解析轨迹
pub fn parse_trace(text: &str) -> Result<StreamTrace> {
    serde_json::from_str(text).context("解析轨迹 JSON 失败")
}

/// 从文件读取轨迹
pub fn load_trace(path: &Path) -> Result<StreamTrace> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取轨迹文件失败, path={}", path.display()))?;
    parse_trace(&text).with_context(|| format!("轨迹文件格式错误, path={}", path.display()))
}

// ============================================================
// 回放
// ============================================================

/// 回放选项
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// 每解码 N 幅图像强制刷新一次输出, 0 表示只在码流结束时刷新
    pub flush_every: usize,
}

/// 一幅已输出的图像
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayedPicture {
    /// POC
    pub poc: i32,
    /// 显示时间戳
    pub pts: i64,
    /// 输出时所在槽位
    pub slot: usize,
}

impl From<&OutputPicture<FrameRef>> for DisplayedPicture {
    fn from(pic: &OutputPicture<FrameRef>) -> Self {
        Self {
            poc: pic.poc,
            pts: pic.pts,
            slot: pic.slot,
        }
    }
}

/// 图像解码失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureFailure {
    /// 图像在轨迹中的序号
    pub index: usize,
    /// 错误
    pub error: DpbError,
}

/// 回放结果
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// 按显示顺序输出的图像
    pub displayed: Vec<DisplayedPicture>,
    /// 被跳过的 RASL 图像数
    pub skipped_rasl: usize,
    /// 解码失败的图像
    pub failures: Vec<PictureFailure>,
}

impl ReplayReport {
    /// 显示顺序的 POC 列表
    pub fn display_pocs(&self) -> Vec<i32> {
        self.displayed.iter().map(|pic| pic.poc).collect()
    }
}

/// 按解码顺序回放轨迹
///
/// 单幅图像的 DPB 错误只记录在 [`ReplayReport::failures`] 中, 回放继续;
/// 配置无效或 NAL 类型非法时整体失败.
pub fn replay(trace: &StreamTrace, options: &ReplayOptions) -> Result<ReplayReport> {
    let mut dpb =
        Dpb::with_plane_allocator(trace.config.clone()).context("DPB 配置无效")?;
    let mut report = ReplayReport::default();
    let mut decoded = 0usize;

    for (index, pic) in trace.pictures.iter().enumerate() {
        let nal_type = HevcNalUnitType::from_type_id(pic.nal_type)
            .with_context(|| format!("图像 #{} 的 NAL 类型无效", index))?;
        let params = PictureParams {
            nal_type,
            temporal_id: pic.temporal_id,
            poc_lsb: pic.poc_lsb,
            pts: pic.pts.unwrap_or(index as i64),
        };

        match decode_picture(&mut dpb, &params, &pic.slices) {
            Ok(Some(poc)) => {
                decoded += 1;
                debug!("轨迹回放: 图像 #{} 解码完成, poc={}", index, poc);
            }
            Ok(None) => report.skipped_rasl += 1,
            Err(error) => {
                warn!("轨迹回放: 图像 #{} 解码失败: {}", index, error);
                report.failures.push(PictureFailure { index, error });
            }
        }

        let flush = options.flush_every > 0 && decoded > 0 && decoded % options.flush_every == 0;
        collect(&mut report, dpb.drain(flush));

        if pic.end_of_sequence {
            dpb.end_of_sequence();
        }
    }

    collect(&mut report, dpb.finish_stream());
    info!(
        "轨迹回放: 完成, 图像={}, 输出={}, 跳过={}, 失败={}",
        trace.pictures.len(),
        report.displayed.len(),
        report.skipped_rasl,
        report.failures.len()
    );
    Ok(report)
}

/// 解码一幅图像的全部 slice, 被跳过的 RASL 返回 `None`
fn decode_picture(
    dpb: &mut Dpb,
    params: &PictureParams,
    slices: &[SliceTrace],
) -> Result<Option<i32>, DpbError> {
    let poc = match dpb.begin_picture(params)? {
        PictureStart::Decode { poc } => poc,
        PictureStart::SkipRasl => return Ok(None),
    };
    if slices.is_empty() {
        return Err(DpbError::InvalidArgument(format!(
            "POC {} 的图像没有 slice",
            poc
        )));
    }
    // 参考缺失时图像仍在 DPB 中, 继续解码其余 slice, 只报告首个错误
    let mut missing = None;
    for (i, slice) in slices.iter().enumerate() {
        match dpb.decode_slice(&SliceParams {
            first_slice: i == 0,
            rps: slice.rps(),
            refs: slice.refs.clone(),
        }) {
            Ok(_) => {}
            Err(err @ DpbError::ReferenceNotFound { .. }) => {
                missing.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }
    }
    match missing {
        Some(err) => Err(err),
        None => Ok(Some(poc)),
    }
}

fn collect(report: &mut ReplayReport, pictures: Vec<OutputPicture<FrameRef>>) {
    report
        .displayed
        .extend(pictures.iter().map(DisplayedPicture::from));
}
