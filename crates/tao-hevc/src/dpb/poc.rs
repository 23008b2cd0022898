//! POC (Picture Order Count) 计算.
//!
//! 由 slice_pic_order_cnt_lsb 与 `poc_tid0` 锚点推导 PicOrderCntMsb,
//! LSB 回绕时 MSB 前进/后退一个 MaxPicOrderCntLsb.
//!
//! [`compute_poc`] 是按 NAL 类型计算的入口, 序列内图像都经由它;
//! 开启新序列的 IRAP 由驱动直接调用 [`compute_poc_msb_reset`] 清零 MSB.

use crate::error::{DpbError, DpbResult};
use crate::nal::HevcNalUnitType;

/// 计算图像的绝对 POC
///
/// BLA 图像的 MSB 强制为 0.
pub fn compute_poc(
    poc_lsb: i32,
    log2_max_poc_lsb: u32,
    nal_type: HevcNalUnitType,
    poc_tid0: i32,
) -> DpbResult<i32> {
    compute_poc_msb_reset(poc_lsb, log2_max_poc_lsb, nal_type.is_bla(), poc_tid0)
}

/// 计算 POC, `reset_msb` 为真时 MSB 取 0
///
/// NoRaslOutputFlag=1 的 IRAP 图像 (IDR/BLA, 以及码流开头或 EOS 之后的 CRA)
/// 均按此方式处理.
pub fn compute_poc_msb_reset(
    poc_lsb: i32,
    log2_max_poc_lsb: u32,
    reset_msb: bool,
    poc_tid0: i32,
) -> DpbResult<i32> {
    if !(4..=16).contains(&log2_max_poc_lsb) {
        return Err(DpbError::InvalidArgument(format!(
            "log2_max_poc_lsb={} 超出范围 4..=16",
            log2_max_poc_lsb
        )));
    }
    let max_lsb = 1i32 << log2_max_poc_lsb;
    if !(0..max_lsb).contains(&poc_lsb) {
        return Err(DpbError::InvalidArgument(format!(
            "poc_lsb={} 超出范围 0..{}",
            poc_lsb, max_lsb
        )));
    }
    if reset_msb {
        return Ok(poc_lsb);
    }

    let prev_lsb = poc_tid0.rem_euclid(max_lsb);
    let prev_msb = poc_tid0 - prev_lsb;
    let msb = if poc_lsb < prev_lsb && prev_lsb - poc_lsb >= max_lsb / 2 {
        prev_msb.checked_add(max_lsb)
    } else if poc_lsb > prev_lsb && poc_lsb - prev_lsb > max_lsb / 2 {
        prev_msb.checked_sub(max_lsb)
    } else {
        Some(prev_msb)
    };
    msb.and_then(|msb| msb.checked_add(poc_lsb)).ok_or_else(|| {
        DpbError::InvalidArgument(format!(
            "poc_tid0={} 附近的 POC 超出 i32 范围, poc_lsb={}",
            poc_tid0, poc_lsb
        ))
    })
}

/// 当前图像是否成为新的 `poc_tid0` 锚点
///
/// 要求 TemporalId=0, 且不是 RASL/RADL/子层非参考图像.
pub fn updates_poc_tid0(nal_type: HevcNalUnitType, temporal_id: u8) -> bool {
    temporal_id == 0 && !nal_type.is_leading() && !nal_type.is_sub_layer_non_reference()
}
