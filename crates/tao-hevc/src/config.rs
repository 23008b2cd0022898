//! DPB 配置.
//!
//! 配置来自 SPS (log2_max_poc_lsb, num_reorder_pics, 图像尺寸与 CTB 大小)
//! 以及档次/级别 (DPB 容量). 支持 serde 反序列化, 缺省字段使用 HEVC 常见值.

use serde::{Deserialize, Serialize};

use crate::error::{DpbError, DpbResult};

/// HEVC 允许的最大 DPB 容量
pub const MAX_DPB_SIZE: usize = 16;

/// DPB 配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DpbConfig {
    /// 槽位数量
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// log2_max_pic_order_cnt_lsb (4..=16)
    #[serde(default = "default_log2_max_poc_lsb")]
    pub log2_max_poc_lsb: u32,
    /// 最高时域层的 sps_max_num_reorder_pics
    #[serde(default)]
    pub num_reorder_pics: u32,
    /// 亮度宽度 (像素)
    pub width: u32,
    /// 亮度高度 (像素)
    pub height: u32,
    /// log2 CTB 尺寸 (4..=6)
    #[serde(default = "default_log2_ctb_size")]
    pub log2_ctb_size: u32,
}

fn default_capacity() -> usize {
    MAX_DPB_SIZE
}

fn default_log2_max_poc_lsb() -> u32 {
    8
}

fn default_log2_ctb_size() -> u32 {
    6
}

impl DpbConfig {
    /// 以默认容量/CTB 尺寸创建配置
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            capacity: default_capacity(),
            log2_max_poc_lsb: default_log2_max_poc_lsb(),
            num_reorder_pics: 0,
            width,
            height,
            log2_ctb_size: default_log2_ctb_size(),
        }
    }

    /// 校验各字段取值范围
    pub fn validate(&self) -> DpbResult<()> {
        if self.capacity == 0 || self.capacity > MAX_DPB_SIZE {
            return Err(DpbError::InvalidArgument(format!(
                "DPB 容量 {} 超出范围 1..={}",
                self.capacity, MAX_DPB_SIZE
            )));
        }
        if !(4..=16).contains(&self.log2_max_poc_lsb) {
            return Err(DpbError::InvalidArgument(format!(
                "log2_max_poc_lsb={} 超出范围 4..=16",
                self.log2_max_poc_lsb
            )));
        }
        if !(4..=6).contains(&self.log2_ctb_size) {
            return Err(DpbError::InvalidArgument(format!(
                "log2_ctb_size={} 超出范围 4..=6",
                self.log2_ctb_size
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(DpbError::InvalidArgument(format!(
                "图像尺寸无效: {}x{}",
                self.width, self.height
            )));
        }
        if self.num_reorder_pics as usize >= self.capacity {
            return Err(DpbError::InvalidArgument(format!(
                "num_reorder_pics={} 必须小于 DPB 容量 {}",
                self.num_reorder_pics, self.capacity
            )));
        }
        Ok(())
    }

    /// MaxPicOrderCntLsb
    pub fn max_poc_lsb(&self) -> i32 {
        1 << self.log2_max_poc_lsb
    }

    /// 由图像尺寸导出的 CTB 布局
    pub fn ctb_layout(&self) -> CtbLayout {
        CtbLayout::new(self.width, self.height, self.log2_ctb_size)
    }
}

/// CTB 光栅扫描布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtbLayout {
    /// log2 CTB 尺寸
    pub log2_ctb_size: u32,
    /// 水平 CTB 数
    pub width_in_ctbs: usize,
    /// 垂直 CTB 数
    pub height_in_ctbs: usize,
}

impl CtbLayout {
    /// 按亮度尺寸向上取整计算 CTB 网格
    pub fn new(width: u32, height: u32, log2_ctb_size: u32) -> Self {
        let ctb = 1u32 << log2_ctb_size;
        Self {
            log2_ctb_size,
            width_in_ctbs: width.div_ceil(ctb) as usize,
            height_in_ctbs: height.div_ceil(ctb) as usize,
        }
    }

    /// 图像中的 CTB 总数
    pub fn ctb_count(&self) -> usize {
        self.width_in_ctbs * self.height_in_ctbs
    }

    /// 亮度坐标 -> 光栅扫描 CTB 地址, 越界返回 `None`
    pub fn ctb_addr(&self, x: u32, y: u32) -> Option<usize> {
        let x_cb = (x >> self.log2_ctb_size) as usize;
        let y_cb = (y >> self.log2_ctb_size) as usize;
        if x_cb >= self.width_in_ctbs || y_cb >= self.height_in_ctbs {
            return None;
        }
        Some(y_cb * self.width_in_ctbs + x_cb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DpbConfig::new(1920, 1080);
        assert!(config.validate().is_ok(), "默认配置应通过校验");
        assert_eq!(config.max_poc_lsb(), 256);
    }

    #[test]
    fn test_validate_rejects_out_of_range_fields() {
        let mut config = DpbConfig::new(64, 64);
        config.log2_max_poc_lsb = 3;
        assert!(config.validate().is_err(), "log2_max_poc_lsb=3 应被拒绝");

        let mut config = DpbConfig::new(64, 64);
        config.capacity = 17;
        assert!(config.validate().is_err(), "容量 17 应被拒绝");

        let mut config = DpbConfig::new(64, 64);
        config.capacity = 4;
        config.num_reorder_pics = 4;
        assert!(config.validate().is_err(), "重排深度不小于容量应被拒绝");
    }

    #[test]
    fn test_ctb_layout_rounds_up_and_maps_coordinates() {
        let layout = CtbLayout::new(1920, 1080, 6);
        assert_eq!(layout.width_in_ctbs, 30);
        assert_eq!(layout.height_in_ctbs, 17, "1080/64 应向上取整");
        assert_eq!(layout.ctb_addr(0, 0), Some(0));
        assert_eq!(layout.ctb_addr(65, 64), Some(31));
        assert_eq!(layout.ctb_addr(1920, 0), None, "越界坐标应返回 None");
    }

    #[test]
    fn test_config_deserialize_uses_defaults() {
        let config: DpbConfig =
            serde_json::from_str(r#"{"width": 128, "height": 64}"#).expect("JSON 应可解析");
        assert_eq!(config.capacity, MAX_DPB_SIZE);
        assert_eq!(config.log2_max_poc_lsb, 8);
        assert_eq!(config.log2_ctb_size, 6);
        assert_eq!(config.ctb_layout().ctb_count(), 2);
    }
}
