//! 解码图像缓冲与分配器.
//!
//! DPB 只持有缓冲句柄的一份引用. 句柄的 `Clone` 即创建新的引用计数别名,
//! 输出给调用方的图像与 DPB 槽位之后的回收互不影响.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{DpbError, DpbResult};

/// 帧缓冲分配器
///
/// 由外部重建阶段实现, DPB 在分配槽位时调用.
pub trait FrameAllocator {
    /// 引用计数的缓冲句柄
    type Handle: Clone;

    /// 为 POC 为 `poc` 的图像分配一块新的缓冲
    fn allocate(&mut self, poc: i32) -> DpbResult<Self::Handle>;
}

/// 解码图像 (YUV420P 平面存储)
#[derive(Debug, Clone)]
pub struct DecodedPicture {
    /// Y/U/V 平面数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 分配时的 POC
    pub poc: i32,
}

/// 单线程共享的解码图像句柄
pub type FrameRef = Rc<RefCell<DecodedPicture>>;

/// 默认分配器: 按 YUV420P 分配中灰平面
#[derive(Debug)]
pub struct PlaneAllocator {
    width: u32,
    height: u32,
    allocated: u64,
}

impl PlaneAllocator {
    /// 创建指定尺寸的分配器
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            allocated: 0,
        }
    }

    /// 累计分配次数
    pub fn allocated(&self) -> u64 {
        self.allocated
    }
}

impl FrameAllocator for PlaneAllocator {
    type Handle = FrameRef;

    fn allocate(&mut self, poc: i32) -> DpbResult<FrameRef> {
        if self.width == 0 || self.height == 0 {
            return Err(DpbError::InvalidArgument(format!(
                "无法分配 {}x{} 的帧缓冲",
                self.width, self.height
            )));
        }
        let w = self.width as usize;
        let h = self.height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        self.allocated += 1;
        Ok(Rc::new(RefCell::new(DecodedPicture {
            data: vec![vec![128u8; w * h], vec![128u8; cw * ch], vec![128u8; cw * ch]],
            linesize: vec![w, cw, cw],
            width: self.width,
            height: self.height,
            poc,
        })))
    }
}
