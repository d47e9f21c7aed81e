//! 携带元数据的图像.

use ndarray::ArrayD;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 图像的辅助元数据. 推理过程不读取也不修改它, 只原样附加到输出上.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageMeta {
    /// 体素坐标到世界坐标的仿射矩阵.
    pub affine: [[f64; 4]; 4],

    /// 逐空间轴的体素间距.
    pub spacing: Vec<f64>,
}

impl Default for ImageMeta {
    fn default() -> Self {
        let mut affine = [[0.0; 4]; 4];
        for (i, row) in affine.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self {
            affine,
            spacing: vec![],
        }
    }
}

/// 形如 `[B, C, spatial...]` 的图像及其元数据.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaVolume {
    /// 图像数据.
    pub data: ArrayD<f32>,

    /// 元数据.
    pub meta: ImageMeta,
}

impl MetaVolume {
    /// 组合数据与元数据.
    #[inline]
    pub fn new(data: ArrayD<f32>, meta: ImageMeta) -> Self {
        Self { data, meta }
    }
}
