//! 推理参数.
//!
//! 所有参数都集中在 [`SlidingWindowConfig`] 中. 尺寸类参数既可以是标量
//! (广播到所有空间轴), 也可以是逐轴列表, 因此使用 [`Either`] 表示.

use either::Either;

use crate::consts::{DEFAULT_OVERLAP, DEFAULT_SIGMA_SCALE};
use crate::error::{InferError, InferResult};
use crate::Shape;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 尺寸参数. `Left` 为标量, `Right` 为逐轴列表.
///
/// 分量为 0 时回退到图像在该轴上的尺寸.
pub type SizeSpec = Either<usize, Vec<usize>>;

/// 高斯 sigma 相对比例. `Left` 为标量, `Right` 为逐轴列表.
pub type SigmaSpec = Either<f64, Vec<f64>>;

/// 重叠窗口的融合方式.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlendMode {
    /// 均匀权重, 窗口内所有位置权重均为 1.
    #[default]
    Constant,

    /// 以窗口中心为均值的可分离高斯权重. 中心置信度高, 向边缘平滑衰减.
    Gaussian,
}

/// 图像小于窗口时的填充方式.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PadMode {
    /// 以常数填充.
    Constant(f32),

    /// 镜像填充, 不重复边缘像素 (`dcb|abcd|cba`).
    Reflect,

    /// 重复边缘像素 (`aaa|abcd|ddd`).
    Replicate,

    /// 循环填充 (`bcd|abcd|abc`).
    Circular,
}

impl Default for PadMode {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

/// 计算/缓冲区所在位置.
///
/// 本 crate 的缓冲区全部位于主机内存. `Accelerator` 只作为标记传递给预测器,
/// 由预测器自行决定如何上传数据.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Device {
    /// 主机内存.
    #[default]
    Host,

    /// 编号为 `n` 的加速设备.
    Accelerator(u32),
}

impl Device {
    /// 是否为主机内存.
    #[inline]
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

/// 滑动窗口推理参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SlidingWindowConfig {
    /// 提取窗口 (ROI) 的尺寸.
    pub roi_size: SizeSpec,

    /// 预测器要求的输入分辨率. `None` 时与 `roi_size` 相同.
    pub input_size: Option<SizeSpec>,

    /// 每次调用预测器时的窗口个数.
    pub sw_batch_size: usize,

    /// 相邻窗口的重叠比例, 取值范围 `[0, 1)`.
    pub overlap: f64,

    /// 融合方式.
    pub mode: BlendMode,

    /// 高斯融合的 sigma 相对比例. 仅对 [`BlendMode::Gaussian`] 有效.
    pub sigma_scale: SigmaSpec,

    /// 填充方式.
    pub padding_mode: PadMode,

    /// 预测器执行的位置.
    pub sw_device: Device,

    /// 拼接缓冲区所在的位置. `None` 时跟随 `sw_device`.
    pub device: Option<Device>,

    /// 是否报告进度.
    pub progress: bool,

    /// 是否在 [`crate::SlidingInferer`] 中缓存重要性图.
    pub cache_roi_weight_map: bool,

    /// 空间体素数超过该值时强制在主机内存中拼接.
    pub cpu_thresh: Option<usize>,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            roi_size: Either::Left(0),
            input_size: None,
            sw_batch_size: 1,
            overlap: DEFAULT_OVERLAP,
            mode: BlendMode::Constant,
            sigma_scale: Either::Left(DEFAULT_SIGMA_SCALE),
            padding_mode: PadMode::default(),
            sw_device: Device::Host,
            device: None,
            progress: false,
            cache_roi_weight_map: false,
            cpu_thresh: None,
        }
    }
}

impl SlidingWindowConfig {
    /// 以窗口尺寸 `roi_size` 构建参数, 其余参数取默认值.
    pub fn new(roi_size: SizeSpec) -> Self {
        Self {
            roi_size,
            ..Default::default()
        }
    }

    /// 设置预测器输入分辨率.
    pub fn with_input_size(mut self, input_size: SizeSpec) -> Self {
        self.input_size = Some(input_size);
        self
    }

    /// 设置每批窗口个数.
    pub fn with_batch_size(mut self, sw_batch_size: usize) -> Self {
        self.sw_batch_size = sw_batch_size;
        self
    }

    /// 设置重叠比例.
    pub fn with_overlap(mut self, overlap: f64) -> Self {
        self.overlap = overlap;
        self
    }

    /// 设置融合方式.
    pub fn with_mode(mut self, mode: BlendMode) -> Self {
        self.mode = mode;
        self
    }

    /// 设置高斯 sigma 相对比例.
    pub fn with_sigma_scale(mut self, sigma_scale: SigmaSpec) -> Self {
        self.sigma_scale = sigma_scale;
        self
    }

    /// 设置填充方式.
    pub fn with_padding(mut self, padding_mode: PadMode) -> Self {
        self.padding_mode = padding_mode;
        self
    }

    /// 设置预测器执行位置.
    pub fn with_sw_device(mut self, sw_device: Device) -> Self {
        self.sw_device = sw_device;
        self
    }

    /// 设置拼接缓冲区位置.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// 设置是否报告进度.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// 设置是否缓存重要性图.
    pub fn with_cache(mut self, cache_roi_weight_map: bool) -> Self {
        self.cache_roi_weight_map = cache_roi_weight_map;
        self
    }

    /// 设置强制主机拼接的体素数阈值.
    pub fn with_cpu_thresh(mut self, cpu_thresh: usize) -> Self {
        self.cpu_thresh = Some(cpu_thresh);
        self
    }

    /// 检查与图像无关的参数.
    pub fn validate(&self) -> InferResult<()> {
        check_overlap(self.overlap)?;
        if self.sw_batch_size == 0 {
            return Err(InferError::BatchSize);
        }
        let sigmas = match &self.sigma_scale {
            Either::Left(s) => std::slice::from_ref(s),
            Either::Right(v) => v.as_slice(),
        };
        if let Some(&bad) = sigmas.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(InferError::SigmaScale(bad));
        }
        Ok(())
    }

    /// 按图像空间尺寸 `image_size` 解析窗口尺寸.
    pub fn resolve_roi_size(&self, image_size: &[usize]) -> InferResult<Shape> {
        fall_back_sizes(&self.roi_size, image_size, "roi_size")
    }

    /// 按已解析的窗口尺寸 `roi_size` 解析预测器输入分辨率.
    pub fn resolve_input_size(&self, roi_size: &[usize]) -> InferResult<Shape> {
        match &self.input_size {
            None => Ok(roi_size.to_vec()),
            Some(spec) => fall_back_sizes(spec, roi_size, "input_size"),
        }
    }

    /// 解析逐轴 sigma 比例.
    pub fn resolve_sigma_scale(&self, rank: usize) -> InferResult<Vec<f64>> {
        match &self.sigma_scale {
            Either::Left(s) => Ok(vec![*s; rank]),
            Either::Right(v) if v.len() == rank => Ok(v.clone()),
            Either::Right(v) => Err(InferError::SizeRank {
                name: "sigma_scale",
                expected: rank,
                got: v.len(),
            }),
        }
    }

    /// 决定拼接缓冲区的位置. `voxels` 为图像空间体素个数.
    pub fn stitch_device(&self, voxels: usize) -> Device {
        match self.device {
            Some(d) => d,
            None if self.cpu_thresh.is_some_and(|t| voxels > t) => Device::Host,
            None => self.sw_device,
        }
    }
}

/// 检查重叠比例.
#[inline]
pub(crate) fn check_overlap(overlap: f64) -> InferResult<()> {
    if (0.0..1.0).contains(&overlap) {
        Ok(())
    } else {
        Err(InferError::Overlap(overlap))
    }
}

/// 将 `spec` 展开为逐轴尺寸. 值为 0 的分量回退为 `fallback` 的对应分量.
pub(crate) fn fall_back_sizes(
    spec: &SizeSpec,
    fallback: &[usize],
    name: &'static str,
) -> InferResult<Shape> {
    let raw = match spec {
        Either::Left(s) => vec![*s; fallback.len()],
        Either::Right(v) if v.len() == fallback.len() => v.clone(),
        Either::Right(v) => {
            return Err(InferError::SizeRank {
                name,
                expected: fallback.len(),
                got: v.len(),
            })
        }
    };
    Ok(raw
        .into_iter()
        .zip(fallback)
        .map(|(s, &f)| if s == 0 { f } else { s })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_range() {
        assert!(check_overlap(0.0).is_ok());
        assert!(check_overlap(0.99).is_ok());
        assert!(matches!(check_overlap(1.0), Err(InferError::Overlap(_))));
        assert!(matches!(check_overlap(-0.1), Err(InferError::Overlap(_))));
        assert!(check_overlap(f64::NAN).is_err());
    }

    #[test]
    fn test_fall_back_sizes() {
        let s = fall_back_sizes(&Either::Left(4), &[10, 12], "roi_size").unwrap();
        assert_eq!(s, vec![4, 4]);

        let s = fall_back_sizes(&Either::Right(vec![0, 6]), &[10, 12], "roi_size").unwrap();
        assert_eq!(s, vec![10, 6]);

        let e = fall_back_sizes(&Either::Right(vec![4, 4, 4]), &[10, 12], "roi_size");
        assert!(matches!(
            e,
            Err(InferError::SizeRank {
                expected: 2,
                got: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_input_size_defaults_to_roi() {
        let cfg = SlidingWindowConfig::new(Either::Left(4));
        assert_eq!(cfg.resolve_input_size(&[4, 4]).unwrap(), vec![4, 4]);

        let cfg = cfg.with_input_size(Either::Right(vec![8, 0]));
        assert_eq!(cfg.resolve_input_size(&[4, 4]).unwrap(), vec![8, 4]);
    }

    #[test]
    fn test_validate() {
        let cfg = SlidingWindowConfig::new(Either::Left(4));
        assert!(cfg.validate().is_ok());
        assert!(matches!(
            cfg.clone().with_batch_size(0).validate(),
            Err(InferError::BatchSize)
        ));
        assert!(matches!(
            cfg.clone().with_overlap(1.0).validate(),
            Err(InferError::Overlap(_))
        ));
        assert!(matches!(
            cfg.with_sigma_scale(Either::Right(vec![0.1, -1.0])).validate(),
            Err(InferError::SigmaScale(_))
        ));
    }

    #[test]
    fn test_stitch_device() {
        let cfg = SlidingWindowConfig::new(Either::Left(4)).with_sw_device(Device::Accelerator(0));
        assert_eq!(cfg.stitch_device(100), Device::Accelerator(0));

        let cfg = cfg.with_cpu_thresh(50);
        assert_eq!(cfg.stitch_device(100), Device::Host);
        assert_eq!(cfg.stitch_device(10), Device::Accelerator(0));

        let cfg = cfg.with_device(Device::Accelerator(1));
        assert_eq!(cfg.stitch_device(100), Device::Accelerator(1));
    }
}
