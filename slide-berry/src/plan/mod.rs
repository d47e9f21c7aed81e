//! 填充与扫描规划.
//!
//! 给定图像空间尺寸、窗口尺寸和重叠比例, 计算:
//!
//! 1. 每个空间轴两侧的对称填充量, 使填充后的图像在每个轴上都不小于窗口;
//! 2. 覆盖整个填充后图像的窗口位置列表, 相邻窗口的步长为
//!   `round(window * (1 - overlap))`, 且每个轴上最后一个窗口与边界齐平.
//!
//! 扫描计划本身只做纯计算, 不涉及任何数组数据. 实际的数据填充见 [`pad_spatial`].

use itertools::{izip, Itertools};

use crate::config::check_overlap;
use crate::error::{InferError, InferResult};
use crate::{Shape, Window};

mod pad;

pub use pad::pad_spatial;

/// 一次推理调用的扫描计划. 计划在整个调用期间保持不变.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanPlan {
    /// 原始图像空间尺寸.
    image_size: Shape,

    /// 填充后的图像空间尺寸.
    padded_size: Shape,

    /// 窗口尺寸.
    roi_size: Shape,

    /// 每个空间轴的 `(前, 后)` 填充量.
    padding: Vec<(usize, usize)>,

    /// 每个空间轴的扫描步长.
    interval: Shape,

    /// 行优先 (第一个空间轴变化最慢) 的窗口列表.
    windows: Vec<Window>,
}

impl ScanPlan {
    /// 构建扫描计划.
    ///
    /// `overlap` 不在 `[0, 1)` 内时返回 `Err(InferError::Overlap)`;
    /// `roi_size` 与 `image_size` 维数不一致时返回 `Err(InferError::SizeRank)`.
    pub fn new(image_size: &[usize], roi_size: &[usize], overlap: f64) -> InferResult<Self> {
        check_overlap(overlap)?;
        if roi_size.len() != image_size.len() {
            return Err(InferError::SizeRank {
                name: "roi_size",
                expected: image_size.len(),
                got: roi_size.len(),
            });
        }
        if image_size.contains(&0) || roi_size.contains(&0) {
            return Err(InferError::EmptyInput(image_size.to_vec()));
        }

        let padding: Vec<(usize, usize)> = image_size
            .iter()
            .zip(roi_size)
            .map(|(&i, &r)| {
                let diff = r.saturating_sub(i);
                let half = diff / 2;
                (half, diff - half)
            })
            .collect();
        let padded_size: Shape = image_size
            .iter()
            .zip(roi_size)
            .map(|(&i, &r)| i.max(r))
            .collect();
        let interval = scan_interval(&padded_size, roi_size, overlap);
        let windows = dense_windows(&padded_size, roi_size, &interval);

        Ok(Self {
            image_size: image_size.to_vec(),
            padded_size,
            roi_size: roi_size.to_vec(),
            padding,
            interval,
            windows,
        })
    }

    /// 原始图像空间尺寸.
    #[inline]
    pub fn image_size(&self) -> &[usize] {
        &self.image_size
    }

    /// 填充后的图像空间尺寸.
    #[inline]
    pub fn padded_size(&self) -> &[usize] {
        &self.padded_size
    }

    /// 窗口尺寸. 由于图像已被填充到不小于窗口, 这也是有效窗口的尺寸.
    #[inline]
    pub fn roi_size(&self) -> &[usize] {
        &self.roi_size
    }

    /// 每个空间轴的 `(前, 后)` 填充量.
    #[inline]
    pub fn padding(&self) -> &[(usize, usize)] {
        &self.padding
    }

    /// 每个空间轴的扫描步长.
    #[inline]
    pub fn interval(&self) -> &[usize] {
        &self.interval
    }

    /// 全部窗口.
    #[inline]
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// 单张图像的窗口个数.
    #[inline]
    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }

    /// 空间维数.
    #[inline]
    pub fn rank(&self) -> usize {
        self.image_size.len()
    }

    /// 是否存在填充?
    #[inline]
    pub fn is_padded(&self) -> bool {
        self.padding.iter().any(|&(a, b)| a + b > 0)
    }

    /// 原始图像在填充后坐标系中所占的区域.
    pub fn unpadded_region(&self) -> Window {
        self.padding
            .iter()
            .zip(&self.image_size)
            .map(|(&(before, _), &len)| before..before + len)
            .collect()
    }
}

/// 计算每个空间轴的扫描步长.
///
/// 当图像与窗口在某轴上等长时, 该轴只有一个窗口, 步长取窗口长度.
/// 否则步长为 `round(roi * (1 - overlap))`, 且至少为 1.
pub fn scan_interval(image_size: &[usize], roi_size: &[usize], overlap: f64) -> Shape {
    image_size
        .iter()
        .zip(roi_size)
        .map(|(&i, &r)| {
            if r == i {
                r
            } else {
                ((r as f64 * (1.0 - overlap)).round() as usize).max(1)
            }
        })
        .collect()
}

/// 枚举覆盖 `image_size` 的全部窗口.
///
/// 各轴起点做笛卡尔积, 第一个空间轴变化最慢.
pub fn dense_windows(image_size: &[usize], roi_size: &[usize], interval: &[usize]) -> Vec<Window> {
    izip!(image_size, roi_size, interval)
        .map(|(&i, &r, &s)| axis_starts(i, r, s))
        .multi_cartesian_product()
        .map(|starts| {
            starts
                .into_iter()
                .zip(roi_size)
                .map(|(s, &r)| s..s + r)
                .collect()
        })
        .collect()
}

/// 单轴上所有窗口的起点. 最后一个窗口与边界齐平.
///
/// 要求 `image >= roi` 且 `interval > 0`.
fn axis_starts(image: usize, roi: usize, interval: usize) -> Vec<usize> {
    debug_assert!(image >= roi && interval > 0);
    let mut starts = Vec::with_capacity(image / interval + 1);
    let mut s = 0;
    while s + roi < image {
        starts.push(s);
        s += interval;
    }
    starts.push(image - roi);
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Range;

    fn range_len(r: &Range<usize>) -> usize {
        r.end - r.start
    }

    /// 统计每个体素被多少个窗口覆盖 (仅 2D).
    fn coverage_2d(plan: &ScanPlan) -> Vec<Vec<usize>> {
        let (h, w) = (plan.padded_size()[0], plan.padded_size()[1]);
        let mut cov = vec![vec![0usize; w]; h];
        for win in plan.windows() {
            for row in cov[win[0].clone()].iter_mut() {
                for c in row[win[1].clone()].iter_mut() {
                    *c += 1;
                }
            }
        }
        cov
    }

    #[test]
    fn test_axis_starts_flush() {
        assert_eq!(axis_starts(10, 4, 2), vec![0, 2, 4, 6]);
        assert_eq!(axis_starts(7, 4, 2), vec![0, 2, 3]);
        assert_eq!(axis_starts(4, 4, 4), vec![0]);
        assert_eq!(axis_starts(9, 4, 4), vec![0, 4, 5]);
        assert_eq!(axis_starts(5, 1, 1), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_scan_interval() {
        assert_eq!(scan_interval(&[10, 4], &[4, 4], 0.5), vec![2, 4]);
        // round(5 * 0.75) = round(3.75) = 4
        assert_eq!(scan_interval(&[12], &[5], 0.25), vec![4]);
        // 至少为 1
        assert_eq!(scan_interval(&[12], &[1], 0.9), vec![1]);
    }

    #[test]
    fn test_overlap_error() {
        assert!(matches!(
            ScanPlan::new(&[10, 10], &[4, 4], 1.0),
            Err(InferError::Overlap(_))
        ));
        assert!(matches!(
            ScanPlan::new(&[10, 10], &[4, 4], -0.25),
            Err(InferError::Overlap(_))
        ));
    }

    #[test]
    fn test_rank_mismatch() {
        assert!(matches!(
            ScanPlan::new(&[10, 10], &[4, 4, 4], 0.0),
            Err(InferError::SizeRank { .. })
        ));
    }

    #[test]
    fn test_plan_basic() {
        let plan = ScanPlan::new(&[10, 10], &[4, 4], 0.5).unwrap();
        assert!(!plan.is_padded());
        assert_eq!(plan.padded_size(), &[10, 10]);
        assert_eq!(plan.interval(), &[2, 2]);
        assert_eq!(plan.num_windows(), 16);
        assert_eq!(plan.windows()[0], vec![0..4, 0..4]);
        assert_eq!(plan.windows()[1], vec![0..4, 2..6]);
        assert_eq!(plan.windows()[15], vec![6..10, 6..10]);
    }

    #[test]
    fn test_plan_small_image_padding() {
        let plan = ScanPlan::new(&[5, 8], &[8, 8], 0.25).unwrap();
        assert!(plan.is_padded());
        assert_eq!(plan.padding(), &[(1, 2), (0, 0)]);
        assert_eq!(plan.padded_size(), &[8, 8]);
        assert_eq!(plan.num_windows(), 1);
        assert_eq!(plan.unpadded_region(), vec![1..6, 0..8]);
    }

    /// 所有配置下, 填充后图像的每个位置至少被一个窗口覆盖.
    #[test]
    fn test_full_coverage() {
        for (h, w) in [(10, 10), (7, 13), (3, 17), (16, 5), (31, 9)] {
            for (rh, rw) in [(4, 4), (5, 3), (8, 8), (1, 2)] {
                for overlap in [0.0, 0.25, 0.5, 0.75, 0.9] {
                    let plan = ScanPlan::new(&[h, w], &[rh, rw], overlap).unwrap();
                    let cov = coverage_2d(&plan);
                    assert!(
                        cov.iter().flatten().all(|&c| c > 0),
                        "({h}, {w}) / ({rh}, {rw}) / {overlap} 存在未覆盖区域"
                    );
                    for win in plan.windows() {
                        for (r, &p) in win.iter().zip(plan.padded_size()) {
                            assert!(r.end <= p);
                        }
                        assert_eq!(range_len(&win[0]), rh);
                        assert_eq!(range_len(&win[1]), rw);
                    }
                }
            }
        }
    }

    #[test]
    fn test_plan_3d() {
        let plan = ScanPlan::new(&[6, 6, 6], &[4, 4, 4], 0.5).unwrap();
        assert_eq!(plan.interval(), &[2, 2, 2]);
        assert_eq!(plan.num_windows(), 8);
        assert_eq!(plan.windows()[1], vec![0..4, 0..4, 2..6]);
        assert_eq!(plan.windows()[7], vec![2..6, 2..6, 2..6]);
    }
}
