//! 加权累加.
//!
//! 每个输出头持有一对缓冲区: 输出缓冲区 `[B, C, out...]` 累加加权预测,
//! 计数缓冲区 `[B, 1, out...]` 累加权重. 其中 `out = floor(padded * zoom)`,
//! `zoom` 为该输出头空间尺寸与窗口尺寸之比. 缓冲区在该输出头第一次出现时分配.
//!
//! 这里只做累加, 不做归一化, 因此累加顺序不影响结果 (浮点求和顺序除外).

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};

use crate::consts::{is_integer, INTEGER_TOLERANCE, LEADING_AXES};
use crate::infer::batch::Unit;
use crate::infer::diagnostic::{Diagnostic, Diagnostics};
use crate::plan::ScanPlan;
use crate::resample::{resize, Interpolation};
use crate::{Shape, Window};

/// 单个输出头的累加缓冲区.
#[derive(Debug)]
pub(crate) struct HeadBuffer {
    /// 加权预测之和, `[B, C, out...]`.
    pub(crate) output: ArrayD<f32>,

    /// 权重之和, `[B, 1, out...]`.
    pub(crate) count: ArrayD<f32>,

    /// 逐轴缩放比例.
    pub(crate) zoom: Vec<f64>,
}

impl HeadBuffer {
    /// 缓冲区空间尺寸.
    #[inline]
    fn spatial(&self) -> &[usize] {
        &self.count.shape()[LEADING_AXES..]
    }
}

/// 累加器.
pub(crate) struct Stitcher<'a> {
    plan: &'a ScanPlan,
    batch: usize,

    /// 窗口分辨率下的重要性图.
    importance: &'a ArrayD<f32>,

    /// 按空间尺寸缓存的最近邻缩放后的重要性图.
    resized: HashMap<Shape, ArrayD<f32>>,

    heads: Vec<HeadBuffer>,

    /// 已报告过的非整数窗口边界 `(head, axis, start, stop)`.
    reported: HashSet<(usize, usize, usize, usize)>,
}

impl<'a> Stitcher<'a> {
    /// `batch` 为输入图像的 batch 大小.
    pub(crate) fn new(plan: &'a ScanPlan, batch: usize, importance: &'a ArrayD<f32>) -> Self {
        Self {
            plan,
            batch,
            importance,
            resized: HashMap::new(),
            heads: vec![],
            reported: HashSet::new(),
        }
    }

    /// 把一组单元的预测累加进缓冲区.
    ///
    /// `heads[h]` 形如 `[units.len(), C_h, spatial_h...]`, 已处于窗口分辨率 (或其缩放).
    pub(crate) fn accumulate(
        &mut self,
        units: &[Unit],
        heads: Vec<ArrayD<f32>>,
        diags: &mut Diagnostics,
    ) {
        for (h, head) in heads.into_iter().enumerate() {
            let spatial = head.shape()[LEADING_AXES..].to_vec();
            if h == self.heads.len() {
                let buffer = self.allocate(h, head.shape()[1], &spatial, diags);
                self.heads.push(buffer);
            }

            let importance = self
                .resized
                .entry(spatial.clone())
                .or_insert_with(|| resize(self.importance.view(), &spatial, Interpolation::Nearest));

            for (n, unit) in units.iter().enumerate() {
                let window = &self.plan.windows()[unit.window];
                let target = remap_window(
                    h,
                    window,
                    &self.heads[h].zoom,
                    &spatial,
                    self.heads[h].spatial(),
                    &mut self.reported,
                    diags,
                );
                let buffer = &mut self.heads[h];
                add_weighted(buffer, unit.image, &target, head.index_axis(Axis(0), n), importance);
            }
        }
    }

    /// 为第 `h` 个输出头分配缓冲区.
    fn allocate(
        &self,
        h: usize,
        channels: usize,
        spatial: &[usize],
        diags: &mut Diagnostics,
    ) -> HeadBuffer {
        let zoom: Vec<f64> = spatial
            .iter()
            .zip(self.plan.roi_size())
            .map(|(&s, &r)| s as f64 / r as f64)
            .collect();

        let mut out: Shape = Vec::with_capacity(spatial.len());
        for (axis, (&p, &z)) in self.plan.padded_size().iter().zip(&zoom).enumerate() {
            let len = p as f64 * z;
            if !is_integer(len) {
                diags.emit(Diagnostic::NonIntegerOutputShape { head: h, axis, zoom: z });
            }
            out.push((len + INTEGER_TOLERANCE).floor() as usize);
        }

        let mut out_shape = vec![self.batch, channels];
        out_shape.extend_from_slice(&out);
        let mut count_shape = vec![self.batch, 1];
        count_shape.extend_from_slice(&out);
        log::debug!("stitch: head {h} zoom {zoom:?}, buffer {out_shape:?}");

        HeadBuffer {
            output: ArrayD::zeros(IxDyn(&out_shape)),
            count: ArrayD::zeros(IxDyn(&count_shape)),
            zoom,
        }
    }

    /// 取出全部缓冲区.
    pub(crate) fn into_buffers(self) -> Vec<HeadBuffer> {
        self.heads
    }
}

/// 将窗口映射到缓冲区坐标.
///
/// 起点为 `round(start * zoom)`, 区域长度等于预测的空间长度, 起点被钳制以保证区域
/// 不越过缓冲区. 映射后的边界不是整数时产生诊断, 相同边界只报告一次.
fn remap_window(
    head: usize,
    window: &Window,
    zoom: &[f64],
    spatial: &[usize],
    buffer: &[usize],
    reported: &mut HashSet<(usize, usize, usize, usize)>,
    diags: &mut Diagnostics,
) -> Vec<Range<usize>> {
    window
        .iter()
        .zip(zoom)
        .zip(spatial.iter().zip(buffer))
        .enumerate()
        .map(|(axis, ((r, &z), (&len, &buf)))| {
            let start = r.start as f64 * z;
            let stop = r.end as f64 * z;
            if !(is_integer(start) && is_integer(stop)) && reported.insert((head, axis, r.start, r.end))
            {
                diags.emit(Diagnostic::NonIntegerWindow {
                    head,
                    axis,
                    start: r.start,
                    stop: r.end,
                    zoom: z,
                });
            }
            let s = (start.round() as usize).min(buf.saturating_sub(len));
            s..s + len
        })
        .collect()
}

/// `output[image, :, target] += importance * pred`, `count[image, 0, target] += importance`.
fn add_weighted(
    buffer: &mut HeadBuffer,
    image: usize,
    target: &[Range<usize>],
    pred: ArrayViewD<f32>,
    importance: &ArrayD<f32>,
) {
    let weighted = &pred * importance;

    let mut out = buffer.output.index_axis_mut(Axis(0), image);
    let mut region = out.slice_each_axis_mut(|ad| match ad.axis.index() {
        0 => Slice::from(..),
        k => Slice::from(target[k - 1].clone()),
    });
    region += &weighted;

    let mut count = buffer.count.index_axis_mut(Axis(0), image);
    let mut count = count.index_axis_mut(Axis(0), 0);
    let mut region = count.slice_each_axis_mut(|ad| Slice::from(target[ad.axis.index()].clone()));
    region += importance;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlendMode;
    use crate::importance::importance_map;

    #[test]
    fn test_count_is_window_coverage() {
        let plan = ScanPlan::new(&[6, 6], &[4, 4], 0.5).unwrap();
        let imp = importance_map(&[4, 4], BlendMode::Constant, &[0.0, 0.0]).unwrap();
        let mut stitcher = Stitcher::new(&plan, 1, &imp);
        let mut diags = Diagnostics::default();

        let units: Vec<Unit> = (0..plan.num_windows())
            .map(|w| Unit { image: 0, window: w })
            .collect();
        let pred = ArrayD::from_elem(IxDyn(&[units.len(), 2, 4, 4]), 1.0f32);
        stitcher.accumulate(&units, vec![pred], &mut diags);

        let buffers = stitcher.into_buffers();
        assert_eq!(buffers.len(), 1);
        let b = &buffers[0];
        assert_eq!(b.output.shape(), &[1, 2, 6, 6]);
        assert_eq!(b.count.shape(), &[1, 1, 6, 6]);
        // 步长 2, 窗口 [0..4, 2..6]: 中间两行/列被覆盖两次.
        assert_eq!(b.count[[0, 0, 0, 0].as_slice()], 1.0);
        assert_eq!(b.count[[0, 0, 2, 0].as_slice()], 2.0);
        assert_eq!(b.count[[0, 0, 3, 3].as_slice()], 4.0);
        assert_eq!(b.output[[0, 1, 3, 3].as_slice()], 4.0);
        assert!(diags.into_vec().is_empty());
    }

    #[test]
    fn test_zoomed_head() {
        let plan = ScanPlan::new(&[8, 8], &[4, 4], 0.0).unwrap();
        let imp = importance_map(&[4, 4], BlendMode::Constant, &[0.0, 0.0]).unwrap();
        let mut stitcher = Stitcher::new(&plan, 1, &imp);
        let mut diags = Diagnostics::default();

        let units = [Unit { image: 0, window: 3 }];
        let pred = ArrayD::from_elem(IxDyn(&[1, 1, 8, 8]), 5.0f32);
        stitcher.accumulate(&units, vec![pred], &mut diags);

        let b = &stitcher.into_buffers()[0];
        assert_eq!(b.zoom, vec![2.0, 2.0]);
        assert_eq!(b.output.shape(), &[1, 1, 16, 16]);
        assert_eq!(b.count[[0, 0, 8, 8].as_slice()], 1.0);
        assert_eq!(b.count[[0, 0, 7, 7].as_slice()], 0.0);
        assert_eq!(b.output[[0, 0, 15, 15].as_slice()], 5.0);
    }

    #[test]
    fn test_remap_non_integer() {
        let mut reported = HashSet::new();
        let mut diags = Diagnostics::default();
        let window = vec![3..7, 0..4];
        let target = remap_window(0, &window, &[0.5, 0.5], &[2, 2], &[3, 3], &mut reported, &mut diags);
        // round(1.5) = 2, 钳制到 3 - 2 = 1.
        assert_eq!(target, vec![1..3, 0..2]);
        remap_window(0, &window, &[0.5, 0.5], &[2, 2], &[3, 3], &mut reported, &mut diags);
        let diags = diags.into_vec();
        assert_eq!(diags.len(), 1);
        assert!(matches!(
            diags[0],
            Diagnostic::NonIntegerWindow {
                axis: 0,
                start: 3,
                stop: 7,
                ..
            }
        ));
    }
}
