//! 分批执行.
//!
//! 窗口与 batch 维做笛卡尔积, 共 `batch * num_windows` 个单元, 按 `sw_batch_size`
//! 分组. 每组提取窗口, 拼接为一批, 必要时三次卷积重采样到预测器输入分辨率,
//! 调用一次预测器, 再把每个输出头重采样回窗口分辨率.

use ndarray::{concatenate, ArrayD, ArrayViewD, Axis, Slice};

use crate::config::Device;
use crate::consts::LEADING_AXES;
use crate::error::{InferError, InferResult};
use crate::infer::predictor::{OutputLayout, Predictor};
use crate::plan::ScanPlan;
use crate::resample::{resize, Interpolation};
use crate::Shape;

/// 一个工作单元: 第 `image` 张图像上的第 `window` 个窗口.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Unit {
    pub(crate) image: usize,
    pub(crate) window: usize,
}

/// 将 `batch * num_windows` 个单元按 `sw_batch_size` 分组.
///
/// 单元按图像优先排列: 先遍历第 0 张图像的全部窗口, 再遍历第 1 张, 以此类推.
pub(crate) fn unit_groups(batch: usize, num_windows: usize, sw_batch_size: usize) -> Vec<Vec<Unit>> {
    debug_assert!(sw_batch_size > 0);
    let total = batch * num_windows;
    (0..total)
        .step_by(sw_batch_size)
        .map(|start| {
            (start..(start + sw_batch_size).min(total))
                .map(|g| Unit {
                    image: g / num_windows,
                    window: g % num_windows,
                })
                .collect()
        })
        .collect()
}

/// 分批执行器. 持有预测器, 并记录首批确定的输出结构.
pub(crate) struct BatchExecutor<'a, P> {
    padded: ArrayViewD<'a, f32>,
    plan: &'a ScanPlan,
    input_size: &'a [usize],
    sw_device: Device,
    predictor: &'a mut P,

    layout: Option<OutputLayout>,

    /// 首批每个输出头除 batch 轴以外的形状.
    head_shapes: Vec<Shape>,
}

impl<'a, P: Predictor> BatchExecutor<'a, P> {
    /// `padded` 为已填充的 `[B, C, padded...]` 图像.
    pub(crate) fn new(
        padded: ArrayViewD<'a, f32>,
        plan: &'a ScanPlan,
        input_size: &'a [usize],
        sw_device: Device,
        predictor: &'a mut P,
    ) -> Self {
        Self {
            padded,
            plan,
            input_size,
            sw_device,
            predictor,
            layout: None,
            head_shapes: vec![],
        }
    }

    /// 首批确定的输出结构. 尚未执行任何一批时为 `None`.
    #[inline]
    pub(crate) fn layout(&self) -> Option<&OutputLayout> {
        self.layout.as_ref()
    }

    /// 是否需要在预测前后重采样?
    #[inline]
    fn is_resampling(&self) -> bool {
        self.input_size != self.plan.roi_size()
    }

    /// 执行一组单元, 返回按固定顺序排列, 且已回到窗口分辨率的各输出头.
    pub(crate) fn run(&mut self, units: &[Unit]) -> InferResult<Vec<ArrayD<f32>>> {
        let mut batch = self.extract(units)?;
        if self.is_resampling() {
            batch = resize(batch.view(), self.input_size, Interpolation::Cubic);
        }

        let prediction = self
            .predictor
            .predict(batch, self.sw_device)
            .map_err(|e| InferError::Predictor(Box::new(e)))?;

        let layout = prediction.layout();
        match &self.layout {
            None => self.layout = Some(layout),
            Some(expected) if *expected != layout => {
                return Err(InferError::OutputLayout {
                    expected: expected.clone(),
                    got: layout,
                })
            }
            Some(_) => {}
        }

        let heads = prediction.into_heads();
        self.check_heads(&heads, units.len())?;

        if !self.is_resampling() {
            return Ok(heads);
        }
        Ok(heads
            .into_iter()
            .map(|head| {
                let target = self.window_resolution(&head.shape()[LEADING_AXES..]);
                resize(head.view(), &target, Interpolation::Cubic)
            })
            .collect())
    }

    /// 提取一组窗口, 沿 batch 轴拼接.
    fn extract(&self, units: &[Unit]) -> InferResult<ArrayD<f32>> {
        let windows = self.plan.windows();
        let patches: Vec<ArrayViewD<f32>> = units
            .iter()
            .map(|u| {
                let window = &windows[u.window];
                self.padded.slice_each_axis(|ad| match ad.axis.index() {
                    0 => Slice::from(u.image..u.image + 1),
                    1 => Slice::from(..),
                    k => Slice::from(window[k - LEADING_AXES].clone()),
                })
            })
            .collect();
        Ok(concatenate(Axis(0), &patches)?)
    }

    /// 检查输出头的维数, batch 大小, 以及与首批的一致性.
    fn check_heads(&mut self, heads: &[ArrayD<f32>], group_len: usize) -> InferResult<()> {
        let ndim = self.plan.rank() + LEADING_AXES;
        let first = self.head_shapes.is_empty();
        for (h, head) in heads.iter().enumerate() {
            let shape = head.shape();
            let err = |expected: String| InferError::HeadShape {
                head: h,
                shape: shape.to_vec(),
                expected,
            };
            if shape.len() != ndim {
                return Err(err(format!("{ndim} 维 [batch, channel, spatial...]")));
            }
            if shape[0] != group_len {
                return Err(err(format!("batch 轴长度为 {group_len}")));
            }
            if shape[LEADING_AXES..].contains(&0) {
                return Err(err("空间轴非空".to_string()));
            }
            if first {
                self.head_shapes.push(shape[1..].to_vec());
            } else if self.head_shapes[h] != shape[1..] {
                return Err(err(format!("与首批一致的 {:?}", self.head_shapes[h])));
            }
        }
        Ok(())
    }

    /// 预测器输出空间尺寸对应的窗口分辨率尺寸: `round(spatial * roi / input)`.
    fn window_resolution(&self, spatial: &[usize]) -> Shape {
        spatial
            .iter()
            .zip(self.plan.roi_size())
            .zip(self.input_size)
            .map(|((&s, &r), &i)| ((s as f64 * r as f64 / i as f64).round() as usize).max(1))
            .collect()
    }
}
