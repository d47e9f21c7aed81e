//! 滑动窗口推理的驱动.
//!
//! 一次调用依次经过: 规划 -> 重要性图 -> 分批执行 -> 加权累加 -> 收尾.
//! 只有累加阶段持有可变状态.

use ndarray::ArrayViewD;

use crate::config::{Device, SlidingWindowConfig};
use crate::consts::{LEADING_AXES, SPATIAL_RANKS};
use crate::error::{InferError, InferResult};
use crate::importance::{importance_map, ImportanceCache, ImportanceSource};
use crate::meta::{ImageMeta, MetaVolume};
use crate::plan::{pad_spatial, ScanPlan};

mod batch;
mod diagnostic;
mod finalize;
mod predictor;
mod progress;
mod stitch;

pub use diagnostic::Diagnostic;
pub use predictor::{OutputLayout, Prediction, Predictor};

use batch::{unit_groups, BatchExecutor};
use diagnostic::Diagnostics;
use progress::Progress;
use stitch::Stitcher;

/// 一次推理调用的结果.
#[derive(Clone, Debug)]
pub struct InferOutput {
    /// 与预测器输出结构一致的结果, 空间尺寸为原图尺寸乘以各输出头的缩放比例.
    pub prediction: Prediction,

    /// 推理过程中产生的非致命诊断.
    pub diagnostics: Vec<Diagnostic>,

    /// 实际使用的拼接位置.
    pub stitch_device: Device,

    /// 输入携带的元数据 (若有), 原样返回.
    pub meta: Option<ImageMeta>,
}

/// 对 `inputs` 做滑动窗口推理.
///
/// `inputs` 形如 `[B, C, H, W]` 或 `[B, C, D, H, W]`. 预测器每次收到形如
/// `[n, C, input_size...]` 的一批块, 其中 `n <= sw_batch_size`.
///
/// # 注意
///
/// 1. 任何配置错误或预测器错误都会中止调用, 不返回部分结果.
/// 2. 非整数的窗口边界映射和结果中的 NaN/Inf 只产生诊断, 见 [`InferOutput::diagnostics`].
pub fn sliding_window_inference<P: Predictor>(
    inputs: ArrayViewD<f32>,
    config: &SlidingWindowConfig,
    predictor: &mut P,
    importance: ImportanceSource,
) -> InferResult<InferOutput> {
    run(inputs, config, predictor, importance, None)
}

/// 对携带元数据的图像做滑动窗口推理. 元数据原样附加到输出上.
pub fn sliding_window_inference_meta<P: Predictor>(
    volume: &MetaVolume,
    config: &SlidingWindowConfig,
    predictor: &mut P,
    importance: ImportanceSource,
) -> InferResult<InferOutput> {
    let mut out = run(volume.data.view(), config, predictor, importance, None)?;
    out.meta = Some(volume.meta.clone());
    Ok(out)
}

/// 检查输入维数, 返回空间尺寸.
fn spatial_size<'a>(inputs: &'a ArrayViewD<f32>) -> InferResult<&'a [usize]> {
    let rank = inputs.ndim().saturating_sub(LEADING_AXES);
    if !SPATIAL_RANKS.contains(&rank) {
        return Err(InferError::SpatialRank(rank));
    }
    if inputs.is_empty() {
        return Err(InferError::EmptyInput(inputs.shape().to_vec()));
    }
    Ok(&inputs.shape()[LEADING_AXES..])
}

fn run<P: Predictor>(
    inputs: ArrayViewD<f32>,
    config: &SlidingWindowConfig,
    predictor: &mut P,
    importance: ImportanceSource,
    device: Option<Device>,
) -> InferResult<InferOutput> {
    config.validate()?;
    let image_size = spatial_size(&inputs)?;
    let rank = image_size.len();
    let batch = inputs.shape()[0];

    let roi_size = config.resolve_roi_size(image_size)?;
    let input_size = config.resolve_input_size(&roi_size)?;
    let sigma_scale = config.resolve_sigma_scale(rank)?;

    let stitch_device = device.unwrap_or_else(|| config.stitch_device(image_size.iter().product()));
    if !stitch_device.is_host() {
        log::debug!("stitching on {stitch_device:?} is kept in host memory");
    }

    let plan = ScanPlan::new(image_size, &roi_size, config.overlap)?;
    log::debug!(
        "sliding window: image {:?} padded to {:?}, roi {:?}, input {:?}, interval {:?}, {} windows x {} images",
        plan.image_size(),
        plan.padded_size(),
        plan.roi_size(),
        input_size,
        plan.interval(),
        plan.num_windows(),
        batch,
    );

    let padded_owned;
    let padded = if plan.is_padded() {
        padded_owned = pad_spatial(inputs.view(), plan.padding(), config.padding_mode);
        padded_owned.view()
    } else {
        inputs.view()
    };

    let importance = importance.resolve(plan.roi_size(), config.mode, &sigma_scale)?;

    let groups = unit_groups(batch, plan.num_windows(), config.sw_batch_size);
    let mut executor = BatchExecutor::new(padded, &plan, &input_size, config.sw_device, predictor);
    let mut stitcher = Stitcher::new(&plan, batch, &importance);
    let mut diags = Diagnostics::default();
    let mut progress = Progress::new(groups.len(), config.progress);

    for units in groups.iter() {
        let heads = executor.run(units)?;
        stitcher.accumulate(units, heads, &mut diags);
        progress.tick();
    }
    progress.finish();

    let layout = executor
        .layout()
        .cloned()
        .ok_or_else(|| InferError::EmptyInput(inputs.shape().to_vec()))?;
    let heads = finalize::finalize(stitcher.into_buffers(), &plan, &mut diags);

    Ok(InferOutput {
        prediction: Prediction::assemble(&layout, heads),
        diagnostics: diags.into_vec(),
        stitch_device,
        meta: None,
    })
}

/// 可复用的滑动窗口推理器.
///
/// 持有一份参数. 开启 `cache_roi_weight_map` 时, 首次调用构建的重要性图会被保留,
/// 之后窗口尺寸相同的调用直接复用.
#[derive(Clone, Debug)]
pub struct SlidingInferer {
    config: SlidingWindowConfig,
    roi_weight_map: Option<ndarray::ArrayD<f32>>,
}

impl SlidingInferer {
    /// 以 `config` 构建推理器. 参数非法时返回错误.
    pub fn new(config: SlidingWindowConfig) -> InferResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            roi_weight_map: None,
        })
    }

    /// 参数.
    #[inline]
    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    /// 已缓存的重要性图.
    #[inline]
    pub fn roi_weight_map(&self) -> Option<&ndarray::ArrayD<f32>> {
        self.roi_weight_map.as_ref()
    }

    /// 推理.
    pub fn infer<P: Predictor>(
        &mut self,
        inputs: ArrayViewD<f32>,
        predictor: &mut P,
    ) -> InferResult<InferOutput> {
        self.infer_inner(inputs, predictor, None)
    }

    /// 在指定的拼接位置上推理, 覆盖参数中的 `device` 与 `cpu_thresh`.
    pub fn infer_on<P: Predictor>(
        &mut self,
        inputs: ArrayViewD<f32>,
        predictor: &mut P,
        device: Device,
    ) -> InferResult<InferOutput> {
        self.infer_inner(inputs, predictor, Some(device))
    }

    /// 使用调用方持有的缓存推理. 不读写推理器自身的缓存.
    pub fn infer_cached<P: Predictor>(
        &self,
        inputs: ArrayViewD<f32>,
        predictor: &mut P,
        cache: &mut ImportanceCache,
    ) -> InferResult<InferOutput> {
        run(inputs, &self.config, predictor, ImportanceSource::Cache(cache), None)
    }

    /// 对携带元数据的图像推理. 元数据原样附加到输出上.
    pub fn infer_meta<P: Predictor>(
        &mut self,
        volume: &MetaVolume,
        predictor: &mut P,
    ) -> InferResult<InferOutput> {
        let mut out = self.infer_inner(volume.data.view(), predictor, None)?;
        out.meta = Some(volume.meta.clone());
        Ok(out)
    }

    fn infer_inner<P: Predictor>(
        &mut self,
        inputs: ArrayViewD<f32>,
        predictor: &mut P,
        device: Option<Device>,
    ) -> InferResult<InferOutput> {
        if !self.config.cache_roi_weight_map {
            return run(inputs, &self.config, predictor, ImportanceSource::Build, device);
        }

        let image_size = spatial_size(&inputs)?;
        let roi_size = self.config.resolve_roi_size(image_size)?;
        let stale = self
            .roi_weight_map
            .as_ref()
            .map_or(true, |m| m.shape() != roi_size.as_slice());
        if stale {
            let sigma_scale = self.config.resolve_sigma_scale(image_size.len())?;
            self.roi_weight_map = Some(importance_map(&roi_size, self.config.mode, &sigma_scale)?);
            log::debug!("sliding inferer: cached importance map for window {roi_size:?}");
        }
        let source = match &self.roi_weight_map {
            Some(map) => ImportanceSource::Precomputed(map),
            None => ImportanceSource::Build,
        };
        run(inputs, &self.config, predictor, source, device)
    }
}
