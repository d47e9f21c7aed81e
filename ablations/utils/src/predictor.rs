//! 合成预测器.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use ndarray::{ArrayD, ArrayViewD, Axis, Slice};
use slide_berry::prelude::*;

/// 空间轴之前的 batch 轴与 channel 轴.
const LEADING: usize = 2;

/// 盒式均值滤波 (零填充).
///
/// 每个窗口的边缘会 "看到" 填充的 0, 以此模拟感受野受限的分割网络:
/// 窗口拼接处的误差越小, 说明融合方式越好.
#[derive(Copy, Clone, Debug)]
pub struct BoxBlur {
    radius: usize,
}

impl BoxBlur {
    /// 半径为 `radius` 的盒式滤波.
    #[inline]
    pub fn new(radius: usize) -> Self {
        Self { radius }
    }

    /// 直接对整张图像做一次滤波, 用作参照结果.
    pub fn apply(&self, x: ArrayViewD<f32>) -> ArrayD<f32> {
        box_blur(x, self.radius)
    }
}

impl Predictor for BoxBlur {
    type Error = Infallible;

    fn predict(&mut self, batch: ArrayD<f32>, _device: Device) -> Result<Prediction, Infallible> {
        Ok(Prediction::Single(self.apply(batch.view())))
    }
}

/// 沿所有空间轴做可分离的零填充均值滤波.
pub fn box_blur(x: ArrayViewD<f32>, radius: usize) -> ArrayD<f32> {
    let w = 1.0 / (2 * radius + 1) as f32;
    let mut cur = x.to_owned();
    for axis in (LEADING..x.ndim()).map(Axis) {
        let n = cur.len_of(axis);
        let mut out = ArrayD::<f32>::zeros(cur.raw_dim());
        for (j, mut lane) in out.axis_iter_mut(axis).enumerate() {
            for i in j.saturating_sub(radius)..(j + radius + 1).min(n) {
                lane.scaled_add(w, &cur.index_axis(axis, i));
            }
        }
        cur = out;
    }
    cur
}

/// 将内部预测器的输出在每个空间轴上隔点取样, 即缩放比例为 0.5 的输出头.
#[derive(Clone, Debug)]
pub struct Halve<P>(pub P);

impl<P: Predictor> Predictor for Halve<P> {
    type Error = P::Error;

    fn predict(&mut self, batch: ArrayD<f32>, device: Device) -> Result<Prediction, P::Error> {
        let heads = self.0.predict(batch, device)?;
        let layout = heads.layout();
        let halved = heads.into_heads().into_iter().map(|h| halve(h.view())).collect();
        Ok(Prediction::assemble(&layout, halved))
    }
}

/// 空间轴隔点取样.
pub fn halve(x: ArrayViewD<f32>) -> ArrayD<f32> {
    x.slice_each_axis(|ad| {
        if ad.axis.index() < LEADING {
            Slice::from(..)
        } else {
            Slice::new(0, None, 2)
        }
    })
    .to_owned()
}

/// 统计调用次数与耗时的预测器包装.
#[derive(Clone, Debug)]
pub struct Counted<P> {
    inner: P,
    calls: u64,
    busy: Duration,
}

impl<P> Counted<P> {
    /// 包装 `inner`.
    #[inline]
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            calls: 0,
            busy: Duration::ZERO,
        }
    }

    /// 累计调用次数.
    #[inline]
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// 累计在内部预测器中花费的时间.
    #[inline]
    pub fn busy(&self) -> Duration {
        self.busy
    }
}

impl<P: Predictor> Predictor for Counted<P> {
    type Error = P::Error;

    fn predict(&mut self, batch: ArrayD<f32>, device: Device) -> Result<Prediction, P::Error> {
        let since = Instant::now();
        let out = self.inner.predict(batch, device);
        self.busy += since.elapsed();
        self.calls += 1;
        out
    }
}
