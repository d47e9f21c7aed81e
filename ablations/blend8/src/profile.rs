//! 实验运行统计.

use std::time::{Duration, Instant};

/// ablation/benchmark 计时器.
///
/// 支持多次 "开始-结束" 区间的累加.
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时会视为已经开始计时 (`self.start()`).
    #[inline]
    pub fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    /// 开始计时.
    #[inline]
    pub fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    ///
    /// # 注意
    ///
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    pub fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 累计时长 (微秒).
    #[inline]
    pub fn get_total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

impl Default for AccTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// 单组配置的统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 成功推理的图像个数.
    images: u64,

    /// 推理失败, 或输出形状与参照不符的图像个数.
    failures: u64,

    /// 预测器调用总次数.
    calls: u64,

    /// 推理总耗时 (包括预测器).
    infer_time: AccTimer,

    /// 预测器内部总耗时.
    predictor_time: Duration,

    /// 单张图像的最长推理耗时.
    most: Option<Duration>,

    /// 逐图像平均绝对误差之和.
    mae_sum: f64,

    /// 全部图像上的最大绝对误差.
    max_abs: f64,

    /// 诊断条数.
    diagnostics: u64,
}

impl Profile {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self {
            images: 0,
            failures: 0,
            calls: 0,
            infer_time: AccTimer::default(),
            predictor_time: Duration::ZERO,
            most: None,
            mae_sum: 0.0,
            max_abs: 0.0,
            diagnostics: 0,
        }
    }

    /// 开始一次推理计时.
    #[inline]
    pub fn infer_start(&mut self) {
        self.infer_time.start();
    }

    /// 结束一次推理计时.
    #[inline]
    pub fn infer_elapsed(&mut self) {
        let d = self.infer_time.elapsed();
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
    }

    /// 记录预测器调用.
    #[inline]
    pub fn count_calls(&mut self, calls: u64, busy: Duration) {
        self.calls += calls;
        self.predictor_time += busy;
    }

    /// 记录一次成功推理的误差与诊断数.
    #[inline]
    pub fn count_image(&mut self, mae: f64, max_abs: f64, diagnostics: usize) {
        self.images += 1;
        self.mae_sum += mae;
        self.max_abs = self.max_abs.max(max_abs);
        self.diagnostics += diagnostics as u64;
    }

    /// 记录一次失败.
    #[inline]
    pub fn count_failure(&mut self) {
        self.failures += 1;
    }

    /// 成功图像个数.
    #[inline]
    pub fn get_images(&self) -> u64 {
        self.images
    }

    /// 失败个数.
    #[inline]
    pub fn get_failures(&self) -> u64 {
        self.failures
    }

    /// 预测器调用总次数.
    #[inline]
    pub fn get_calls(&self) -> u64 {
        self.calls
    }

    /// 推理总耗时 (微秒).
    #[inline]
    pub fn get_infer_time_us(&self) -> u64 {
        self.infer_time.get_total_us()
    }

    /// 预测器内部总耗时 (微秒).
    #[inline]
    pub fn get_predictor_time_us(&self) -> u64 {
        self.predictor_time.as_micros() as u64
    }

    /// 最长单次推理耗时.
    #[inline]
    pub fn get_most_time_consuming(&self) -> Option<Duration> {
        self.most
    }

    /// 平均绝对误差的图像平均.
    #[inline]
    pub fn get_avg_mae(&self) -> Option<f64> {
        match self.images {
            0 => None,
            n => Some(self.mae_sum / n as f64),
        }
    }

    /// 最大绝对误差.
    #[inline]
    pub fn get_max_abs(&self) -> f64 {
        self.max_abs
    }

    /// 诊断条数.
    #[inline]
    pub fn get_diagnostics(&self) -> u64 {
        self.diagnostics
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
