//! 实验配置.

use slide_berry::prelude::*;

/// 一组消融配置.
#[derive(Clone, Debug)]
pub struct Case {
    /// 配置名.
    pub name: &'static str,

    /// 推理参数.
    pub config: SlidingWindowConfig,

    /// 预测器是否输出半分辨率结果.
    pub halved: bool,
}

impl Case {
    fn new(name: &'static str, config: SlidingWindowConfig) -> Self {
        Self {
            name,
            config,
            halved: false,
        }
    }

    fn halved(mut self) -> Self {
        self.halved = true;
        self
    }
}

/// 窗口边长.
pub const ROI: usize = 32;

/// 全部配置. 每项配置在独立线程中运行.
pub fn all_cases() -> Vec<Case> {
    let base = SlidingWindowConfig::new(Either::Left(ROI)).with_batch_size(4);
    let gaussian = base.clone().with_mode(BlendMode::Gaussian);
    vec![
        Case::new("constant-0", base.clone().with_overlap(0.0)),
        Case::new("constant-0.25", base.clone().with_overlap(0.25)),
        Case::new("constant-0.5", base.clone().with_overlap(0.5)),
        Case::new("gaussian-0.25", gaussian.clone().with_overlap(0.25)),
        Case::new("gaussian-0.5", gaussian.clone().with_overlap(0.5)),
        Case::new(
            "gaussian-0.5-wide",
            gaussian
                .clone()
                .with_overlap(0.5)
                .with_sigma_scale(Either::Left(0.25)),
        ),
        Case::new(
            "gaussian-0.5-input2x",
            gaussian
                .clone()
                .with_overlap(0.5)
                .with_input_size(Either::Left(2 * ROI)),
        ),
        Case::new("gaussian-0.5-halved", gaussian.with_overlap(0.5)).halved(),
    ]
}
