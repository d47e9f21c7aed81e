//! 运行时错误.

use thiserror::Error;

use crate::infer::OutputLayout;

/// 滑动窗口推理的致命错误.
///
/// 任一错误都会中止整个推理调用, 不会返回部分结果.
/// 非致命的数值问题见 [`crate::Diagnostic`].
#[derive(Debug, Error)]
pub enum InferError {
    /// 重叠比例不在 `[0, 1)` 范围内.
    #[error("overlap 必须满足 0 <= overlap < 1, 实际为 {0}")]
    Overlap(f64),

    /// 空间维数不是 2 或 3. 参数为输入的空间维数.
    #[error("输入必须形如 [B, C, H, W] 或 [B, C, D, H, W], 实际空间维数为 {0}")]
    SpatialRank(usize),

    /// 逐轴参数的分量个数与空间维数不符.
    #[error("`{name}` 需要 {expected} 个分量, 实际为 {got}")]
    SizeRank {
        /// 参数名.
        name: &'static str,
        /// 空间维数.
        expected: usize,
        /// 实际分量个数.
        got: usize,
    },

    /// 输入图像存在长度为 0 的轴. 参数为输入形状.
    #[error("输入图像存在长度为 0 的轴: {0:?}")]
    EmptyInput(Vec<usize>),

    /// `sw_batch_size` 为 0.
    #[error("sw_batch_size 必须为正数")]
    BatchSize,

    /// sigma 比例非有限或为负.
    #[error("sigma_scale 必须为有限非负数, 实际为 {0}")]
    SigmaScale(f64),

    /// 构建重要性图时内存不足.
    #[error(
        "构建形状为 {shape:?} 的重要性图时内存不足 (疑似 OOM). \
         请尝试更小的窗口, 或使用 `BlendMode::Constant` 代替 `BlendMode::Gaussian`"
    )]
    ImportanceAlloc {
        /// 窗口形状.
        shape: Vec<usize>,
    },

    /// 预测器的输出结构 (单输出 / 序列 / 映射) 在同一调用的不同批次间不一致.
    #[error("预测器输出结构在批次间不一致: 首批为 {expected}, 当前批为 {got}")]
    OutputLayout {
        /// 首批确定的结构.
        expected: OutputLayout,
        /// 当前批的结构.
        got: OutputLayout,
    },

    /// 预测器某个输出头的形状非法.
    #[error("预测器第 {head} 个输出头形状非法: {shape:?}, 期望 {expected}")]
    HeadShape {
        /// 输出头序号.
        head: usize,
        /// 实际形状.
        shape: Vec<usize>,
        /// 期望的形状描述.
        expected: String,
    },

    /// 底层数组形状错误.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// 预测器调用失败.
    #[error("预测器调用失败: {0}")]
    Predictor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 推理运行时错误.
pub type InferResult<T> = Result<T, InferError>;
