//! 通用常量.

/// 重要性图权重的数值下限. 重要性图在归一化后最大值为 1,
/// 因此该值同时也是相对于最大值的下限.
pub const IMPORTANCE_FLOOR: f32 = 1e-3;

/// 默认窗口重叠比例.
pub const DEFAULT_OVERLAP: f64 = 0.25;

/// 默认高斯 sigma 相对比例 (相对于窗口边长).
pub const DEFAULT_SIGMA_SCALE: f64 = 0.125;

/// 三次卷积插值核的系数 `a`. 取 -0.75, 与常见深度学习框架的 bicubic 保持一致.
pub const CUBIC_COEFFICIENT: f64 = -0.75;

/// 判断浮点坐标是否为整数时允许的误差.
pub const INTEGER_TOLERANCE: f64 = 1e-6;

/// 支持的空间维数.
pub const SPATIAL_RANKS: [usize; 2] = [2, 3];

/// 空间维度之前的非空间轴个数 (batch 和 channel).
pub const LEADING_AXES: usize = 2;

/// `x` 是否 (在误差范围内) 是整数?
#[inline]
pub fn is_integer(x: f64) -> bool {
    (x - x.round()).abs() < INTEGER_TOLERANCE
}
