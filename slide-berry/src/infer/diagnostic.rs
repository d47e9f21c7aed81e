//! 非致命的数值诊断.

use std::fmt;

/// 推理过程中发现, 但不影响结果产出的数值问题.
///
/// 每条诊断在产生时都会以 `warn` 级别写入日志, 同时记录在
/// [`crate::InferOutput::diagnostics`] 中.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// 某输出头的累加缓冲区尺寸 `padded * zoom` 不是整数, 已向下取整.
    NonIntegerOutputShape {
        /// 输出头序号.
        head: usize,
        /// 空间轴序号.
        axis: usize,
        /// 该轴的缩放比例.
        zoom: f64,
    },

    /// 窗口边界按缩放比例映射后不是整数, 已四舍五入.
    NonIntegerWindow {
        /// 输出头序号.
        head: usize,
        /// 空间轴序号.
        axis: usize,
        /// 映射前的窗口起点.
        start: usize,
        /// 映射前的窗口终点.
        stop: usize,
        /// 该轴的缩放比例.
        zoom: f64,
    },

    /// 归一化后的输出中存在 NaN 或 Inf.
    NonFinite {
        /// 输出头序号.
        head: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonIntegerOutputShape { head, axis, zoom } => write!(
                f,
                "输出头 {head} 在轴 {axis} 上的输出尺寸不是整数 (zoom = {zoom}), 已向下取整"
            ),
            Self::NonIntegerWindow {
                head,
                axis,
                start,
                stop,
                zoom,
            } => write!(
                f,
                "输出头 {head} 在轴 {axis} 上的窗口 [{start}, {stop}) 按 zoom = {zoom} 映射后不是整数, \
                 已四舍五入. 建议调整 overlap 或 roi_size, 使 roi_size * (1 - overlap) * zoom 为整数"
            ),
            Self::NonFinite { head } => write!(f, "输出头 {head} 的结果中存在 NaN 或 Inf"),
        }
    }
}

/// 诊断收集器.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// 记录一条诊断并写入日志.
    pub(crate) fn emit(&mut self, d: Diagnostic) {
        log::warn!("{d}");
        self.items.push(d);
    }

    pub(crate) fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
