#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供面向 2D/3D 图像分割的滑动窗口 (sliding-window) 分块推理与拼接引擎.
//!
//! 给定一个大尺寸的多维图像 (形如 `[B, C, spatial...]`) 和一个只接受固定尺寸块的预测器,
//! 引擎会将图像划分为互相重叠的窗口, 分批调用预测器, 再按空间重要性权重融合重叠部分,
//! 最终拼接出完整分辨率的结果.
//!
//! 该 crate 目前仅提供 `safe` 接口. 所有缓冲区都位于主机内存 (`ndarray`) 中.
//!
//! # 流程
//!
//! 每次推理调用严格按照以下顺序执行, 不存在跨调用的状态
//! (调用方显式持有的 [`ImportanceCache`] 除外):
//!
//! 1. 填充与扫描规划 ([`plan`]): 计算对称填充量, 枚举所有窗口位置;
//! 2. 重要性图构建 ([`importance`]): 均匀或高斯权重, 并保证全部权重严格为正;
//! 3. 分批执行 (`infer::batch`): 提取窗口, 必要时重采样到预测器的输入分辨率,
//!   调用预测器, 再把结果重采样回窗口分辨率;
//! 4. 加权累加 (`infer::stitch`): 按缩放比例把每个窗口的预测累加进全图缓冲区;
//! 5. 收尾 (`infer::finalize`): 归一化, 去除填充, 按预测器的输出结构重新组装.
//!
//! # 注意
//!
//! 1. 输入必须带 batch 维和 channel 维, 空间维数只能是 2 或 3.
//! 2. 非整数缩放导致的窗口边界取整, 以及结果中的 NaN/Inf, 均只产生诊断信息
//!   ([`Diagnostic`]), 不会中止推理.
//! 3. 预测器的任何错误都会立即中止整个调用, 不返回部分结果.
//!
//! # 开发计划
//!
//! ### 扫描规划与对称填充 ✅
//!
//! 实现位于 `slide-berry/src/plan`.
//!
//! ### 均匀/高斯重要性图, 及调用方持有的缓存 ✅
//!
//! 实现位于 `slide-berry/src/importance`.
//!
//! ### 三次卷积/最近邻重采样 ✅
//!
//! 2D 下即 bicubic, 3D 下按轴分离地做 tricubic.
//!
//! 实现位于 `slide-berry/src/resample`.
//!
//! ### 提取分辨率与预测器输入分辨率解耦 ✅
//!
//! 实现位于 `slide-berry/src/infer/batch.rs`.
//!
//! ### 多输出头, 多分辨率输出 ✅
//!
//! 实现位于 `slide-berry/src/infer/stitch.rs`.
//!
//! ### 批次间流水线 (提取第 n+1 批的同时执行第 n 批) ⌛️
//!
//! 累加满足交换律, 因此只需把累加步骤加锁即可.

use std::ops::Range;

/// 单个窗口在填充后图像上的位置: 每个空间轴一个左闭右开区间.
pub type Window = Vec<Range<usize>>;

/// 空间形状.
pub type Shape = Vec<usize>;

pub mod config;
pub mod consts;
mod error;
pub mod importance;
pub mod infer;
pub mod meta;
pub mod plan;
pub mod prelude;
pub mod resample;

pub use config::{BlendMode, Device, PadMode, SigmaSpec, SizeSpec, SlidingWindowConfig};
pub use error::{InferError, InferResult};
pub use importance::{ImportanceCache, ImportanceSource};
pub use infer::{
    sliding_window_inference, sliding_window_inference_meta, Diagnostic, InferOutput,
    OutputLayout, Prediction, Predictor, SlidingInferer,
};
pub use meta::{ImageMeta, MetaVolume};
pub use plan::ScanPlan;
