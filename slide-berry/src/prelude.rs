//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Shape, Window};

pub use crate::config::{BlendMode, Device, PadMode, SigmaSpec, SizeSpec, SlidingWindowConfig};
pub use crate::error::{InferError, InferResult};

pub use crate::importance::{ImportanceCache, ImportanceSource};
pub use crate::infer::{
    sliding_window_inference, sliding_window_inference_meta, Diagnostic, InferOutput,
    OutputLayout, Prediction, Predictor, SlidingInferer,
};
pub use crate::meta::{ImageMeta, MetaVolume};
pub use crate::plan::ScanPlan;

pub use either::Either;
