//! 预测器接口与预测结果容器.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use ndarray::ArrayD;

use crate::config::Device;

/// 预测器一次调用的输出.
///
/// 预测器可以返回单个数组, 有序的数组序列, 或以字符串为键的数组映射.
/// 每个数组称为一个输出头 (head), 布局均为 `[batch, channel, spatial...]`,
/// 且 batch 顺序与输入一致.
#[derive(Clone, Debug, PartialEq)]
pub enum Prediction {
    /// 单个输出.
    Single(ArrayD<f32>),

    /// 有序的多个输出.
    Seq(Vec<ArrayD<f32>>),

    /// 命名的多个输出. 键按字典序排列.
    Map(BTreeMap<String, ArrayD<f32>>),
}

/// 预测结果的结构 (不含数据). 由首批预测确定, 之后的每一批都必须与之一致.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputLayout {
    /// 单个输出.
    Single,

    /// 指定长度的序列.
    Seq(usize),

    /// 指定键集合的映射 (有序).
    Map(Vec<String>),
}

impl fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "单个数组"),
            Self::Seq(n) => write!(f, "长度为 {n} 的序列"),
            Self::Map(keys) => write!(f, "键为 {keys:?} 的映射"),
        }
    }
}

impl OutputLayout {
    /// 输出头个数.
    #[inline]
    pub fn num_heads(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Seq(n) => *n,
            Self::Map(keys) => keys.len(),
        }
    }
}

impl Prediction {
    /// 结构描述.
    pub fn layout(&self) -> OutputLayout {
        match self {
            Self::Single(_) => OutputLayout::Single,
            Self::Seq(v) => OutputLayout::Seq(v.len()),
            Self::Map(m) => OutputLayout::Map(m.keys().cloned().collect()),
        }
    }

    /// 按固定顺序拆出所有输出头. 映射按键的字典序.
    pub fn into_heads(self) -> Vec<ArrayD<f32>> {
        match self {
            Self::Single(a) => vec![a],
            Self::Seq(v) => v,
            Self::Map(m) => m.into_values().collect(),
        }
    }

    /// 以 `layout` 把按顺序排列的输出头重新组装. [`Prediction::into_heads`] 的逆操作.
    ///
    /// 要求 `heads.len() == layout.num_heads()`.
    pub fn assemble(layout: &OutputLayout, heads: Vec<ArrayD<f32>>) -> Self {
        debug_assert_eq!(layout.num_heads(), heads.len());
        match layout {
            OutputLayout::Single => match heads.into_iter().next() {
                Some(a) => Self::Single(a),
                None => Self::Seq(vec![]),
            },
            OutputLayout::Seq(_) => Self::Seq(heads),
            OutputLayout::Map(keys) => Self::Map(keys.iter().cloned().zip(heads).collect()),
        }
    }

    /// 输出头个数.
    #[inline]
    pub fn num_heads(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Seq(v) => v.len(),
            Self::Map(m) => m.len(),
        }
    }

    /// 若为单个输出, 返回它.
    pub fn as_single(&self) -> Option<&ArrayD<f32>> {
        match self {
            Self::Single(a) => Some(a),
            _ => None,
        }
    }

    /// 按序号获取输出头. 映射按键的字典序计数.
    pub fn head(&self, index: usize) -> Option<&ArrayD<f32>> {
        match self {
            Self::Single(a) => (index == 0).then_some(a),
            Self::Seq(v) => v.get(index),
            Self::Map(m) => m.values().nth(index),
        }
    }

    /// 按键获取映射中的输出头.
    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        match self {
            Self::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// 取出单个输出.
    pub fn into_single(self) -> Option<ArrayD<f32>> {
        match self {
            Self::Single(a) => Some(a),
            _ => None,
        }
    }
}

impl From<ArrayD<f32>> for Prediction {
    fn from(value: ArrayD<f32>) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<ArrayD<f32>>> for Prediction {
    fn from(value: Vec<ArrayD<f32>>) -> Self {
        Self::Seq(value)
    }
}

impl From<BTreeMap<String, ArrayD<f32>>> for Prediction {
    fn from(value: BTreeMap<String, ArrayD<f32>>) -> Self {
        Self::Map(value)
    }
}

/// 预测器. 接受一批固定尺寸的块, 返回同样 batch 顺序的预测.
///
/// 额外参数 (模型权重, 推理开关等) 由实现者自身的字段或闭包捕获的状态携带,
/// 每次调用都会原样生效.
pub trait Predictor {
    /// 预测失败时的错误.
    type Error: Error + Send + Sync + 'static;

    /// 对形如 `[n, C, input_size...]` 的一批块做预测.
    ///
    /// `device` 为调用方指定的执行位置 (`sw_device`), 由预测器决定如何使用.
    fn predict(&mut self, batch: ArrayD<f32>, device: Device) -> Result<Prediction, Self::Error>;
}

impl<F, E> Predictor for F
where
    F: FnMut(ArrayD<f32>) -> Result<Prediction, E>,
    E: Error + Send + Sync + 'static,
{
    type Error = E;

    #[inline]
    fn predict(&mut self, batch: ArrayD<f32>, _device: Device) -> Result<Prediction, E> {
        self(batch)
    }
}
