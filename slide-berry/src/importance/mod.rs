//! 窗口重要性图 (importance map).
//!
//! 重要性图与窗口同形, 用于在累加时对每个窗口的预测加权, 使重叠区域平滑融合.
//! 构建后所有权重都会被抬升到一个正的下限之上, 保证之后的归一化除法有意义.

use std::collections::HashMap;

use itertools::Itertools;
use ndarray::{ArrayD, IxDyn};
use ordered_float::OrderedFloat;

use crate::config::BlendMode;
use crate::consts::IMPORTANCE_FLOOR;
use crate::error::{InferError, InferResult};
use crate::Shape;

/// 构建形状为 `window` 的重要性图. 返回值已经过 [`apply_floor`] 处理.
///
/// `sigma_scale` 为逐轴的 sigma 相对比例, 仅在 [`BlendMode::Gaussian`] 下使用,
/// 实际 sigma 为 `window[i] * sigma_scale[i]`.
///
/// 当体素个数溢出或无法分配内存时返回 `Err(InferError::ImportanceAlloc)`.
pub fn importance_map(
    window: &[usize],
    mode: BlendMode,
    sigma_scale: &[f64],
) -> InferResult<ArrayD<f32>> {
    let alloc_err = || InferError::ImportanceAlloc {
        shape: window.to_vec(),
    };
    let len = window
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(alloc_err)?;

    let mut buf: Vec<f32> = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| alloc_err())?;

    match mode {
        BlendMode::Constant => buf.resize(len, 1.0),
        BlendMode::Gaussian => {
            debug_assert_eq!(window.len(), sigma_scale.len());
            let profiles: Vec<Vec<f64>> = window
                .iter()
                .zip(sigma_scale)
                .map(|(&n, &s)| gaussian_profile(n, n as f64 * s))
                .collect();
            buf.extend(
                profiles
                    .iter()
                    .map(|p| p.iter().copied())
                    .multi_cartesian_product()
                    .map(|ws| ws.into_iter().product::<f64>() as f32),
            );
            let max = buf.iter().copied().fold(0.0f32, f32::max);
            if max > 0.0 {
                buf.iter_mut().for_each(|v| *v /= max);
            }
        }
    }

    let mut map = ArrayD::from_shape_vec(IxDyn(window), buf)?;
    apply_floor(&mut map);
    Ok(map)
}

/// 单轴高斯曲线, 以 `n / 2` 为中心, 中心处取值为 1.
///
/// `sigma` 不为正时退化为中心处的单位冲激.
fn gaussian_profile(n: usize, sigma: f64) -> Vec<f64> {
    let center = (n / 2) as f64;
    (0..n)
        .map(|i| {
            let d = i as f64 - center;
            if sigma > 0.0 {
                (-0.5 * (d / sigma).powi(2)).exp()
            } else if d == 0.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// 将 `map` 中小于下限的权重抬升到下限.
///
/// 下限为 `max(最小非零权重, IMPORTANCE_FLOOR)`. 处理后所有权重严格为正.
pub fn apply_floor(map: &mut ArrayD<f32>) {
    let min_non_zero = map
        .iter()
        .copied()
        .filter(|&v| v != 0.0)
        .fold(f32::INFINITY, f32::min);
    let floor = if min_non_zero.is_finite() {
        min_non_zero.max(IMPORTANCE_FLOOR)
    } else {
        IMPORTANCE_FLOOR
    };
    map.mapv_inplace(|v| if v.is_nan() || v < floor { floor } else { v });
}

/// 重要性图缓存的键.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportanceKey {
    window: Shape,
    mode: BlendMode,
    /// 均匀模式下为空, 使不同 sigma 的均匀图共享同一项.
    sigma_scale: Vec<OrderedFloat<f64>>,
}

impl ImportanceKey {
    /// 构建键.
    pub fn new(window: &[usize], mode: BlendMode, sigma_scale: &[f64]) -> Self {
        let sigma_scale = match mode {
            BlendMode::Constant => vec![],
            BlendMode::Gaussian => sigma_scale.iter().copied().map(OrderedFloat).collect(),
        };
        Self {
            window: window.to_vec(),
            mode,
            sigma_scale,
        }
    }
}

/// 由调用方持有的重要性图缓存.
///
/// 对于大量配置相同的推理调用, 可以把同一个缓存以 `&mut` 传给每次调用,
/// 避免重复构建. 引擎本身不做任何隐式缓存.
#[derive(Debug, Default)]
pub struct ImportanceCache {
    maps: HashMap<ImportanceKey, ArrayD<f32>>,
}

impl ImportanceCache {
    /// 创建空缓存.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取 (必要时构建) 对应配置的重要性图.
    pub fn get_or_build(
        &mut self,
        window: &[usize],
        mode: BlendMode,
        sigma_scale: &[f64],
    ) -> InferResult<&ArrayD<f32>> {
        let key = ImportanceKey::new(window, mode, sigma_scale);
        if !self.maps.contains_key(&key) {
            let map = importance_map(window, mode, sigma_scale)?;
            log::debug!("importance cache: built {:?} map for window {:?}", mode, window);
            self.maps.insert(key.clone(), map);
        }
        Ok(&self.maps[&key])
    }

    /// 已缓存的重要性图个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// 缓存是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// 清空缓存.
    #[inline]
    pub fn clear(&mut self) {
        self.maps.clear();
    }
}

/// 一次推理调用的重要性图来源.
#[derive(Debug, Default)]
pub enum ImportanceSource<'a> {
    /// 每次调用重新构建.
    #[default]
    Build,

    /// 调用方预先算好的重要性图. 仅当其形状与窗口完全一致时使用, 否则重新构建.
    Precomputed(&'a ArrayD<f32>),

    /// 调用方持有的缓存.
    Cache(&'a mut ImportanceCache),
}

impl ImportanceSource<'_> {
    /// 取得形状为 `window` 的重要性图 (已抬升下限).
    pub fn resolve(
        self,
        window: &[usize],
        mode: BlendMode,
        sigma_scale: &[f64],
    ) -> InferResult<ArrayD<f32>> {
        match self {
            ImportanceSource::Precomputed(map) if map.shape() == window => {
                let mut map = map.clone();
                apply_floor(&mut map);
                Ok(map)
            }
            ImportanceSource::Precomputed(map) => {
                log::debug!(
                    "precomputed importance map {:?} does not match window {:?}, rebuilding",
                    map.shape(),
                    window
                );
                importance_map(window, mode, sigma_scale)
            }
            ImportanceSource::Cache(cache) => Ok(cache.get_or_build(window, mode, sigma_scale)?.clone()),
            ImportanceSource::Build => importance_map(window, mode, sigma_scale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn test_constant_all_ones() {
        let m = importance_map(&[4, 5], BlendMode::Constant, &[0.125, 0.125]).unwrap();
        assert_eq!(m.shape(), &[4, 5]);
        assert!(m.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_gaussian_center_heavier() {
        let m = importance_map(&[9, 9], BlendMode::Gaussian, &[0.125, 0.125]).unwrap();
        let center = m[[4, 4].as_slice()];
        assert!((center - 1.0).abs() < 1e-6);
        assert!(center > m[[0, 0].as_slice()]);
        assert!(center > m[[4, 0].as_slice()]);
        assert!(m[[4, 2].as_slice()] > m[[4, 1].as_slice()]);
        // 对称
        assert!((m[[4, 2].as_slice()] - m[[4, 6].as_slice()]).abs() < 1e-6);
        assert!((m[[2, 4].as_slice()] - m[[4, 2].as_slice()]).abs() < 1e-6);
    }

    #[test]
    fn test_gaussian_floor() {
        // sigma 极小, 边缘权重会下溢为 0, 之后被抬升到下限.
        let m = importance_map(&[16], BlendMode::Gaussian, &[0.01]).unwrap();
        assert!(m.iter().all(|&v| v >= IMPORTANCE_FLOOR));
        assert_eq!(m[[0].as_slice()], IMPORTANCE_FLOOR);

        let m = importance_map(&[5, 5, 5], BlendMode::Gaussian, &[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(m[[2, 2, 2].as_slice()], 1.0);
        assert!(m.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_apply_floor_keeps_small_non_zero() {
        let mut m = Array::from_vec(vec![0.0f32, 0.5, 1.0, 0.0]).into_dyn();
        apply_floor(&mut m);
        assert_eq!(m.as_slice().unwrap(), &[0.5, 0.5, 1.0, 0.5]);

        let mut m = Array::from_vec(vec![0.0f32, 1e-5, 1.0]).into_dyn();
        apply_floor(&mut m);
        assert_eq!(m.as_slice().unwrap(), &[IMPORTANCE_FLOOR, IMPORTANCE_FLOOR, 1.0]);
    }

    #[test]
    fn test_alloc_overflow() {
        let e = importance_map(&[usize::MAX, 4], BlendMode::Gaussian, &[0.1, 0.1]);
        let Err(InferError::ImportanceAlloc { shape }) = e else {
            panic!("应当报告内存不足");
        };
        assert_eq!(shape, vec![usize::MAX, 4]);
        let msg = InferError::ImportanceAlloc { shape }.to_string();
        assert!(msg.contains("BlendMode::Constant"));
    }

    #[test]
    fn test_cache_reuse() {
        let mut cache = ImportanceCache::new();
        cache.get_or_build(&[4, 4], BlendMode::Gaussian, &[0.1, 0.1]).unwrap();
        cache.get_or_build(&[4, 4], BlendMode::Gaussian, &[0.1, 0.1]).unwrap();
        assert_eq!(cache.len(), 1);
        cache.get_or_build(&[4, 4], BlendMode::Gaussian, &[0.2, 0.2]).unwrap();
        assert_eq!(cache.len(), 2);

        // 均匀图与 sigma 无关.
        cache.get_or_build(&[4, 4], BlendMode::Constant, &[0.1, 0.1]).unwrap();
        cache.get_or_build(&[4, 4], BlendMode::Constant, &[0.3, 0.3]).unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_precomputed_shape_mismatch_rebuilds() {
        let wrong = ArrayD::<f32>::zeros(IxDyn(&[3, 3]));
        let m = ImportanceSource::Precomputed(&wrong)
            .resolve(&[4, 4], BlendMode::Constant, &[0.1, 0.1])
            .unwrap();
        assert_eq!(m.shape(), &[4, 4]);
        assert!(m.iter().all(|&v| v == 1.0));

        let ok = ArrayD::<f32>::from_elem(IxDyn(&[4, 4]), 2.0);
        let m = ImportanceSource::Precomputed(&ok)
            .resolve(&[4, 4], BlendMode::Constant, &[0.1, 0.1])
            .unwrap();
        assert!(m.iter().all(|&v| v == 2.0));
    }
}
