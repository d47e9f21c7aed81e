//! 空间重采样.
//!
//! 只处理数组的最后若干个轴 (空间轴), 前导轴 (batch, channel) 保持不变.
//! 多维重采样按轴分离地逐轴进行: 2D 下的三次卷积即 bicubic, 3D 下即 tricubic.
//!
//! 坐标映射采用 `align_corners = false` 约定: 输出第 `j` 个像素中心对应输入坐标
//! `(j + 0.5) * in / out - 0.5`.

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::consts::CUBIC_COEFFICIENT;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 插值方式.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interpolation {
    /// 最近邻, 不做任何平滑. 用于重要性图.
    Nearest,

    /// 三次卷积 (Keys 核, `a = -0.75`), 边界外的采样点取最近的边界像素.
    Cubic,
}

/// 一个输出位置的插值抽头: `(输入索引, 权重)`.
type Taps = Vec<(usize, f32)>;

/// 将 `input` 的最后 `out_spatial.len()` 个轴重采样到 `out_spatial`.
///
/// 尺寸相同的轴会被跳过; 所有轴尺寸都相同时返回原数据的拷贝.
pub fn resize(input: ArrayViewD<f32>, out_spatial: &[usize], method: Interpolation) -> ArrayD<f32> {
    let lead = input.ndim() - out_spatial.len();
    let mut cur = input.to_owned();
    for (k, &out_len) in out_spatial.iter().enumerate() {
        let axis = Axis(lead + k);
        if cur.len_of(axis) != out_len {
            cur = resize_axis(cur.view(), axis, out_len, method);
        }
    }
    cur
}

/// 沿单个轴重采样.
fn resize_axis(
    input: ArrayViewD<f32>,
    axis: Axis,
    out_len: usize,
    method: Interpolation,
) -> ArrayD<f32> {
    let in_len = input.len_of(axis);
    let taps = axis_taps(in_len, out_len, method);

    let mut shape = input.shape().to_vec();
    shape[axis.index()] = out_len;
    let mut out = ArrayD::<f32>::zeros(shape);

    let fill_lane = |(j, mut lane): (usize, ndarray::ArrayViewMutD<f32>)| {
        for &(i, w) in taps[j].iter() {
            lane.scaled_add(w, &input.index_axis(axis, i));
        }
    };

    #[cfg(feature = "rayon")]
    out.axis_iter_mut(axis)
        .into_par_iter()
        .enumerate()
        .for_each(fill_lane);
    #[cfg(not(feature = "rayon"))]
    out.axis_iter_mut(axis).enumerate().for_each(fill_lane);

    out
}

/// 计算单轴上每个输出位置的插值抽头.
fn axis_taps(in_len: usize, out_len: usize, method: Interpolation) -> Vec<Taps> {
    let scale = in_len as f64 / out_len as f64;
    let last = in_len as isize - 1;
    (0..out_len)
        .map(|j| match method {
            Interpolation::Nearest => {
                let i = ((j as f64 * scale).floor() as usize).min(in_len - 1);
                vec![(i, 1.0)]
            }
            Interpolation::Cubic => {
                let src = (j as f64 + 0.5) * scale - 0.5;
                let x0 = src.floor();
                let t = src - x0;
                let x0 = x0 as isize;
                let weights = [
                    cubic_kernel(t + 1.0),
                    cubic_kernel(t),
                    cubic_kernel(1.0 - t),
                    cubic_kernel(2.0 - t),
                ];
                weights
                    .into_iter()
                    .enumerate()
                    .filter(|(_, w)| *w != 0.0)
                    .map(|(n, w)| {
                        let i = (x0 - 1 + n as isize).clamp(0, last) as usize;
                        (i, w as f32)
                    })
                    .collect()
            }
        })
        .collect()
}

/// 三次卷积插值核.
///
/// ```text
/// W(x) = (a+2)|x|^3 - (a+3)|x|^2 + 1       |x| <= 1
/// W(x) = a|x|^3 - 5a|x|^2 + 8a|x| - 4a     1 < |x| < 2
/// W(x) = 0                                  otherwise
/// ```
#[inline]
pub(crate) fn cubic_kernel(x: f64) -> f64 {
    const A: f64 = CUBIC_COEFFICIENT;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn ramp(shape: &[usize]) -> ArrayD<f32> {
        let n: usize = shape.iter().product();
        Array::from_shape_vec(IxDyn(shape), (0..n).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn test_kernel_partition_of_unity() {
        for t in [0.0, 0.1, 0.25, 0.5, 0.9] {
            let s: f64 = [t + 1.0, t, 1.0 - t, 2.0 - t].iter().map(|&x| cubic_kernel(x)).sum();
            assert!((s - 1.0).abs() < 1e-12);
        }
        assert_eq!(cubic_kernel(0.0), 1.0);
        assert_eq!(cubic_kernel(1.0), 0.0);
        assert_eq!(cubic_kernel(2.0), 0.0);
    }

    #[test]
    fn test_same_size_is_identity() {
        let x = ramp(&[1, 2, 5, 6]);
        assert_eq!(resize(x.view(), &[5, 6], Interpolation::Cubic), x);
        assert_eq!(resize(x.view(), &[5, 6], Interpolation::Nearest), x);
    }

    #[test]
    fn test_constant_preserved() {
        let x = ArrayD::from_elem(IxDyn(&[2, 1, 4, 4]), 3.5f32);
        let up = resize(x.view(), &[8, 8], Interpolation::Cubic);
        assert_eq!(up.shape(), &[2, 1, 8, 8]);
        assert!(up.iter().all(|&v| (v - 3.5).abs() < 1e-5));

        let down = resize(up.view(), &[3, 5], Interpolation::Cubic);
        assert_eq!(down.shape(), &[2, 1, 3, 5]);
        assert!(down.iter().all(|&v| (v - 3.5).abs() < 1e-5));

        let x = ArrayD::from_elem(IxDyn(&[1, 1, 3, 4, 5]), -2.0f32);
        let y = resize(x.view(), &[6, 2, 7], Interpolation::Cubic);
        assert_eq!(y.shape(), &[1, 1, 6, 2, 7]);
        assert!(y.iter().all(|&v| (v + 2.0).abs() < 1e-5));
    }

    #[test]
    fn test_nearest() {
        let x = ramp(&[1, 1, 1, 4]);
        let up = resize(x.view(), &[1, 8], Interpolation::Nearest);
        assert_eq!(
            up.iter().copied().collect::<Vec<_>>(),
            vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0]
        );
        let down = resize(x.view(), &[1, 2], Interpolation::Nearest);
        assert_eq!(down.iter().copied().collect::<Vec<_>>(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_cubic_half_downsample_interior_linear() {
        // 2 倍下采样时采样点恰好落在两像素中间, 此时三次卷积精确重建线性函数.
        let x = ramp(&[1, 1, 1, 16]);
        let down = resize(x.view(), &[1, 8], Interpolation::Cubic);
        for j in 1..7 {
            let expected = 2.0 * j as f32 + 0.5;
            assert!((down[[0, 0, 0, j].as_slice()] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_taps_clamped() {
        for taps in axis_taps(3, 7, Interpolation::Cubic) {
            assert!(taps.iter().all(|&(i, _)| i < 3));
            let s: f32 = taps.iter().map(|&(_, w)| w).sum();
            assert!((s - 1.0).abs() < 1e-6);
        }
    }
}
