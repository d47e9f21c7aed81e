use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::config::PadMode;
use crate::consts::LEADING_AXES;

/// 按 `padding` 对 `[B, C, spatial...]` 图像的空间轴做填充.
///
/// `padding` 的每个分量为对应空间轴的 `(前, 后)` 填充量. 无需填充时直接复制原数据.
/// 非常数模式下, 填充量可以超过原轴长度 (按周期延拓).
pub fn pad_spatial(input: ArrayViewD<f32>, padding: &[(usize, usize)], mode: PadMode) -> ArrayD<f32> {
    debug_assert_eq!(input.ndim(), padding.len() + LEADING_AXES);

    let mut cur = input.to_owned();
    for (k, &(before, after)) in padding.iter().enumerate() {
        if before + after == 0 {
            continue;
        }
        let axis = Axis(k + LEADING_AXES);
        let n = cur.len_of(axis);
        let mut shape = cur.shape().to_vec();
        shape[axis.index()] = n + before + after;

        let fill = match mode {
            PadMode::Constant(v) => v,
            _ => 0.0,
        };
        let mut out = ArrayD::from_elem(shape, fill);
        for (j, mut lane) in out.axis_iter_mut(axis).enumerate() {
            let offset = j as isize - before as isize;
            if let Some(src) = source_index(offset, n, mode) {
                lane.assign(&cur.index_axis(axis, src));
            }
        }
        cur = out;
    }
    cur
}

/// 填充后坐标 `j` (相对于原数据起点) 对应的原数据索引. 常数填充区域返回 `None`.
fn source_index(j: isize, n: usize, mode: PadMode) -> Option<usize> {
    let n_i = n as isize;
    match mode {
        PadMode::Constant(_) => (0..n_i).contains(&j).then_some(j as usize),
        PadMode::Replicate => Some(j.clamp(0, n_i - 1) as usize),
        PadMode::Circular => Some(j.rem_euclid(n_i) as usize),
        PadMode::Reflect if n == 1 => Some(0),
        PadMode::Reflect => {
            let period = 2 * n_i - 2;
            let m = j.rem_euclid(period);
            let m = if m < n_i { m } else { period - m };
            Some(m as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn row(values: &[f32]) -> ArrayD<f32> {
        Array::from_shape_vec(IxDyn(&[1, 1, 1, values.len()]), values.to_vec()).unwrap()
    }

    fn flat(a: &ArrayD<f32>) -> Vec<f32> {
        a.iter().copied().collect()
    }

    #[test]
    fn test_source_index() {
        // dcb|abcd|cba
        let r: Vec<_> = (-3..7)
            .map(|j| source_index(j, 4, PadMode::Reflect).unwrap())
            .collect();
        assert_eq!(r, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);

        let r: Vec<_> = (-2..6)
            .map(|j| source_index(j, 4, PadMode::Circular).unwrap())
            .collect();
        assert_eq!(r, vec![2, 3, 0, 1, 2, 3, 0, 1]);

        assert_eq!(source_index(-1, 4, PadMode::Constant(0.0)), None);
        assert_eq!(source_index(4, 4, PadMode::Constant(0.0)), None);
        assert_eq!(source_index(9, 4, PadMode::Replicate), Some(3));
    }

    #[test]
    fn test_pad_modes() {
        let x = row(&[1.0, 2.0, 3.0]);
        let pad = [(0, 0), (2, 1)];

        let p = pad_spatial(x.view(), &pad, PadMode::Constant(-1.0));
        assert_eq!(p.shape(), &[1, 1, 1, 6]);
        assert_eq!(flat(&p), vec![-1.0, -1.0, 1.0, 2.0, 3.0, -1.0]);

        let p = pad_spatial(x.view(), &pad, PadMode::Replicate);
        assert_eq!(flat(&p), vec![1.0, 1.0, 1.0, 2.0, 3.0, 3.0]);

        let p = pad_spatial(x.view(), &pad, PadMode::Reflect);
        assert_eq!(flat(&p), vec![3.0, 2.0, 1.0, 2.0, 3.0, 2.0]);

        let p = pad_spatial(x.view(), &pad, PadMode::Circular);
        assert_eq!(flat(&p), vec![2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_pad_two_axes() {
        let x = Array::from_shape_vec(IxDyn(&[1, 1, 2, 2]), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let p = pad_spatial(x.view(), &[(1, 0), (0, 1)], PadMode::Constant(0.0));
        assert_eq!(p.shape(), &[1, 1, 3, 3]);
        assert_eq!(
            flat(&p),
            vec![0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 3.0, 4.0, 0.0]
        );
    }

    #[test]
    fn test_no_padding_is_copy() {
        let x = row(&[1.0, 2.0]);
        let p = pad_spatial(x.view(), &[(0, 0), (0, 0)], PadMode::Reflect);
        assert_eq!(p, x);
    }
}
