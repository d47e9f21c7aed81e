//! 收尾: 归一化, 数值检查, 去除填充.

use ndarray::{ArrayD, Slice};

use crate::consts::LEADING_AXES;
use crate::infer::diagnostic::{Diagnostic, Diagnostics};
use crate::infer::stitch::HeadBuffer;
use crate::plan::ScanPlan;

/// 对每个输出头做归一化并去除填充, 按输出头顺序返回.
pub(crate) fn finalize(
    buffers: Vec<HeadBuffer>,
    plan: &ScanPlan,
    diags: &mut Diagnostics,
) -> Vec<ArrayD<f32>> {
    buffers
        .into_iter()
        .enumerate()
        .map(|(h, buffer)| {
            let HeadBuffer {
                mut output,
                count,
                zoom,
            } = buffer;
            output /= &count;

            if output.iter().any(|v| !v.is_finite()) {
                diags.emit(Diagnostic::NonFinite { head: h });
            }

            if !plan.is_padded() {
                return output;
            }
            let region = crop_region(plan, &zoom, &output.shape()[LEADING_AXES..]);
            output
                .slice_each_axis(|ad| match ad.axis.index() {
                    k if k < LEADING_AXES => Slice::from(..),
                    k => Slice::from(region[k - LEADING_AXES].clone()),
                })
                .to_owned()
        })
        .collect()
}

/// 原始图像在缓冲区坐标中的区域:
/// `round(before * zoom) .. round((before + image) * zoom)`, 钳制在缓冲区内.
/// 取整时 `.5` 舍入到偶数.
fn crop_region(plan: &ScanPlan, zoom: &[f64], buffer: &[usize]) -> Vec<std::ops::Range<usize>> {
    plan.unpadded_region()
        .into_iter()
        .zip(zoom)
        .zip(buffer)
        .map(|((r, &z), &len)| {
            let lo = ((r.start as f64 * z).round_ties_even() as usize).min(len);
            let hi = ((r.end as f64 * z).round_ties_even() as usize).clamp(lo, len);
            lo..hi
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_divide_and_crop() {
        let plan = ScanPlan::new(&[2, 4], &[4, 4], 0.0).unwrap();
        assert_eq!(plan.padding(), &[(1, 1), (0, 0)]);

        let output = ArrayD::from_elem(IxDyn(&[1, 2, 4, 4]), 6.0f32);
        let count = ArrayD::from_elem(IxDyn(&[1, 1, 4, 4]), 2.0f32);
        let buffer = HeadBuffer {
            output,
            count,
            zoom: vec![1.0, 1.0],
        };
        let mut diags = Diagnostics::default();
        let heads = finalize(vec![buffer], &plan, &mut diags);
        assert_eq!(heads[0].shape(), &[1, 2, 2, 4]);
        assert!(heads[0].iter().all(|&v| v == 3.0));
        assert!(diags.into_vec().is_empty());
    }

    #[test]
    fn test_crop_zoomed() {
        let plan = ScanPlan::new(&[2, 4], &[4, 4], 0.0).unwrap();
        let region = crop_region(&plan, &[2.0, 0.5], &[8, 2]);
        assert_eq!(region, vec![2..6, 0..2]);
    }

    /// 填充边界落在半个像素上时, 舍入到偶数.
    #[test]
    fn test_crop_half_pixel_ties_even() {
        let plan = ScanPlan::new(&[5, 6], &[8, 8], 0.0).unwrap();
        assert_eq!(plan.padding(), &[(1, 2), (1, 1)]);
        let region = crop_region(&plan, &[0.5, 0.5], &[4, 4]);
        // round(0.5) = 0, round(3.5) = 4.
        assert_eq!(region, vec![0..3, 0..4]);
    }

    #[test]
    fn test_non_finite() {
        let plan = ScanPlan::new(&[4, 4], &[4, 4], 0.0).unwrap();
        let buffer = HeadBuffer {
            output: ArrayD::zeros(IxDyn(&[1, 1, 4, 4])),
            count: ArrayD::zeros(IxDyn(&[1, 1, 4, 4])),
            zoom: vec![1.0, 1.0],
        };
        let mut diags = Diagnostics::default();
        let heads = finalize(vec![buffer], &plan, &mut diags);
        assert!(heads[0].iter().all(|v| v.is_nan()));
        assert_eq!(diags.into_vec(), vec![Diagnostic::NonFinite { head: 0 }]);
    }
}
