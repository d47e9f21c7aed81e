//! 程序运行函数.

use std::thread;
use std::time::Duration;

use ndarray::ArrayD;
use slide_berry::prelude::*;
use utils::phantom::phantom;
use utils::predictor::{halve, BoxBlur, Counted, Halve};

use crate::cases::{all_cases, Case};
use crate::profile::Profile;
use crate::result::AblationResult;

/// 盒式滤波半径.
const RADIUS: usize = 2;

/// 实验用的体模: 三张 2D 图像与一个 3D 体积.
fn volumes() -> Vec<ArrayD<f32>> {
    let mut v: Vec<ArrayD<f32>> = (0..3).map(|seed| phantom(1, &[96, 80], 6, seed)).collect();
    v.push(phantom(1, &[40, 48, 36], 4, 42));
    v
}

/// 实际运行.
pub fn run() -> AblationResult {
    let volumes = volumes();
    let cases = all_cases();
    println!(
        "Running {} ablation cases on {} cores...",
        cases.len(),
        utils::cpus()
    );

    thread::scope(|s| {
        let volumes = volumes.as_slice();
        let handles: Vec<_> = cases
            .into_iter()
            .map(|case| s.spawn(move || (case.name, run_case(&case, volumes))))
            .collect();

        handles
            .into_iter()
            .map(|th| th.join().expect("Thread joining error"))
            .collect()
    })
}

/// 在全部体模上运行一组配置.
fn run_case(case: &Case, volumes: &[ArrayD<f32>]) -> Profile {
    let blur = BoxBlur::new(RADIUS);
    let mut profile = Profile::new();

    for (idx, x) in volumes.iter().enumerate() {
        println!("{}: volume {idx}...", case.name);
        let direct = blur.apply(x.view());
        let reference = if case.halved { halve(direct.view()) } else { direct };

        profile.infer_start();
        let (out, calls, busy) = if case.halved {
            infer_with(x, &case.config, Halve(blur))
        } else {
            infer_with(x, &case.config, blur)
        };
        profile.infer_elapsed();
        profile.count_calls(calls, busy);

        let out = match out {
            Ok(out) => out,
            Err(e) => {
                log::error!("{}: volume {idx} failed: {e}", case.name);
                profile.count_failure();
                continue;
            }
        };
        match out.prediction.as_single() {
            Some(y) if y.shape() == reference.shape() => {
                let (mae, max_abs) = abs_error(y, &reference);
                profile.count_image(mae, max_abs, out.diagnostics.len());
            }
            _ => {
                log::error!("{}: volume {idx} has unexpected output shape", case.name);
                profile.count_failure();
            }
        }
    }
    profile
}

/// 以计数包装运行一次推理, 返回结果, 预测器调用次数与预测器耗时.
fn infer_with<P: Predictor>(
    x: &ArrayD<f32>,
    config: &SlidingWindowConfig,
    predictor: P,
) -> (InferResult<InferOutput>, u64, Duration) {
    let mut predictor = Counted::new(predictor);
    let out = sliding_window_inference(x.view(), config, &mut predictor, ImportanceSource::Build);
    (out, predictor.calls(), predictor.busy())
}

/// 平均绝对误差与最大绝对误差.
fn abs_error(a: &ArrayD<f32>, b: &ArrayD<f32>) -> (f64, f64) {
    let (sum, max) = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs() as f64)
        .fold((0.0, 0.0f64), |(s, m), d| (s + d, m.max(d)));
    (sum / a.len().max(1) as f64, max)
}
