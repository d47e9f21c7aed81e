//! 合成体模.
//!
//! 消融实验不依赖真实数据集: 每个体模由平滑的背景梯度和若干个实心圆 (3D 下为球) 组成,
//! 目标的位置与大小由种子唯一确定.

use ndarray::{ArrayD, Dimension, IxDyn};

/// 单个实心目标.
#[derive(Clone, Debug)]
struct Blob {
    center: Vec<f64>,
    radius: f64,
    value: f32,
}

/// splitmix64. 只用于生成可复现的目标参数.
#[derive(Clone, Debug)]
struct SplitMix(u64);

impl SplitMix {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// `[0, 1)` 上的均匀分布.
    #[inline]
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// 生成形如 `[batch, 1, spatial...]` 的体模, 每张图像包含 `blobs` 个目标.
pub fn phantom(batch: usize, spatial: &[usize], blobs: usize, seed: u64) -> ArrayD<f32> {
    let mut rng = SplitMix(seed);
    let min_side = spatial.iter().copied().min().unwrap_or(1) as f64;
    let targets: Vec<Vec<Blob>> = (0..batch)
        .map(|_| {
            (0..blobs)
                .map(|_| Blob {
                    center: spatial.iter().map(|&n| rng.next_f64() * n as f64).collect(),
                    radius: min_side * (0.08 + 0.17 * rng.next_f64()),
                    value: 0.5 + rng.next_f64() as f32,
                })
                .collect()
        })
        .collect();

    let mut shape = vec![batch, 1];
    shape.extend_from_slice(spatial);
    ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
        let pos = &idx.slice()[2..];
        let background = pos
            .iter()
            .zip(spatial)
            .map(|(&p, &n)| p as f32 / n as f32)
            .sum::<f32>()
            * 0.1;
        targets[idx[0]]
            .iter()
            .filter(|b| {
                let d2: f64 = pos
                    .iter()
                    .zip(&b.center)
                    .map(|(&p, &c)| (p as f64 - c).powi(2))
                    .sum();
                d2 <= b.radius * b.radius
            })
            .fold(background, |acc, b| acc.max(b.value))
    })
}
