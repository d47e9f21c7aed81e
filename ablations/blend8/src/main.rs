//! 融合方式消融实验.
//!
//! 在合成体模上比较不同融合方式, 重叠比例与预测器输入分辨率下,
//! 滑动窗口推理结果与整图直接预测结果之间的误差及耗时.

mod cases;
mod profile;
mod result;
mod runner;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init()
        .expect("Logger initialization error");

    runner::run().analyze();
}
