//! 进度报告.

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// 按批次推进的进度报告器. 未开启报告时什么也不做.
pub(crate) struct Progress {
    total: usize,
    done: usize,
    enabled: bool,
    #[cfg(feature = "progress")]
    bar: Option<ProgressBar>,
}

impl Progress {
    /// `total` 为总批次数.
    pub(crate) fn new(total: usize, enabled: bool) -> Self {
        #[cfg(feature = "progress")]
        let bar = enabled.then(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches ({eta})",
            ) {
                bar.set_style(style);
            }
            bar
        });
        Self {
            total,
            done: 0,
            enabled,
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// 完成一批.
    pub(crate) fn tick(&mut self) {
        self.done += 1;
        if !self.enabled {
            return;
        }
        #[cfg(feature = "progress")]
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        #[cfg(not(feature = "progress"))]
        log::info!("sliding window: batch {}/{}", self.done, self.total);
    }

    /// 结束报告.
    pub(crate) fn finish(self) {
        #[cfg(feature = "progress")]
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
        log::debug!("sliding window: {}/{} batches done", self.done, self.total);
    }
}
