//! 实验结果.

use crate::profile::Profile;
use std::io::{self, Write};

/// 将 `profile` 的结果写进 `w` 中.
fn describe_into<W: Write>(name: &str, p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.6}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Profile `{name}`:")?;
    writeln!(w, "{S4}Volumes: {} ok, {} failed", p.get_images(), p.get_failures())?;
    writeln!(w, "{S4}Predictor calls: {}", p.get_calls())?;
    writeln!(w, "{S4}Total inference time: {} us", p.get_infer_time_us())?;
    writeln!(w, "{S4}Time inside predictor: {} us", p.get_predictor_time_us())?;
    writeln!(w, "{S4}Mean absolute error: {}", f64_to_display(p.get_avg_mae()))?;
    writeln!(w, "{S4}Max absolute error: {:.6}", p.get_max_abs())?;
    writeln!(w, "{S4}Diagnostics: {}", p.get_diagnostics())?;
    let t = p.get_most_time_consuming().map(|d| d.as_micros() as f64);
    write!(w, "{S4}Slowest volume costs {} us", f64_to_display(t))?;
    Ok(())
}

/// 消融实验最终结果.
pub struct AblationResult {
    data: Vec<(&'static str, Profile)>,
}

impl FromIterator<(&'static str, Profile)> for AblationResult {
    fn from_iter<I: IntoIterator<Item = (&'static str, Profile)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }
}

impl AblationResult {
    /// 输出运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for (key, profile) in self.data.iter() {
            describe_into(key, profile, &mut buf).expect("Writing into memory buffer error");
            println!("{}", String::from_utf8_lossy(&buf));
            buf.clear();

            utils::sep();
        }
    }
}
