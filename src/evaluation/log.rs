use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;

use crate::evaluation::BandRecord;

/// Plain-text record of one evaluation call.
pub struct EvaluationLog {
    out: BufWriter<File>,
}

impl EvaluationLog {
    /// Truncates `path` and writes the timestamp header and parameter block.
    pub fn create(path: &Path, parameters: &[(String, String)]) -> std::io::Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(
            out,
            "timestamp={}",
            Local::now().format("%Y-%m-%d %H:%M:%S:%6f")
        )?;
        writeln!(out, "parameters begin")?;
        for (key, value) in parameters {
            writeln!(out, "\t{key}={value}")?;
        }
        writeln!(out, "parameters end")?;
        Ok(EvaluationLog { out })
    }

    pub fn band_improved(
        &mut self,
        episode: usize,
        last_episode: usize,
        step: u64,
        record: &BandRecord,
        overlaps: &[f64],
    ) -> std::io::Result<()> {
        let line = band_line(episode, last_episode, step, record, overlaps);
        writeln!(self.out, "{line}")?;
        writeln!(self.out, "all_ol={overlaps:?}")
    }

    pub fn episode_finished(&mut self, episode: usize, steps: u64) -> std::io::Result<()> {
        writeln!(
            self.out,
            "eval_env episode {episode} performed {steps} in environment."
        )
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// `run=i/last @ episode_step=s : <band> best hpwl : hpwl=.., overlap=..`
pub fn band_line(
    episode: usize,
    last_episode: usize,
    step: u64,
    record: &BandRecord,
    overlaps: &[f64],
) -> String {
    let mean_overlap = if overlaps.is_empty() {
        0.0
    } else {
        overlaps.iter().sum::<f64>() / overlaps.len() as f64
    };
    format!(
        "run={episode}/{last_episode} @ episode_step={step} : {} best hpwl : hpwl={:.4}, overlap={:.4}",
        record.band.label, record.hpwl, mean_overlap
    )
}
