use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::descriptor::RunDescriptor;
use crate::placement::Architecture;
use crate::training::Hyperparameters;

fn section(out: &mut impl Write, title: &str) -> std::io::Result<()> {
    writeln!(out, "\n================== {title} ==================")
}

/// Human-readable summary of a run written once before learning starts.
pub fn write_desc_log(
    path: &Path,
    descriptor: &RunDescriptor,
    hyperparameters: &Hyperparameters,
    architecture: &Architecture,
    build_info: &str,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    section(&mut out, "settings")?;
    for (key, value) in descriptor.settings_entries() {
        writeln!(out, "{key} -> {value}")?;
    }

    section(&mut out, "hyperparameters")?;
    for (key, value) in hyperparameters.entries() {
        writeln!(out, "{key} -> {value}")?;
    }

    section(&mut out, &format!("{} Model Architecture", descriptor.policy))?;
    writeln!(out, "{architecture}\n")?;

    section(&mut out, "Dependency Information")?;
    write!(out, "{}", build_info.trim_matches('\n'))?;
    writeln!(out)?;
    out.flush()
}
