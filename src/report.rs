use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::Float;
use crate::config::OutputConfig;
use crate::scheme::{AnalysisReport, Scheme};

/// Writes the description of a scheme and its analyses to a directory.
pub struct ReportWriter {
    directory: PathBuf,
    write_json: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    dim: usize,
    velocities: Vec<Vec<usize>>,
    scheme_velocity: Float,
    conserved_moments: Vec<String>,
    relaxation_parameters: &'a [Vec<Float>],
    analysis: &'a AnalysisReport,
}

impl ReportWriter {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            directory: PathBuf::from(&config.output_directory),
            write_json: config.write_json,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `report.txt`, optionally `analysis.json`, and `routines.txt`
    /// when a generated listing is given. Returns the files written.
    pub fn write(
        &self,
        scheme: &Scheme,
        analysis: &AnalysisReport,
        listing: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.directory).with_context(|| {
            format!("creating output directory {}", self.directory.display())
        })?;

        let mut written = Vec::new();
        let report = self.directory.join("report.txt");
        self.write_text(&report, scheme, analysis)?;
        written.push(report);

        if self.write_json {
            let path = self.directory.join("analysis.json");
            let json = JsonReport {
                dim: scheme.dim(),
                velocities: (0..scheme.nscheme())
                    .map(|k| scheme.stencil().velocities(k).iter().map(|v| v.num).collect())
                    .collect(),
                scheme_velocity: scheme.scheme_velocity(),
                conserved_moments: scheme
                    .conserved()
                    .ordered()
                    .into_iter()
                    .map(|(name, _)| name.to_string())
                    .collect(),
                relaxation_parameters: scheme.relaxation_values(),
                analysis,
            };
            let file = File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            serde_json::to_writer_pretty(file, &json)?;
            written.push(path);
        }

        if let Some(code) = listing {
            let path = self.directory.join("routines.txt");
            fs::write(&path, code).with_context(|| format!("writing {}", path.display()))?;
            written.push(path);
        }

        for path in &written {
            info!("Wrote {}", path.display());
        }
        Ok(written)
    }

    fn write_text(&self, path: &Path, scheme: &Scheme, analysis: &AnalysisReport) -> Result<()> {
        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write!(file, "{scheme}")?;
        writeln!(file)?;
        writeln!(file, "Analysis")?;
        if let Some(stable) = analysis.monotonically_stable {
            writeln!(file, "\t monotonically stable: {}", verdict(stable))?;
        }
        if let Some(stable) = analysis.l2_stable {
            writeln!(file, "\t stable for the norm L2: {}", verdict(stable))?;
        }
        match &analysis.consistency {
            Some(result) => write!(file, "{result}")?,
            None if analysis.monotonically_stable.is_none() && analysis.l2_stable.is_none() => {
                writeln!(file, "\t no analysis requested")?
            }
            None => {}
        }
        Ok(())
    }
}

fn verdict(stable: bool) -> &'static str {
    if stable { "yes" } else { "no" }
}
