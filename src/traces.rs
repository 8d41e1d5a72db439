//! Dump of validation traces in gz-compressed CSV format.
//!
//! Every sampled trace of the final validation run becomes one
//! `NNNN.csv.gz` file under `traces/`, sorted into `successes/` and
//! `failures/` by its property verdict.

use anyhow::Context;
use probbc_core::Trace;
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

pub struct TraceWriter {
    path: PathBuf,
    index: u32,
}

impl TraceWriter {
    const FOLDER: &str = "traces";
    const SUCCESSES: &str = "successes";
    const FAILURES: &str = "failures";
    const HEADER: [&str; 3] = ["Step", "Input", "Observation"];

    pub fn new(output_dir: &Path) -> anyhow::Result<Self> {
        let path = output_dir.join(Self::FOLDER);
        create_dir_all(path.join(Self::SUCCESSES))
            .and_then(|()| create_dir_all(path.join(Self::FAILURES)))
            .with_context(|| format!("failed to create trace folders in {}", path.display()))?;
        Ok(Self { path, index: 0 })
    }

    pub fn write(&mut self, trace: &Trace, satisfied: bool) -> anyhow::Result<()> {
        let filename = format!("{:04}.csv.gz", self.index);
        self.index += 1;
        let folder = if satisfied {
            Self::SUCCESSES
        } else {
            Self::FAILURES
        };
        let path = self.path.join(folder).join(&filename);
        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let encoder = flate2::GzBuilder::new()
            .filename(filename)
            .write(file, flate2::Compression::fast());
        let mut writer = csv::WriterBuilder::new().from_writer(encoder);
        writer
            .write_record(Self::HEADER)
            .context("failed to write trace header")?;
        for (step, (input, observation)) in trace.steps().iter().enumerate() {
            writer
                .write_record([step.to_string().as_str(), input.as_str(), observation.as_str()])
                .context("failed to write trace record")?;
        }
        writer.flush().context("failed to flush trace")?;
        let mut encoder = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("failed to finish trace writer: {err}"))?;
        encoder
            .try_finish()
            .context("failed to finish trace compression")?;
        Ok(())
    }
}
