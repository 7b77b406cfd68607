use crate::options::Inspect;
use anyhow::Result;
use forestry::ServiceDefinition;
use std::io::Write;

impl Inspect {
    pub fn run(&self) -> Result<()> {
        let sd = ServiceDefinition::open(&self.input)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", serde_json::to_string_pretty(&sd.manifest)?)?;
        if self.cells {
            let geometry = sd.raster.geometry();
            for row in sd.raster.cells().chunks(geometry.cols) {
                let line: Vec<String> = row
                    .iter()
                    .map(|&v| {
                        if sd.raster.is_nodata(v) {
                            "-".to_string()
                        } else {
                            format!("{v:.2}")
                        }
                    })
                    .collect();
                writeln!(stdout, "{}", line.join(" "))?;
            }
        }
        Ok(())
    }
}
