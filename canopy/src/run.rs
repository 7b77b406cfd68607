use crate::options::Run;
use anyhow::{anyhow, Result};
use forestry::{
    ArtifactPublisher, Binning, BranchOutcome, Catalog, GeoEngine, HttpCatalog, InvocationContext,
    LocalEngine, MemCatalog, Pipeline, PipelineConfig, PipelineReport, ServiceArtifact, Stager,
    VoidFill,
};
use log::{info, warn};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

impl Run {
    pub fn run(&self) -> Result<()> {
        let engine = LocalEngine::new(self.cloud_dir.clone()).with_binning(self.binning());
        let stager = Stager::new(self.staging_dir.clone());
        if self.dry_run {
            info!("dry run, publishing into an in-process catalog");
            self.execute(engine, ArtifactPublisher::new(stager, MemCatalog::new()))
        } else {
            let url = self
                .catalog_url
                .as_deref()
                .ok_or_else(|| anyhow!("--catalog-url is required without --dry-run"))?;
            let owner = self
                .owner
                .as_deref()
                .ok_or_else(|| anyhow!("--owner is required without --dry-run"))?;
            let catalog = HttpCatalog::new(
                url,
                owner,
                self.token.clone(),
                Duration::from_secs(self.request_timeout),
            )?;
            self.execute(engine, ArtifactPublisher::new(stager, catalog))
        }
    }

    fn binning(&self) -> Binning {
        let void_fill = match self.idw_radius {
            0 => VoidFill::None,
            radius => VoidFill::Idw {
                radius,
                power: self.idw_power,
            },
        };
        Binning {
            assignment: self.assignment.into(),
            void_fill,
        }
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            surface_cell_size: self.surface_cell_size,
            count_cell_size: self.count_cell_size,
            timeout: self.timeout.map(Duration::from_secs),
            parallel: !self.sequential,
            ..PipelineConfig::default()
        }
    }

    fn execute<C: Catalog>(&self, engine: LocalEngine, publisher: ArtifactPublisher<C>) -> Result<()> {
        if let Ok(cloud) = engine.open(&self.cloud_id) {
            info!("{}: {} points", self.cloud_id, cloud.len());
            for (class, count) in cloud.class_histogram() {
                match class {
                    Some(class) => info!("  {class}: {count}"),
                    None => info!("  unclassified: {count}"),
                }
            }
        }

        let config = self.config();
        let ctx = InvocationContext::generate(&self.cloud_id, config.timeout);
        let pipeline = Pipeline::new(engine, publisher, config);
        let report = pipeline.run_with(&ctx)?;
        let report = PipelineReport {
            height: self.retry(&pipeline, &ctx, report.height),
            density: self.retry(&pipeline, &ctx, report.density),
            ..report
        };

        let json = JsonReport::from(&report);
        println!("{}", serde_json::to_string_pretty(&json)?);
        match report.artifacts().count() {
            2 => Ok(()),
            n => Err(anyhow!("{} of 2 products published", n)),
        }
    }

    /// Each attempt gets a full deadline under the same invocation, so
    /// names and staged drafts stay those of the first attempt.
    fn retry<E: GeoEngine, C: Catalog>(
        &self,
        pipeline: &Pipeline<E, C>,
        ctx: &InvocationContext,
        mut outcome: BranchOutcome,
    ) -> BranchOutcome {
        for attempt in 1..=self.retries {
            match outcome {
                Err(failure) if failure.is_retryable() => {
                    warn!(
                        "retrying {} after {} failed, attempt {attempt}/{}",
                        failure.product, failure.stage, self.retries
                    );
                    outcome = pipeline.retry(&ctx.renewed(), failure);
                }
                done => return done,
            }
        }
        outcome
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    invocation: Uuid,
    namespace: &'a str,
    height: JsonOutcome<'a>,
    density: JsonOutcome<'a>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum JsonOutcome<'a> {
    Published(&'a ServiceArtifact),
    Failed {
        stage: String,
        error: String,
        raster_retained: bool,
        uploaded_id: Option<&'a str>,
    },
}

impl<'a> From<&'a BranchOutcome> for JsonOutcome<'a> {
    fn from(outcome: &'a BranchOutcome) -> Self {
        match outcome {
            Ok(artifact) => Self::Published(artifact),
            Err(failure) => Self::Failed {
                stage: failure.stage.to_string(),
                error: failure.error.to_string(),
                raster_retained: failure.raster.is_some(),
                uploaded_id: failure.uploaded.as_ref().map(|u| u.id.as_str()),
            },
        }
    }
}

impl<'a> From<&'a PipelineReport> for JsonReport<'a> {
    fn from(report: &'a PipelineReport) -> Self {
        Self {
            invocation: report.invocation,
            namespace: &report.namespace,
            height: (&report.height).into(),
            density: (&report.density).into(),
        }
    }
}
