use clap::{Args, Parser, ValueEnum};
use forestry::CellAssignment;
use std::path::PathBuf;

/// Derive canopy height and biomass density map services from
/// classified lidar.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub enum Cli {
    /// Process one point cloud and publish both rasters.
    Run(Run),

    /// Print the manifest and statistics of a staged service
    /// definition.
    Inspect(Inspect),
}

#[derive(Debug, Clone, Args)]
pub struct Run {
    /// Directory containing `.xyzc` point clouds.
    #[arg(short, long)]
    pub cloud_dir: PathBuf,

    /// Directory service definition drafts are staged in.
    #[arg(short, long, default_value = "staging")]
    pub staging_dir: PathBuf,

    /// Cell size of the ground and canopy surfaces, in map units.
    #[arg(long, default_value_t = 10.0)]
    pub surface_cell_size: f64,

    /// Cell size of the point count rasters, in map units.
    #[arg(long, default_value_t = 10.0)]
    pub count_cell_size: f64,

    /// Elevation assigned to a cell from the points inside it.
    #[arg(long, value_enum, default_value_t = Assignment::Average)]
    pub assignment: Assignment,

    /// Void fill search radius in cells. 0 leaves voids as nodata.
    #[arg(long, default_value_t = 2)]
    pub idw_radius: usize,

    #[arg(long, default_value_t = 2.0)]
    pub idw_power: f64,

    /// Budget for the whole invocation, in seconds.
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Derive the two products one after the other.
    #[arg(long)]
    pub sequential: bool,

    /// Times a failed publish is retried with the derived raster.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Catalog REST root.
    #[arg(long, env = "CANOPY_CATALOG_URL")]
    pub catalog_url: Option<String>,

    /// Catalog account owning the published items.
    #[arg(long, env = "CANOPY_CATALOG_OWNER")]
    pub owner: Option<String>,

    #[arg(long, env = "CANOPY_CATALOG_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Timeout of a single catalog request, in seconds.
    #[arg(long, default_value_t = 120)]
    pub request_timeout: u64,

    /// Publish into an in-process catalog instead.
    #[arg(long)]
    pub dry_run: bool,

    /// Point cloud identifier, the file stem under `cloud_dir`.
    pub cloud_id: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Assignment {
    Average,
    Minimum,
    Maximum,
}

impl From<Assignment> for CellAssignment {
    fn from(assignment: Assignment) -> Self {
        match assignment {
            Assignment::Average => Self::Average,
            Assignment::Minimum => Self::Minimum,
            Assignment::Maximum => Self::Maximum,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct Inspect {
    /// Also print cell values, one row per line.
    #[arg(long)]
    pub cells: bool,

    /// Staged service definition (`.sd`) file.
    pub input: PathBuf,
}
