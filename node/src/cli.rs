use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about = "Locus Node - Location proofs with ambient beacons",
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Option<Subcommand>,

    #[clap(flatten)]
    pub run: DemoCmd,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log: String,
}

/// One full proof round against simulated beacons.
#[derive(Debug, Clone, clap::Args)]
pub struct DemoCmd {
    /// JSON orchestrator policy; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub fragment_count: Option<u32>,

    #[arg(long)]
    pub fragment_length: Option<u64>,

    #[arg(long, default_value = "3")]
    pub beacons: u32,

    /// Spacing between simulated beacons, in meters.
    #[arg(long, default_value = "15")]
    pub spacing: f64,

    #[arg(long, default_value = "47.3656", allow_hyphen_values = true)]
    pub latitude: f64,

    #[arg(long, default_value = "8.5250", allow_hyphen_values = true)]
    pub longitude: f64,

    /// Near threshold of the prover's claim, in meters.
    #[arg(long, default_value = "25")]
    pub threshold: f64,

    #[arg(long, default_value = "42")]
    pub mock_seed: u64,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Run a demo round (the default).
    Demo,

    /// Recompute the fragment schedule a beacon emits for a seed.
    Schedule(ScheduleCmd),

    /// Compare two locations.
    Proximity(ProximityCmd),

    /// Encode coordinates as an Open Location Code.
    Encode(EncodeCmd),
}

#[derive(Debug, Clone, clap::Args)]
pub struct ScheduleCmd {
    #[arg(long, allow_hyphen_values = true)]
    pub seed: i64,

    #[arg(long, default_value = "5")]
    pub fragment_count: u32,

    #[arg(long, default_value = "2000")]
    pub fragment_length: u64,

    #[arg(long, default_value = "50")]
    pub min_period: u64,

    #[arg(long, default_value = "500")]
    pub max_period: u64,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ProximityCmd {
    /// `gps:LAT,LNG,THRESHOLD` or `olc:CODE`.
    pub from: String,

    /// `gps:LAT,LNG[,THRESHOLD]` or `olc:CODE`.
    pub to: String,
}

#[derive(Debug, Clone, clap::Args)]
pub struct EncodeCmd {
    #[arg(allow_hyphen_values = true)]
    pub latitude: f64,

    #[arg(allow_hyphen_values = true)]
    pub longitude: f64,

    #[arg(long, default_value = "10")]
    pub digits: usize,
}
