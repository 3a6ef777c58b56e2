use clap::Parser;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "qFit-ligand - Hierarchically build a multiconformer ligand into an electron-density map and select the weighted conformers that explain it.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    // --- Inputs ---
    /// X-ray density map in CCP4/MRC format.
    #[arg(value_name = "XMAP")]
    pub xmap: PathBuf,

    /// Map resolution in angstrom.
    #[arg(value_name = "RESOLUTION")]
    pub resolution: f64,

    /// Ligand file in PDB format.
    #[arg(value_name = "LIGAND")]
    pub ligand: PathBuf,

    /// PDB file containing the receptor for clash detection. Hydrogens are ignored.
    #[arg(short, long, value_name = "PATH")]
    pub receptor: Option<PathBuf>,

    /// Directory to store results and the log file.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub directory: PathBuf,

    /// Path to a configuration file in TOML format.
    /// Command-line options take precedence over its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Build Overrides ---
    /// Do not build the ligand; only the input conformation is scored.
    #[arg(long)]
    pub no_build: bool,

    /// Do not perform a local search after sampling.
    #[arg(long)]
    pub no_local: bool,

    /// Number of rotatable bonds sampled per build iteration.
    #[arg(short = 'b', long, value_name = "INT")]
    pub build_stepsize: Option<usize>,

    /// Step size for dihedral angle sampling in degrees.
    #[arg(short = 's', long, value_name = "FLOAT")]
    pub stepsize: Option<f64>,

    /// Do not scale density fit scores by atomic number while building.
    #[arg(long)]
    pub no_scale: bool,

    // --- Selection Overrides ---
    /// Cardinality constraint of the initial selection.
    #[arg(short = 'c', long, value_name = "INT")]
    pub cardinality: Option<usize>,

    /// Minimum occupancy of a selected conformer.
    #[arg(short = 't', long, value_name = "FLOAT")]
    pub threshold: Option<f64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S solver.max-nodes=5000
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,

    /// Also write the model density of the initial fit as a CCP4 map.
    #[arg(long)]
    pub write_model_density: bool,

    // --- Runtime ---
    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all console log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to this file instead of `<DIR>/qfit_ligand.log`
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub threads: Option<usize>,
}

impl Cli {
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.directory.join("qfit_ligand.log"))
    }
}
