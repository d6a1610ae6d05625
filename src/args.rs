//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tapedeck_core::{BuildConfig, GridLayout};

#[derive(Parser, Debug)]
#[command(
    name = "tapedeck",
    version,
    about = "Tapedeck: compile and run tape-machine programs",
    long_about = None
)]
pub struct Cli {
    /// Read the program from a file
    #[arg(short, long, conflicts_with = "program")]
    pub file: Option<PathBuf>,

    /// Provide the program inline
    #[arg(short, long)]
    pub program: Option<String>,

    /// Compile the source before running
    #[arg(short, long, default_value_t = false)]
    pub compile: bool,

    /// Run the compiled or provided code
    #[arg(short, long, default_value_t = false)]
    pub run: bool,

    /// Pre-load the input buffer; stdin is used if not provided
    #[arg(short, long)]
    pub input: Option<String>,

    /// Enable generated-code optimisation
    #[arg(short, long, default_value_t = false)]
    pub optimise: bool,

    /// Enable the two-dimensional tape grid
    #[arg(short, long, default_value_t = false)]
    pub grid: bool,

    /// Second-axis allocation strategy (grid mode only)
    #[arg(long, value_enum, default_value_t = LayoutArg::Linear)]
    pub layout: LayoutArg,

    /// Park on exhausted input instead of supplying null bytes
    #[arg(long, env = "TAPEDECK_BLOCKING_INPUT", default_value_t = false)]
    pub blocking_input: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    Linear,
    Spiral,
    Tiles,
    Nearest,
}

impl From<LayoutArg> for GridLayout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Linear => GridLayout::Linear,
            LayoutArg::Spiral => GridLayout::Spiral,
            LayoutArg::Tiles => GridLayout::Tiles,
            LayoutArg::Nearest => GridLayout::Nearest,
        }
    }
}

impl Cli {
    /// Build config from the flags
    pub fn build_config(&self) -> BuildConfig {
        BuildConfig {
            optimise_generated_code: self.optimise,
            grid_layout: self.layout.into(),
            ..Default::default()
        }
    }
}
