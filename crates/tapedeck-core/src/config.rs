//! Build configuration passed with every compile command

use serde::{Deserialize, Serialize};

/// Allocation strategy for the second tape axis, used only when grid mode
/// is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridLayout {
    /// Single-axis allocation, the non-grid default
    #[default]
    Linear,
    /// Spiral outward from the origin
    Spiral,
    /// Fixed-size tiles claimed row by row
    Tiles,
    /// Nearest free cell to the current head position
    Nearest,
}

impl GridLayout {
    /// Human-readable strategy name for diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Spiral => "spiral",
            Self::Tiles => "tiles",
            Self::Nearest => "nearest",
        }
    }
}

/// Optimization toggles and layout selection for a compile operation.
///
/// Each toggle is independent; everything defaults to off. The grid layout
/// only takes effect when the program is run in grid mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Clean up generated code after compilation
    pub optimise_generated_code: bool,
    /// Track cell values and clear with constant addition where possible
    pub optimise_cell_clearing: bool,
    /// Skip loops which can never be entered
    pub optimise_unreachable_loops: bool,
    /// Prune variables that are never read
    pub optimise_variable_usage: bool,
    /// Reorder allocations to minimise head movement
    pub optimise_memory_allocation: bool,
    /// Golf constant values
    pub optimise_constants: bool,
    /// Prune blocks that do nothing
    pub optimise_empty_blocks: bool,
    /// Second-axis allocation strategy (grid mode only)
    pub grid_layout: GridLayout,
}

impl BuildConfig {
    /// Config with every optimization toggle enabled
    pub fn all_optimisations() -> Self {
        Self {
            optimise_generated_code: true,
            optimise_cell_clearing: true,
            optimise_unreachable_loops: true,
            optimise_variable_usage: true,
            optimise_memory_allocation: true,
            optimise_constants: true,
            optimise_empty_blocks: true,
            grid_layout: GridLayout::default(),
        }
    }

    /// True if any optimization toggle is enabled
    pub fn any_enabled(&self) -> bool {
        self.optimise_generated_code
            || self.optimise_cell_clearing
            || self.optimise_unreachable_loops
            || self.optimise_variable_usage
            || self.optimise_memory_allocation
            || self.optimise_constants
            || self.optimise_empty_blocks
    }
}
