// Shaping stage tag: which front-end bandwidth a waveform was shaped to

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rise-time multiple relative to the unshaped pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapingStage {
    X1,
    X2,
    X4,
    X8,
}

impl ShapingStage {
    /// All stages in chain order
    pub const ALL: [ShapingStage; 4] = [
        ShapingStage::X1,
        ShapingStage::X2,
        ShapingStage::X4,
        ShapingStage::X8,
    ];

    pub fn multiplier(self) -> u32 {
        match self {
            ShapingStage::X1 => 1,
            ShapingStage::X2 => 2,
            ShapingStage::X4 => 4,
            ShapingStage::X8 => 8,
        }
    }

    /// Position in the chain, 0 for X1
    pub fn index(self) -> usize {
        match self {
            ShapingStage::X1 => 0,
            ShapingStage::X2 => 1,
            ShapingStage::X4 => 2,
            ShapingStage::X8 => 3,
        }
    }

    /// The stage this one is filtered from
    pub fn previous(self) -> Option<ShapingStage> {
        match self {
            ShapingStage::X1 => None,
            ShapingStage::X2 => Some(ShapingStage::X1),
            ShapingStage::X4 => Some(ShapingStage::X2),
            ShapingStage::X8 => Some(ShapingStage::X4),
        }
    }

    /// Partition directory name
    pub fn dir_name(self) -> &'static str {
        match self {
            ShapingStage::X1 => "rt_1",
            ShapingStage::X2 => "rt_2",
            ShapingStage::X4 => "rt_4",
            ShapingStage::X8 => "rt_8",
        }
    }
}

impl fmt::Display for ShapingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}
