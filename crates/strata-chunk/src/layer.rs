// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layer sizing tiers.

use strata_core::Layer;

/// Target and minimum sizes for one granularity tier, in characters.
#[derive(Debug, Clone, Copy)]
pub struct LayerSpec {
    pub layer: Layer,
    /// Preferred chunk size; accumulation stops once this is reached.
    pub target_chars: usize,
    /// Below this, a lone trailing chunk is merged into its predecessor.
    pub min_chars: usize,
}

/// Sizing tiers from finest to coarsest.
pub const LAYER_SPECS: [LayerSpec; 5] = [
    LayerSpec {
        layer: Layer::Micro,
        target_chars: 600,
        min_chars: 200,
    },
    LayerSpec {
        layer: Layer::Flow,
        target_chars: 1500,
        min_chars: 500,
    },
    LayerSpec {
        layer: Layer::Theme,
        target_chars: 4000,
        min_chars: 1200,
    },
    LayerSpec {
        layer: Layer::Narrative,
        target_chars: 9000,
        min_chars: 2500,
    },
    LayerSpec {
        layer: Layer::Macro,
        target_chars: 18000,
        min_chars: 4000,
    },
];

/// Looks up the sizing spec for a layer.
pub fn spec_for(layer: Layer) -> LayerSpec {
    // LAYER_SPECS covers every variant, so the lookup cannot miss.
    LAYER_SPECS
        .iter()
        .copied()
        .find(|s| s.layer == layer)
        .unwrap_or(LAYER_SPECS[4])
}
