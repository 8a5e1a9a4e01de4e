//! C8 — Size Oracle: resolves a model identifier to a memory footprint
//! in GB.
//!
//! Backing implementation chosen per SPEC_FULL.md §4.14 (quantisation
//! math, not HTML scrape), grounded on
//! `original_source/llm_deploy/llm_calculator.py`'s `gguf_quants` table
//! and `model_size` formula.

use crate::allocator::SizeOracle as SizeOracleTrait;
use std::collections::HashMap;

/// Bits-per-weight for each supported GGUF quantisation, lifted from the
/// original calculator's `gguf_quants` table.
fn gguf_bits_per_weight(quant: &str) -> Option<f64> {
    let table: &[(&str, f64)] = &[
        ("Q3_K_S", 3.5),
        ("Q3_K_M", 3.91),
        ("Q3_K_L", 4.27),
        ("Q4_0", 4.55),
        ("Q4_K_S", 4.58),
        ("Q4_K_M", 4.85),
        ("Q5_0", 5.54),
        ("Q5_K_S", 5.54),
        ("Q5_K_M", 5.69),
        ("Q6_K", 6.59),
        ("Q8_0", 8.5),
    ];
    let upper = quant.to_uppercase();
    table.iter().find(|(k, _)| *k == upper).map(|(_, v)| *v)
}

/// A small static catalogue of known parameter counts, keyed by the
/// family-size prefix of a `<family>-<params>:<quant>` identifier (e.g.
/// `llama3-8b`). Kept deliberately offline and deterministic, per
/// SPEC_FULL.md §4.14.
fn known_parameter_counts() -> HashMap<&'static str, f64> {
    HashMap::from([
        ("llama3-8b", 8.03e9),
        ("llama3-70b", 70.6e9),
        ("llama2-7b", 6.74e9),
        ("llama2-13b", 13.0e9),
        ("llama2-70b", 68.9e9),
        ("mistral-7b", 7.24e9),
        ("mixtral-8x7b", 46.7e9),
        ("qwen2-7b", 7.62e9),
        ("phi3-mini", 3.8e9),
        ("gemma-7b", 8.54e9),
        ("gemma-2b", 2.51e9),
    ])
}

/// Splits a `<family>-<size>:<quant>` identifier into its family-size
/// prefix and quant suffix.
fn split_identifier(model_identifier: &str) -> Option<(&str, &str)> {
    let (prefix, quant) = model_identifier.split_once(':')?;
    Some((prefix, quant))
}

pub struct QuantSizeOracle {
    parameter_counts: HashMap<&'static str, f64>,
}

impl QuantSizeOracle {
    pub fn new() -> Self {
        QuantSizeOracle {
            parameter_counts: known_parameter_counts(),
        }
    }

    /// `size_gb(identifier) -> float | none`: `parameters * bpw / 8`,
    /// converted from bytes to GB.
    pub fn size_gb(&self, model_identifier: &str) -> Option<f64> {
        let (family, quant) = split_identifier(model_identifier)?;
        let parameters = *self.parameter_counts.get(family.to_lowercase().as_str())?;
        let bpw = gguf_bits_per_weight(quant)?;
        let bytes = parameters * bpw / 8.0;
        Some(bytes / 1024.0f64.powi(3))
    }
}

impl Default for QuantSizeOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeOracleTrait for QuantSizeOracle {
    fn size_gb(&self, model_identifier: &str) -> Option<f64> {
        QuantSizeOracle::size_gb(self, model_identifier)
    }
}
