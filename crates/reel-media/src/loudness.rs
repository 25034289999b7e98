//! Two-pass loudness normalization support.
//!
//! Pass one runs `loudnorm` in measurement mode and parses the JSON
//! block it prints to stderr; pass two feeds those measurements back as
//! `measured_*` parameters for a linear correction.

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Measured loudness statistics from the first loudnorm pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudnessStats {
    /// Integrated loudness, LUFS
    pub input_i: f64,
    /// True peak, dBTP
    pub input_tp: f64,
    /// Loudness range, LU
    pub input_lra: f64,
    /// Gating threshold, LUFS
    pub input_thresh: f64,
    /// Offset applied by loudnorm's own targeting
    pub target_offset: f64,
}

/// Raw loudnorm JSON (all values are strings in ffmpeg's output).
#[derive(Debug, Deserialize)]
struct LoudnormJson {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
    target_offset: String,
}

/// Build the measurement-pass audio filter.
pub fn loudnorm_measure_filter(target_lufs: f64, true_peak_db: f64, target_lra: f64) -> String {
    format!(
        "loudnorm=I={:.1}:TP={:.1}:LRA={:.1}:print_format=json",
        target_lufs, true_peak_db, target_lra
    )
}

/// Build the correction-pass audio filter from measured statistics.
pub fn loudnorm_apply_filter(
    target_lufs: f64,
    true_peak_db: f64,
    target_lra: f64,
    stats: &LoudnessStats,
) -> String {
    format!(
        "loudnorm=I={:.1}:TP={:.1}:LRA={:.1}:measured_I={:.2}:measured_TP={:.2}:\
         measured_LRA={:.2}:measured_thresh={:.2}:offset={:.2}:linear=true",
        target_lufs,
        true_peak_db,
        target_lra,
        stats.input_i,
        stats.input_tp,
        stats.input_lra,
        stats.input_thresh,
        stats.target_offset,
    )
}

/// Parse the loudnorm JSON block out of captured FFmpeg stderr.
pub fn parse_loudnorm_stats(stderr: &str) -> MediaResult<LoudnessStats> {
    // loudnorm prints the JSON object last; take the final brace block.
    let start = stderr
        .rfind('{')
        .ok_or_else(|| MediaError::LoudnessAnalysis("no JSON block in loudnorm output".into()))?;
    let end = stderr[start..]
        .find('}')
        .map(|i| start + i + 1)
        .ok_or_else(|| MediaError::LoudnessAnalysis("unterminated loudnorm JSON block".into()))?;

    let raw: LoudnormJson = serde_json::from_str(&stderr[start..end])
        .map_err(|e| MediaError::LoudnessAnalysis(format!("bad loudnorm JSON: {}", e)))?;

    let parse = |label: &str, v: &str| -> MediaResult<f64> {
        // ffmpeg reports silence as "-inf"
        if v == "-inf" {
            return Ok(-99.0);
        }
        v.parse().map_err(|_| {
            MediaError::LoudnessAnalysis(format!("unparsable loudnorm field {}: {}", label, v))
        })
    };

    Ok(LoudnessStats {
        input_i: parse("input_i", &raw.input_i)?,
        input_tp: parse("input_tp", &raw.input_tp)?,
        input_lra: parse("input_lra", &raw.input_lra)?,
        input_thresh: parse("input_thresh", &raw.input_thresh)?,
        target_offset: parse("target_offset", &raw.target_offset)?,
    })
}
