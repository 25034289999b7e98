//! PCM decoding and small-signal analysis shared by the acoustic
//! extractors.
//!
//! Input is always mono signed 16-bit little-endian at the analysis
//! sample rate; both acoustic extractors run on the same decoded
//! buffer.

/// Decode raw s16le bytes into normalized samples in [-1.0, 1.0].
/// A trailing odd byte is ignored.
pub fn decode_s16le(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64 / i16::MAX as f64)
        .collect()
}

/// Root-mean-square energy per fixed-length window. The final partial
/// window is dropped.
pub fn windowed_rms(samples: &[f64], window_len: usize) -> Vec<f64> {
    if window_len == 0 {
        return Vec::new();
    }
    samples
        .chunks_exact(window_len)
        .map(|w| (w.iter().map(|s| s * s).sum::<f64>() / w.len() as f64).sqrt())
        .collect()
}

/// Z-scores of a series against its own mean and standard deviation.
/// A flat series (zero deviation) yields all zeros.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev < 1e-12 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std_dev).collect()
}

/// Goertzel power at a single frequency.
pub fn goertzel_power(samples: &[f64], sample_rate: u32, freq_hz: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let omega = 2.0 * std::f64::consts::PI * freq_hz / sample_rate as f64;
    let coeff = 2.0 * omega.cos();
    let mut s_prev = 0.0;
    let mut s_prev2 = 0.0;
    for &sample in samples {
        let s = sample + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    (s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2) / samples.len() as f64
}

/// Ratio of band energy (sampled at several Goertzel bins) to total
/// window energy. Returns 0.0 for silent windows.
pub fn band_energy_ratio(samples: &[f64], sample_rate: u32, band_hz: (f64, f64)) -> f64 {
    let total: f64 = samples.iter().map(|s| s * s).sum::<f64>() / samples.len().max(1) as f64;
    if total < 1e-12 {
        return 0.0;
    }
    // Probe the band at a handful of evenly spaced bins
    const BINS: usize = 5;
    let (lo, hi) = band_hz;
    let step = (hi - lo) / (BINS - 1) as f64;
    let band: f64 = (0..BINS)
        .map(|i| goertzel_power(samples, sample_rate, lo + step * i as f64))
        .sum::<f64>()
        / BINS as f64;
    (band / total).min(1.0)
}

/// Merge index runs: collapse boolean flags into `(start, end)` index
/// ranges where consecutive flagged entries (within `max_gap` unflagged
/// entries) form one run.
pub fn merge_flag_runs(flags: &[bool], max_gap: usize) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for (i, &flag) in flags.iter().enumerate() {
        if !flag {
            continue;
        }
        match runs.last_mut() {
            Some((_, end)) if i <= *end + max_gap + 1 => *end = i,
            _ => runs.push((i, i)),
        }
    }
    runs
}
