//! FFmpeg filter-string construction.
//!
//! All dynamic filter expressions (framing tracks, overlay envelopes,
//! ducking) are built here so they can be unit tested without running
//! FFmpeg.

/// A framing keyframe: time (clip-local seconds) and normalized crop
/// center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropKeyframe {
    pub t: f64,
    /// Normalized crop-window origin (top-left), 0.0-1.0
    pub x: f64,
    pub y: f64,
}

/// Build a dynamic-framing filter from a clamped crop track.
///
/// The crop window is `1/zoom` of the frame, its origin follows the
/// piecewise-linear track, and the result is scaled back to full frame
/// size. Keyframes must be in ascending time order with normalized
/// origins already clamped so the window stays inside the frame.
pub fn crop_track_filter(keyframes: &[CropKeyframe], zoom: f64) -> Option<String> {
    if keyframes.is_empty() || zoom <= 1.0 {
        return None;
    }

    let x_expr = piecewise_expr(keyframes, |k| k.x, "iw");
    let y_expr = piecewise_expr(keyframes, |k| k.y, "ih");

    Some(format!(
        "crop=iw/{z:.4}:ih/{z:.4}:{x}:{y},scale=iw*{z:.4}:ih*{z:.4}:flags=lanczos",
        z = zoom,
        x = x_expr,
        y = y_expr,
    ))
}

/// Build a piecewise-linear expression over keyframes, scaled by a
/// frame dimension variable ("iw"/"ih").
fn piecewise_expr<F>(keyframes: &[CropKeyframe], value: F, dim: &str) -> String
where
    F: Fn(&CropKeyframe) -> f64,
{
    if keyframes.len() == 1 {
        return format!("{}*{:.4}", dim, value(&keyframes[0]));
    }

    // Innermost else-branch holds the last keyframe's value.
    let mut expr = format!("{:.4}", value(keyframes.last().unwrap()));
    for pair in keyframes.windows(2).rev() {
        let (a, b) = (&pair[0], &pair[1]);
        let span = (b.t - a.t).max(1e-6);
        expr = format!(
            "if(between(t\\,{t0:.3}\\,{t1:.3})\\,{v0:.4}+({v1:.4}-{v0:.4})*(t-{t0:.3})/{span:.3}\\,{rest})",
            t0 = a.t,
            t1 = b.t,
            v0 = value(a),
            v1 = value(b),
            span = span,
            rest = expr,
        );
    }
    format!("{}*({})", dim, expr)
}

/// Portrait center crop for vertical shorts, anchored at a normalized
/// horizontal center. Falls back to frame center when `cx` is 0.5.
pub fn vertical_crop_filter(width: u32, height: u32, cx: f64) -> String {
    let cx = cx.clamp(0.0, 1.0);
    format!(
        "crop=ih*{w}/{h}:ih:min(max({cx:.4}*iw-ih*{w}/{h}/2\\,0)\\,iw-ih*{w}/{h}):0,\
         scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height,
        cx = cx,
    )
}

/// Video slow-motion filter for a speed factor below 1.0.
pub fn slowmo_video_filter(factor: f64) -> String {
    format!("setpts=PTS/{:.4}", factor)
}

/// Audio slow-motion filter matching `slowmo_video_filter`.
///
/// atempo only accepts 0.5-100.0 per instance, so slower factors chain.
pub fn slowmo_audio_filter(factor: f64) -> String {
    let mut parts = Vec::new();
    let mut remaining = factor;
    while remaining < 0.5 {
        parts.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    parts.push(format!("atempo={:.4}", remaining));
    parts.join(",")
}

/// Overlay filter for a persistent graphic shown for a time range.
pub fn overlay_enable_filter(x: &str, y: &str, start_secs: f64, end_secs: f64) -> String {
    format!(
        "overlay={x}:{y}:enable='between(t,{:.3},{:.3})'",
        start_secs, end_secs
    )
}

/// Alpha fade in/out envelope applied to an overlay input before
/// compositing.
pub fn fade_envelope_filter(start_secs: f64, duration_secs: f64, fade_secs: f64) -> String {
    let fade_out_start = start_secs + duration_secs - fade_secs;
    format!(
        "format=yuva420p,fade=t=in:st={:.3}:d={:.3}:alpha=1,fade=t=out:st={:.3}:d={:.3}:alpha=1",
        start_secs, fade_secs, fade_out_start, fade_secs
    )
}

/// Ducking volume expression: attenuate by `duck_db` inside each range
/// with linear fade edges of `fade_secs`.
pub fn duck_volume_filter(ranges: &[(f64, f64)], duck_db: f64, fade_secs: f64) -> Option<String> {
    if ranges.is_empty() || duck_db <= 0.0 {
        return None;
    }

    let duck_gain = 10f64.powf(-duck_db / 20.0);
    let fade = fade_secs.max(0.01);

    // Per-range envelope: 0 outside, ramps to 1 across the fade edges.
    let envelopes: Vec<String> = ranges
        .iter()
        .map(|(a, b)| {
            format!(
                "max(min(min((t-{a:.3})/{f:.3}\\,({b:.3}-t)/{f:.3})\\,1)\\,0)",
                a = a,
                b = b,
                f = fade,
            )
        })
        .collect();

    let combined = envelopes
        .into_iter()
        .reduce(|acc, e| format!("max({}\\,{})", acc, e))
        .unwrap();

    Some(format!(
        "volume=volume='1-{loss:.4}*{env}':eval=frame",
        loss = 1.0 - duck_gain,
        env = combined,
    ))
}

/// Crop filter for a fixed normalized region (frame sampling for OCR
/// and motion analysis).
pub fn region_crop_filter(region: (f64, f64, f64, f64)) -> String {
    let (x, y, w, h) = region;
    format!(
        "crop=iw*{w:.4}:ih*{h:.4}:iw*{x:.4}:ih*{y:.4}",
        x = x,
        y = y,
        w = w,
        h = h
    )
}
