//! FFmpeg filter builders.

/// Fit-and-pad filter: scale preserving aspect ratio to fit inside the
/// target frame, then pad with black. Content is never cropped.
pub fn fit_and_pad(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black",
        w = width,
        h = height
    )
}

/// Subtitle burn-in filter. The SRT path is quoted for the filter parser;
/// single quotes inside paths are escaped.
pub fn subtitles(srt_path: &str, font: &str, font_size: u32) -> String {
    let escaped = srt_path.replace('\'', r"\'");
    format!(
        "subtitles='{}':force_style='FontName={},FontSize={}'",
        escaped, font, font_size
    )
}

/// Single-pass loudness normalisation to a LUFS target.
pub fn loudnorm(target_lufs: f64) -> String {
    format!("loudnorm=I={}:TP=-1.5:LRA=11", target_lufs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_and_pad_never_crops() {
        let filter = fit_and_pad(1080, 1920);
        assert!(filter.contains("force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=1080:1920"));
        assert!(!filter.contains("crop"));
    }

    #[test]
    fn subtitles_escapes_quotes() {
        let filter = subtitles("/tmp/it's.srt", "Arial", 28);
        assert!(filter.contains(r"it\'s.srt"));
        assert!(filter.contains("FontSize=28"));
    }

    #[test]
    fn loudnorm_carries_target() {
        assert!(loudnorm(-16.0).contains("I=-16"));
    }
}
