//! Colour validation and WCAG contrast for user display preferences

/// Minimum foreground/background contrast ratio (WCAG AA, normal text)
pub const MIN_CONTRAST: f64 = 4.5;

/// Parse `#RRGGBB` into its channels
pub fn parse_hex_color(input: &str) -> Option<[u8; 3]> {
    let hex = input.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

fn srgb_to_linear(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn relative_luminance([r, g, b]: [u8; 3]) -> f64 {
    0.2126 * srgb_to_linear(r) + 0.7152 * srgb_to_linear(g) + 0.0722 * srgb_to_linear(b)
}

/// Contrast ratio between two `#RRGGBB` colours, 0.0 when either is malformed
pub fn contrast_ratio(bg: &str, fg: &str) -> f64 {
    let (Some(bg), Some(fg)) = (parse_hex_color(bg), parse_hex_color(fg)) else {
        return 0.0;
    };
    let bg_l = relative_luminance(bg);
    let fg_l = relative_luminance(fg);
    let (lighter, darker) = if bg_l >= fg_l { (bg_l, fg_l) } else { (fg_l, bg_l) };
    (lighter + 0.05) / (darker + 0.05)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex_color("#FFFFFF"), Some([255, 255, 255]));
        assert_eq!(parse_hex_color("ffffff"), None);
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#gggggg"), None);
    }

    #[test]
    fn test_black_on_white_is_maximum() {
        let ratio = contrast_ratio("#ffffff", "#000000");
        assert!((ratio - 21.0).abs() < 1e-9);
        // Symmetric
        assert!((contrast_ratio("#000000", "#ffffff") - ratio).abs() < 1e-9);
    }

    #[test]
    fn test_same_colour_is_one() {
        assert!((contrast_ratio("#336699", "#336699") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_examples() {
        // #767676 on white is the classic just-passing grey (~4.54)
        assert!(contrast_ratio("#ffffff", "#767676") >= MIN_CONTRAST);
        // #777777 on white falls just short (~4.48)
        assert!(contrast_ratio("#ffffff", "#777777") < MIN_CONTRAST);
    }

    #[test]
    fn test_malformed_is_zero() {
        assert_eq!(contrast_ratio("#ffffff", "black"), 0.0);
    }
}
