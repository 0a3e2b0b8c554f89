//! Deterministic per-chain coloring.
//!
//! Chain identifiers map onto a fixed palette so the same asym id always gets
//! the same color across models, groups, and localization maps.

/// RGBA palette cycled by chain identifier (opaque).
const CHAIN_PALETTE: [[u8; 4]; 12] = [
    [180, 205, 128, 255], // pale green
    [124, 179, 235, 255], // light blue
    [235, 160, 120, 255], // salmon
    [200, 145, 205, 255], // orchid
    [130, 210, 210, 255], // cyan
    [235, 205, 110, 255], // gold
    [160, 160, 235, 255], // periwinkle
    [145, 200, 160, 255], // sea green
    [225, 130, 160, 255], // pink
    [170, 190, 120, 255], // olive
    [120, 185, 200, 255], // steel
    [215, 170, 140, 255], // tan
];

fn palette_index(asym_id: &str) -> usize {
    let hash: usize = asym_id.bytes().map(|b| b as usize).sum();
    hash % CHAIN_PALETTE.len()
}

/// The opaque RGBA color assigned to a chain identifier.
pub fn chain_rgba8(asym_id: &str) -> [u8; 4] {
    CHAIN_PALETTE[palette_index(asym_id)]
}

/// The chain color with an explicit opacity, for translucent density maps.
pub fn chain_rgba8_with_opacity(asym_id: &str, opacity: f64) -> [u8; 4] {
    let mut color = chain_rgba8(asym_id);
    color[3] = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    color
}

/// Shifts the RGB channels of a chain color by a deterministic offset derived
/// from `seed`, clamped to valid channel values. Used to distinguish template
/// models from the chain they belong to.
pub fn offset_rgba8(color: [u8; 4], seed: &str, max_offset: i16) -> [u8; 4] {
    if max_offset == 0 {
        return color;
    }
    let mut shifted = color;
    for (channel, byte) in shifted.iter_mut().take(3).zip(seed.bytes().cycle()) {
        let offset = (byte as i16) % (2 * max_offset + 1) - max_offset;
        *channel = (*channel as i16 + offset).clamp(0, 255) as u8;
    }
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_color_is_deterministic() {
        assert_eq!(chain_rgba8("A"), chain_rgba8("A"));
        assert_eq!(chain_rgba8("XY"), chain_rgba8("XY"));
    }

    #[test]
    fn chain_color_is_opaque() {
        assert_eq!(chain_rgba8("B")[3], 255);
    }

    #[test]
    fn opacity_scales_alpha_channel() {
        let c = chain_rgba8_with_opacity("A", 0.5);
        assert_eq!(c[3], 128);
        assert_eq!(&c[..3], &chain_rgba8("A")[..3]);
    }

    #[test]
    fn offset_color_is_deterministic_and_clamped() {
        let base = [250, 5, 128, 255];
        let a = offset_rgba8(base, "1XYZ", 80);
        let b = offset_rgba8(base, "1XYZ", 80);
        assert_eq!(a, b);
        assert_eq!(a[3], 255);
    }
}
