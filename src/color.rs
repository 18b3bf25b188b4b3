//! Colors.

/// An RGBA color with components between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    /// Opaque white; the default tint of a new element.
    pub const WHITE: Color = Color {
        r: 1.,
        g: 1.,
        b: 1.,
        a: 1.,
    };

    /// Decodes a packed `0xAARRGGBB` value, the form colors take in templates.
    pub fn from_argb(argb: u32) -> Color {
        let channel = |shift: u32| f64::from((argb >> shift) & 0xFF) / 255.;
        Color {
            r: channel(16),
            g: channel(8),
            b: channel(0),
            a: channel(24),
        }
    }

    /// Packs this color back into `0xAARRGGBB`.
    pub fn to_argb(self) -> u32 {
        let channel = |v: f64, shift: u32| ((v.max(0.).min(1.) * 255.).round() as u32) << shift;
        channel(self.a, 24) | channel(self.r, 16) | channel(self.g, 8) | channel(self.b, 0)
    }
}

#[test]
fn test_color_argb() {
    let color = Color::from_argb(0xff00_8000);
    assert_eq!(color.a, 1.);
    assert_eq!(color.r, 0.);
    assert_eq!(color.b, 0.);
    assert_eq!(color.to_argb(), 0xff00_8000);
    assert_eq!(Color::WHITE.to_argb(), 0xffff_ffff);
}
