use rand::Rng;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// HSV to RGB. `hue` in degrees (wrapped), `saturation`/`value` in 0..=1.
    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let h = if hue.is_finite() { hue.rem_euclid(360.0) } else { 0.0 };
        let s = saturation.clamp(0.0, 1.0);
        let v = value.clamp(0.0, 1.0);

        let c = v * s;
        let sector = h / 60.0;
        let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
        let m = v - c;
        let (r, g, b) = match sector as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        let to_u8 = |ch: f32| ((ch + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::new(to_u8(r), to_u8(g), to_u8(b))
    }

    /// Uniformly random hue at full saturation and value.
    pub fn random_vivid<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_hsv(rng.gen_range(0.0..360.0), 1.0, 1.0)
    }
}
