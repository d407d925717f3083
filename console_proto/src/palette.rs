//! Colour tables shared by every renderer.

/// Classification colours, indexed by `paletteIndex`.
pub const CONSOLE_PALETTE: [&str; 14] = [
    "#F2F2F2", "#16C60C", "#3B78FF", "#E74856", "#61D6D6", "#B4009E", "#F9F1A5", "#CCCCCC",
    "#13A10E", "#0037DA", "#C50F1F", "#3A96DD", "#881798", "#C19C00",
];

/// Rate mask shown for a subsystem that has gone silent.
pub const EMPTY_RATE_MASK: &str = "000000";

pub fn palette_colour(index: usize) -> Option<&'static str> {
    CONSOLE_PALETTE.get(index).copied()
}

/// Heat-map colour ramps as `(stop, colour)` pairs over `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeatGradient {
    Viridis,
    #[default]
    Magma,
    CubeHelix,
    Spectral,
    Ocean,
}

impl HeatGradient {
    pub fn stops(self) -> [(f32, &'static str); 6] {
        match self {
            HeatGradient::Viridis => [
                (0.0, "#241512"),
                (0.2, "#462041"),
                (0.4, "#404788"),
                (0.6, "#21928A"),
                (0.8, "#5FC54F"),
                (1.0, "#EAC87D"),
            ],
            HeatGradient::Magma => [
                (0.0, "#000000"),
                (0.2, "#1F101B"),
                (0.4, "#65283F"),
                (0.6, "#B75352"),
                (0.8, "#E99C6B"),
                (1.0, "#FAF3FF"),
            ],
            HeatGradient::CubeHelix => [
                (0.0, "#000000"),
                (0.2, "#0D140D"),
                (0.4, "#273956"),
                (0.6, "#AD4977"),
                (0.8, "#A9C25A"),
                (1.0, "#FFFFFF"),
            ],
            HeatGradient::Spectral => [
                (0.0, "#9E0142"),
                (0.2, "#F46D43"),
                (0.4, "#FEE08B"),
                (0.6, "#E6F598"),
                (0.8, "#66C2A5"),
                (1.0, "#5E4FA2"),
            ],
            HeatGradient::Ocean => [
                (0.0, "#0C030B"),
                (0.2, "#1E153C"),
                (0.4, "#174A79"),
                (0.6, "#149D83"),
                (0.8, "#6DDE7A"),
                (1.0, "#FFFFFF"),
            ],
        }
    }
}
