use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Colour scales offered for the heat map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorScale {
    #[default]
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Cividis,
    Hot,
    Cool,
    Rainbow,
}

type Stop = (f64, [u8; 3]);

const VIRIDIS: &[Stop] = &[
    (0.0, [0x44, 0x01, 0x54]),
    (0.125, [0x47, 0x2d, 0x7b]),
    (0.25, [0x3b, 0x52, 0x8b]),
    (0.375, [0x2c, 0x72, 0x8e]),
    (0.5, [0x21, 0x91, 0x8c]),
    (0.625, [0x28, 0xae, 0x80]),
    (0.75, [0x5e, 0xc9, 0x62]),
    (0.875, [0xad, 0xdc, 0x30]),
    (1.0, [0xfd, 0xe7, 0x25]),
];

const PLASMA: &[Stop] = &[
    (0.0, [0x0d, 0x08, 0x87]),
    (0.125, [0x4c, 0x02, 0xa1]),
    (0.25, [0x7e, 0x03, 0xa8]),
    (0.375, [0xa9, 0x23, 0x95]),
    (0.5, [0xcc, 0x47, 0x78]),
    (0.625, [0xe5, 0x6b, 0x5d]),
    (0.75, [0xf8, 0x94, 0x41]),
    (0.875, [0xfd, 0xc3, 0x28]),
    (1.0, [0xf0, 0xf9, 0x21]),
];

const INFERNO: &[Stop] = &[
    (0.0, [0x00, 0x00, 0x04]),
    (0.125, [0x1f, 0x0c, 0x48]),
    (0.25, [0x55, 0x0f, 0x6d]),
    (0.375, [0x88, 0x22, 0x6a]),
    (0.5, [0xba, 0x36, 0x55]),
    (0.625, [0xe3, 0x59, 0x33]),
    (0.75, [0xf9, 0x8e, 0x09]),
    (0.875, [0xf6, 0xcb, 0x2c]),
    (1.0, [0xfc, 0xff, 0xa4]),
];

const MAGMA: &[Stop] = &[
    (0.0, [0x00, 0x00, 0x04]),
    (0.125, [0x1c, 0x10, 0x44]),
    (0.25, [0x4f, 0x12, 0x7b]),
    (0.375, [0x81, 0x25, 0x81]),
    (0.5, [0xb5, 0x36, 0x7a]),
    (0.625, [0xe5, 0x50, 0x64]),
    (0.75, [0xfb, 0x87, 0x61]),
    (0.875, [0xfe, 0xc2, 0x87]),
    (1.0, [0xfc, 0xfd, 0xbf]),
];

const CIVIDIS: &[Stop] = &[
    (0.0, [0x00, 0x22, 0x4e]),
    (0.125, [0x12, 0x35, 0x70]),
    (0.25, [0x3b, 0x49, 0x6c]),
    (0.375, [0x57, 0x5d, 0x6d]),
    (0.5, [0x70, 0x71, 0x73]),
    (0.625, [0x8a, 0x87, 0x79]),
    (0.75, [0xa6, 0x9d, 0x75]),
    (0.875, [0xc4, 0xb5, 0x6c]),
    (1.0, [0xfe, 0xe8, 0x38]),
];

const HOT: &[Stop] = &[
    (0.0, [0x0b, 0x00, 0x00]),
    (0.365, [0xff, 0x00, 0x00]),
    (0.746, [0xff, 0xff, 0x00]),
    (1.0, [0xff, 0xff, 0xff]),
];

const COOL: &[Stop] = &[(0.0, [0x00, 0xff, 0xff]), (1.0, [0xff, 0x00, 0xff])];

const RAINBOW: &[Stop] = &[
    (0.0, [0x80, 0x00, 0xff]),
    (0.25, [0x1a, 0x96, 0xf3]),
    (0.5, [0x80, 0xff, 0xb4]),
    (0.75, [0xff, 0x96, 0x4f]),
    (1.0, [0xff, 0x00, 0x00]),
];

impl ColorScale {
    pub const ALL: [ColorScale; 8] = [
        Self::Viridis,
        Self::Plasma,
        Self::Inferno,
        Self::Magma,
        Self::Cividis,
        Self::Hot,
        Self::Cool,
        Self::Rainbow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Viridis => "Viridis",
            Self::Plasma => "Plasma",
            Self::Inferno => "Inferno",
            Self::Magma => "Magma",
            Self::Cividis => "Cividis",
            Self::Hot => "Hot",
            Self::Cool => "Cool",
            Self::Rainbow => "Rainbow",
        }
    }

    fn stops(&self) -> &'static [Stop] {
        match self {
            Self::Viridis => VIRIDIS,
            Self::Plasma => PLASMA,
            Self::Inferno => INFERNO,
            Self::Magma => MAGMA,
            Self::Cividis => CIVIDIS,
            Self::Hot => HOT,
            Self::Cool => COOL,
            Self::Rainbow => RAINBOW,
        }
    }

    /// Colour at `t` in `[0, 1]`; values outside are clamped.
    pub fn sample(&self, t: f64) -> [u8; 3] {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let hi = stops
            .iter()
            .position(|(pos, _)| *pos >= t)
            .unwrap_or(stops.len() - 1);
        if hi == 0 {
            return stops[0].1;
        }
        let (p0, c0) = stops[hi - 1];
        let (p1, c1) = stops[hi];
        let f = if p1 > p0 { (t - p0) / (p1 - p0) } else { 0.0 };
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
        [mix(c0[0], c1[0]), mix(c0[1], c1[1]), mix(c0[2], c1[2])]
    }
}

impl fmt::Display for ColorScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown colour scale `{0}`")]
pub struct UnknownColorScale(pub String);

impl FromStr for ColorScale {
    type Err = UnknownColorScale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        // older projects stored the web plot's name for the cool scale
        if key.eq_ignore_ascii_case("bluered") {
            return Ok(Self::Cool);
        }
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(key))
            .ok_or_else(|| UnknownColorScale(s.to_string()))
    }
}

impl Serialize for ColorScale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ColorScale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
