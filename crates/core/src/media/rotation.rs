/// Clockwise rotation the viewer must apply to display a frame upright.
///
/// Sent as a big-endian `i32` number of degrees in every frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Exact conversion from a multiple of 90 degrees.
    ///
    /// Negative and out-of-range values are normalised modulo 360, so
    /// `-90` maps to [`Rotation::Deg270`]. Anything else returns `None`.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Bucket a raw device orientation reading (0..360) into a display rotation.
    ///
    /// ```text
    ///  45..135  -> 270
    /// 135..225  -> 180
    /// 225..315  -> 90
    /// otherwise -> 0
    /// ```
    pub fn from_orientation(orientation: i32) -> Self {
        match orientation.rem_euclid(360) {
            45..135 => Self::Deg270,
            135..225 => Self::Deg180,
            225..315 => Self::Deg90,
            _ => Self::Deg0,
        }
    }

    /// Rotation to send for a frame given the sensor mounting angle and the
    /// current physical orientation of the device.
    pub fn relative(sensor: Rotation, device: Rotation) -> Self {
        let deg = (sensor.degrees() - device.degrees() + 360) % 360;
        Self::from_degrees(deg).unwrap_or_default()
    }
}

impl TryFrom<i32> for Rotation {
    type Error = i32;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees).ok_or(degrees)
    }
}
