use std::fmt;

/// Voxel scalar type of a loaded series.
///
/// Chosen once per run from the stored pixel format of the first slice and
/// used to monomorphize the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl ScalarType {
    /// Choose a scalar type from the stored pixel format.
    ///
    /// A fractional rescale slope or intercept always selects `F32`. An
    /// integral rescale keeps integer voxels but may widen the type: the
    /// stored value range is pushed through `slope * value + intercept` and
    /// the smallest type covering the rescaled range wins. Returns `None`
    /// for bit depths with no matching integer type.
    pub fn from_stored_format(
        bits_allocated: u16,
        bits_stored: u16,
        signed: bool,
        slope: f64,
        intercept: f64,
    ) -> Option<ScalarType> {
        if slope.fract() != 0.0 || intercept.fract() != 0.0 {
            return Some(ScalarType::F32);
        }

        let stored = match (bits_allocated, signed) {
            (8, false) => ScalarType::U8,
            (8, true) => ScalarType::I8,
            (16, false) => ScalarType::U16,
            (16, true) => ScalarType::I16,
            (32, false) => ScalarType::U32,
            (32, true) => ScalarType::I32,
            _ => return None,
        };
        if slope == 1.0 && intercept == 0.0 {
            return Some(stored);
        }

        let bits = i32::from(bits_stored.clamp(1, bits_allocated));
        let (stored_min, stored_max) = if signed {
            (-(2f64.powi(bits - 1)), 2f64.powi(bits - 1) - 1.0)
        } else {
            (0.0, 2f64.powi(bits) - 1.0)
        };
        let a = stored_min * slope + intercept;
        let b = stored_max * slope + intercept;
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Some(Self::smallest_covering(low, high))
    }

    fn smallest_covering(low: f64, high: f64) -> ScalarType {
        if low >= 0.0 {
            if high <= f64::from(u8::MAX) {
                ScalarType::U8
            } else if high <= f64::from(u16::MAX) {
                ScalarType::U16
            } else if high <= f64::from(u32::MAX) {
                ScalarType::U32
            } else {
                ScalarType::F64
            }
        } else if low >= f64::from(i8::MIN) && high <= f64::from(i8::MAX) {
            ScalarType::I8
        } else if low >= f64::from(i16::MIN) && high <= f64::from(i16::MAX) {
            ScalarType::I16
        } else if low >= f64::from(i32::MIN) && high <= f64::from(i32::MAX) {
            ScalarType::I32
        } else {
            ScalarType::F64
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::U8 => "u8",
            ScalarType::I8 => "i8",
            ScalarType::U16 => "u16",
            ScalarType::I16 => "i16",
            ScalarType::U32 => "u32",
            ScalarType::I32 => "i32",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        };
        f.write_str(name)
    }
}
