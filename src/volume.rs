use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::Array3;
use num_traits::{Bounded, NumCast, Zero};
use rayon::prelude::*;

/// Scalar sample type a volume can hold.
///
/// Interpolation always runs in `f64`; `as_f64` widens a sample and
/// `from_f64` narrows the result back, rounding half away from zero for
/// integer types.
pub trait Voxel:
    Copy + PartialOrd + Send + Sync + NumCast + Bounded + Zero + 'static
{
    /// Whether values must land on integers when converted back.
    const INTEGRAL: bool;

    fn as_f64(self) -> f64;

    /// Narrow an interpolated value back to the voxel type. Returns `None`
    /// when the value does not fit the target range.
    fn from_f64(value: f64) -> Option<Self> {
        if Self::INTEGRAL {
            NumCast::from(value.round())
        } else {
            NumCast::from(value)
        }
    }
}

macro_rules! impl_voxel {
    ($($t:ty => $integral:expr),* $(,)?) => {
        $(impl Voxel for $t {
            const INTEGRAL: bool = $integral;

            fn as_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}

impl_voxel! {
    u8 => true,
    i8 => true,
    u16 => true,
    i16 => true,
    u32 => true,
    i32 => true,
    f32 => false,
    f64 => false,
}

/// A 3D image: voxel data plus the mapping from index space to physical
/// space.
///
/// Data is stored as `(depth, height, width)`, so `data[[k, j, i]]` is the
/// voxel at index `(i, j, k)` with `i` varying fastest in memory. Spacing is
/// `(x, y, z)` in millimetres. The direction matrix holds one unit column
/// vector per index axis, giving
/// `physical = origin + direction * (index ∘ spacing)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    data: Array3<T>,
    spacing: [f64; 3],
    origin: Point3<f64>,
    direction: Matrix3<f64>,
}

impl<T: Voxel> Volume<T> {
    /// Build a volume from voxel data and its physical-space metadata.
    ///
    /// # Panics
    ///
    /// Panics if the data is empty, any spacing component is not strictly
    /// positive, or the direction matrix is not orthonormal.
    pub fn new(
        data: Array3<T>,
        spacing: [f64; 3],
        origin: Point3<f64>,
        direction: Matrix3<f64>,
    ) -> Self {
        assert!(!data.is_empty(), "volume must contain at least one voxel");
        assert!(
            spacing.iter().all(|s| *s > 0.0),
            "spacing must be strictly positive"
        );
        assert!(
            is_orthonormal(&direction),
            "direction matrix must be orthonormal"
        );
        Self {
            data,
            spacing,
            origin,
            direction,
        }
    }

    /// Number of voxels per axis as `(x, y, z)`.
    pub fn size(&self) -> [usize; 3] {
        let (depth, height, width) = self.data.dim();
        [width, height, depth]
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// Map a (continuous) voxel index to its physical location.
    pub fn index_to_physical(&self, index: [f64; 3]) -> Point3<f64> {
        let scaled = Vector3::new(
            index[0] * self.spacing[0],
            index[1] * self.spacing[1],
            index[2] * self.spacing[2],
        );
        self.origin + self.direction * scaled
    }

    /// Map a physical location to a continuous voxel index. Inverts the
    /// direction matrix by transposition, which holds for orthonormal
    /// directions.
    pub fn physical_to_index(&self, point: Point3<f64>) -> Vector3<f64> {
        let rotated = self.direction.transpose() * (point - self.origin);
        Vector3::new(
            rotated[0] / self.spacing[0],
            rotated[1] / self.spacing[1],
            rotated[2] / self.spacing[2],
        )
    }

    /// Smallest voxel value in the volume, used as the background fill when
    /// resampling.
    pub fn min_value(&self) -> T {
        (&self.data)
            .into_par_iter()
            .copied()
            .reduce(T::max_value, |a, b| if b < a { b } else { a })
    }
}

pub(crate) fn is_orthonormal(direction: &Matrix3<f64>) -> bool {
    let product = direction * direction.transpose();
    (product - Matrix3::identity()).abs().max() < 1e-6
}
