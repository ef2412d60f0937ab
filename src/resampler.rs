use crate::interpolator::Interpolator;
use crate::orientation::{rai_direction, BoundingBox};
use crate::volume::{Volume, Voxel};

use nalgebra::Point3;
use ndarray::{Array3, Zip};

/// Resamples a volume onto an axis-aligned grid.
///
/// The output grid keeps the input spacing, starts at the lower corner of
/// the bounding box and carries the canonical identity direction. Each
/// output voxel centre is mapped back into the input volume and filled by
/// trilinear interpolation, or with `fill_value` when it falls outside.
pub struct GridResampler;

impl GridResampler {
    pub fn resample<T: Voxel>(
        input: &Volume<T>,
        bounds: &BoundingBox,
        fill_value: T,
    ) -> Volume<T> {
        let spacing = input.spacing();
        let origin = bounds.lower();
        let size = Self::output_size(bounds, spacing);
        let input_size = input.size();

        let mut data = Array3::from_elem((size[2], size[1], size[0]), fill_value);
        Zip::indexed(&mut data).par_for_each(|(k, j, i), voxel| {
            let point = Point3::new(
                origin.x + i as f64 * spacing[0],
                origin.y + j as f64 * spacing[1],
                origin.z + k as f64 * spacing[2],
            );
            let index = input.physical_to_index(point);
            if Interpolator::is_inside(index, input_size) {
                let value = Interpolator::trilinear_interpolate(input.data(), index);
                *voxel = T::from_f64(value).unwrap_or(fill_value);
            }
        });

        Volume::new(data, spacing, origin, rai_direction())
    }

    /// Voxels per axis needed to span the box: the spacing-relative extent
    /// rounded half up, plus one for the voxel at the lower corner.
    fn output_size(bounds: &BoundingBox, spacing: [f64; 3]) -> [usize; 3] {
        let extent = bounds.extent();
        let mut size = [0usize; 3];
        for axis in 0..3 {
            size[axis] = (extent[axis] / spacing[axis] + 0.5).floor() as usize + 1;
        }
        size
    }
}
