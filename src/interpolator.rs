use crate::volume::Voxel;

use nalgebra::Vector3;
use ndarray::Array3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// A continuous index lies inside the sampling support when every
    /// component is within half a voxel of the index range.
    pub(crate) fn is_inside(index: Vector3<f64>, size: [usize; 3]) -> bool {
        (0..3).all(|axis| index[axis] >= -0.5 && index[axis] < size[axis] as f64 - 0.5)
    }

    /// Trilinear interpolation at a continuous `(x, y, z)` index. Coordinates
    /// clamp to the valid index range, so samples in the half-voxel border
    /// take the edge voxel value.
    #[inline]
    pub(crate) fn trilinear_interpolate<T: Voxel>(
        data: &Array3<T>,
        index: Vector3<f64>,
    ) -> f64 {
        let (depth, height, width) = data.dim();

        let x = index[0].clamp(0.0, (width - 1) as f64);
        let y = index[1].clamp(0.0, (height - 1) as f64);
        let z = index[2].clamp(0.0, (depth - 1) as f64);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let z1 = (z0 + 1).min(depth - 1);

        let dx = x - x0 as f64;
        let dy = y - y0 as f64;
        let dz = z - z0 as f64;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;
        let one_minus_dz = 1.0 - dz;

        let v000 = data[[z0, y0, x0]].as_f64();
        let v001 = data[[z0, y0, x1]].as_f64();
        let v010 = data[[z0, y1, x0]].as_f64();
        let v011 = data[[z0, y1, x1]].as_f64();
        let v100 = data[[z1, y0, x0]].as_f64();
        let v101 = data[[z1, y0, x1]].as_f64();
        let v110 = data[[z1, y1, x0]].as_f64();
        let v111 = data[[z1, y1, x1]].as_f64();

        let c00 = v000.mul_add(one_minus_dx, v001 * dx);
        let c01 = v010.mul_add(one_minus_dx, v011 * dx);
        let c10 = v100.mul_add(one_minus_dx, v101 * dx);
        let c11 = v110.mul_add(one_minus_dx, v111 * dx);

        let c0 = c00.mul_add(one_minus_dy, c01 * dy);
        let c1 = c10.mul_add(one_minus_dy, c11 * dy);

        c0.mul_add(one_minus_dz, c1 * dz)
    }
}

#[cfg(test)]
mod tests {
    use super::Interpolator;
    use nalgebra::Vector3;
    use ndarray::Array3;

    fn ramp() -> Array3<f64> {
        // data[[z, y, x]] = 4z + 2y + x
        Array3::from_shape_vec((2, 2, 2), (0..8).map(f64::from).collect()).unwrap()
    }

    #[test]
    fn grid_points_are_exact() {
        let data = ramp();
        let value = Interpolator::trilinear_interpolate(&data, Vector3::new(1.0, 0.0, 1.0));
        assert_eq!(value, 5.0);
    }

    #[test]
    fn cell_center_averages_all_corners() {
        let data = ramp();
        let value =
            Interpolator::trilinear_interpolate(&data, Vector3::new(0.5, 0.5, 0.5));
        assert!((value - 3.5).abs() < 1e-12);
    }

    #[test]
    fn interpolation_is_linear_along_one_axis() {
        let data = ramp();
        let value =
            Interpolator::trilinear_interpolate(&data, Vector3::new(0.25, 0.0, 0.0));
        assert!((value - 0.25).abs() < 1e-12);
    }

    #[test]
    fn border_samples_take_edge_values() {
        let data = ramp();
        let value =
            Interpolator::trilinear_interpolate(&data, Vector3::new(-0.3, 0.0, 0.0));
        assert_eq!(value, 0.0);
        let value =
            Interpolator::trilinear_interpolate(&data, Vector3::new(1.4, 1.0, 1.0));
        assert_eq!(value, 7.0);
    }

    #[test]
    fn integer_voxels_interpolate_in_f64() {
        let data = Array3::from_shape_vec((1, 1, 2), vec![10u16, 20]).unwrap();
        let value =
            Interpolator::trilinear_interpolate(&data, Vector3::new(0.5, 0.0, 0.0));
        assert!((value - 15.0).abs() < 1e-12);
    }

    #[test]
    fn inside_test_allows_the_half_voxel_border() {
        let size = [2, 2, 2];
        assert!(Interpolator::is_inside(Vector3::new(-0.5, 0.0, 0.0), size));
        assert!(Interpolator::is_inside(Vector3::new(1.499, 1.0, 1.0), size));
        assert!(!Interpolator::is_inside(Vector3::new(-0.501, 0.0, 0.0), size));
        assert!(!Interpolator::is_inside(Vector3::new(1.5, 0.0, 0.0), size));
    }
}
