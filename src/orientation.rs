use crate::resampler::GridResampler;
use crate::volume::{Volume, Voxel};

use nalgebra::{Matrix3, Point3};
use tracing::{debug, info};

/// Largest per-entry deviation from the canonical direction that still
/// counts as canonical.
pub const DIRECTION_TOLERANCE: f64 = 1e-6;

/// Direction cosines of the canonical RAI orientation. With index axes
/// aligned to the physical axes this is the identity matrix.
pub fn rai_direction() -> Matrix3<f64> {
    Matrix3::identity()
}

/// Whether a volume with this direction must be resampled to reach the
/// canonical orientation.
pub fn needs_conversion(direction: &Matrix3<f64>) -> bool {
    let reference = rai_direction();
    for i in 0..3 {
        for j in 0..3 {
            if (direction[(i, j)] - reference[(i, j)]).abs() > DIRECTION_TOLERANCE {
                return true;
            }
        }
    }
    false
}

/// Axis-aligned physical-space bounds of a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub zmin: f64,
    pub zmax: f64,
}

impl BoundingBox {
    /// An inverted box that any expansion collapses onto the first point.
    pub fn empty() -> Self {
        Self {
            xmin: f64::MAX,
            xmax: f64::MIN,
            ymin: f64::MAX,
            ymax: f64::MIN,
            zmin: f64::MAX,
            zmax: f64::MIN,
        }
    }

    /// Grow the box to contain `point`.
    pub fn expand(&mut self, point: Point3<f64>) {
        self.xmin = self.xmin.min(point.x);
        self.xmax = self.xmax.max(point.x);
        self.ymin = self.ymin.min(point.y);
        self.ymax = self.ymax.max(point.y);
        self.zmin = self.zmin.min(point.z);
        self.zmax = self.zmax.max(point.z);
    }

    pub fn lower(&self) -> Point3<f64> {
        Point3::new(self.xmin, self.ymin, self.zmin)
    }

    pub fn upper(&self) -> Point3<f64> {
        Point3::new(self.xmax, self.ymax, self.zmax)
    }

    /// Edge lengths per axis.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.xmax - self.xmin,
            self.ymax - self.ymin,
            self.zmax - self.zmin,
        ]
    }
}

/// Physical-space bounding box of a volume, taken over the eight corner
/// voxel centres.
pub fn compute_bounding_box<T: Voxel>(volume: &Volume<T>) -> BoundingBox {
    let size = volume.size();
    let high = [
        (size[0] - 1) as f64,
        (size[1] - 1) as f64,
        (size[2] - 1) as f64,
    ];
    let mut bounds = BoundingBox::empty();
    for corner in 0..8u8 {
        let index = [
            if corner & 1 != 0 { high[0] } else { 0.0 },
            if corner & 2 != 0 { high[1] } else { 0.0 },
            if corner & 4 != 0 { high[2] } else { 0.0 },
        ];
        bounds.expand(volume.index_to_physical(index));
    }
    bounds
}

/// Hooks into the conversion stages, mainly for dumping intermediate
/// results. All methods default to no-ops.
pub trait PipelineObserver<T: Voxel> {
    fn on_orientation_checked(&self, needs_conversion: bool) {
        let _ = needs_conversion;
    }

    fn on_bounding_box(&self, bounds: &BoundingBox) {
        let _ = bounds;
    }

    fn on_volume(&self, stage: &str, volume: &Volume<T>) {
        let _ = (stage, volume);
    }
}

/// Converts volumes to the canonical RAI orientation.
///
/// Volumes already within [`DIRECTION_TOLERANCE`] of the canonical
/// direction pass through untouched. Anything else is resampled onto an
/// axis-aligned grid covering the physical bounding box, with the volume
/// minimum as the background fill.
pub struct OrientationPipeline<'a, T: Voxel> {
    observer: Option<&'a dyn PipelineObserver<T>>,
}

impl<'a, T: Voxel> OrientationPipeline<'a, T> {
    pub fn new() -> Self {
        Self { observer: None }
    }

    pub fn with_observer(observer: &'a dyn PipelineObserver<T>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// Bring `volume` into the canonical orientation.
    pub fn run(&self, volume: Volume<T>) -> Volume<T> {
        let convert = needs_conversion(volume.direction());
        if let Some(observer) = self.observer {
            observer.on_orientation_checked(convert);
        }
        if !convert {
            debug!("volume already in canonical orientation");
            return volume;
        }

        let bounds = compute_bounding_box(&volume);
        if let Some(observer) = self.observer {
            observer.on_bounding_box(&bounds);
        }

        let fill = volume.min_value();
        info!("resampling volume onto the canonical grid");
        let resampled = GridResampler::resample(&volume, &bounds, fill);
        if let Some(observer) = self.observer {
            observer.on_volume("resampled", &resampled);
        }
        resampled
    }
}

impl<T: Voxel> Default for OrientationPipeline<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::cell::Cell;

    fn quarter_turn() -> Matrix3<f64> {
        // index x advances -y in physical space, index y advances +x
        Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn tiny_deviations_still_count_as_canonical() {
        let mut direction = Matrix3::identity();
        direction[(0, 1)] = 1e-7;
        assert!(!needs_conversion(&direction));
        direction[(0, 1)] = 1e-5;
        assert!(needs_conversion(&direction));
    }

    #[test]
    fn rotations_require_conversion() {
        assert!(!needs_conversion(&rai_direction()));
        assert!(needs_conversion(&quarter_turn()));
    }

    #[test]
    fn bounding_box_spans_all_rotated_corners() {
        let volume = Volume::new(
            Array3::<u16>::zeros((4, 4, 4)),
            [1.0, 1.0, 1.0],
            Point3::origin(),
            quarter_turn(),
        );
        let bounds = compute_bounding_box(&volume);
        assert!((bounds.xmin - 0.0).abs() < 1e-12);
        assert!((bounds.xmax - 3.0).abs() < 1e-12);
        assert!((bounds.ymin + 3.0).abs() < 1e-12);
        assert!((bounds.ymax - 0.0).abs() < 1e-12);
        assert!((bounds.zmin - 0.0).abs() < 1e-12);
        assert!((bounds.zmax - 3.0).abs() < 1e-12);
    }

    #[test]
    fn expansion_covers_every_corner() {
        let volume = Volume::new(
            Array3::<u16>::zeros((2, 3, 5)),
            [0.7, 1.1, 2.3],
            Point3::new(-4.0, 2.0, 9.0),
            quarter_turn(),
        );
        let bounds = compute_bounding_box(&volume);
        let size = volume.size();
        for corner in 0..8u8 {
            let index = [
                if corner & 1 != 0 { (size[0] - 1) as f64 } else { 0.0 },
                if corner & 2 != 0 { (size[1] - 1) as f64 } else { 0.0 },
                if corner & 4 != 0 { (size[2] - 1) as f64 } else { 0.0 },
            ];
            let point = volume.index_to_physical(index);
            assert!(point.x >= bounds.xmin - 1e-12 && point.x <= bounds.xmax + 1e-12);
            assert!(point.y >= bounds.ymin - 1e-12 && point.y <= bounds.ymax + 1e-12);
            assert!(point.z >= bounds.zmin - 1e-12 && point.z <= bounds.zmax + 1e-12);
        }
    }

    #[test]
    fn canonical_volumes_pass_through_unchanged() {
        let data = Array3::from_shape_vec((1, 2, 2), vec![1u16, 2, 3, 4]).unwrap();
        let volume = Volume::new(
            data,
            [1.0, 1.0, 1.0],
            Point3::new(5.0, 6.0, 7.0),
            Matrix3::identity(),
        );
        let expected = volume.clone();
        let output = OrientationPipeline::new().run(volume);
        assert_eq!(output, expected);
    }

    #[test]
    fn quarter_turn_volume_is_resampled_onto_the_canonical_grid() {
        let mut data = Array3::from_elem((4, 4, 4), 5u16);
        data[[0, 0, 0]] = 1;
        let volume = Volume::new(
            data,
            [1.0, 1.0, 1.0],
            Point3::origin(),
            quarter_turn(),
        );

        let output = OrientationPipeline::new().run(volume);

        assert_eq!(*output.direction(), rai_direction());
        assert_eq!(output.origin(), Point3::new(0.0, -3.0, 0.0));
        assert_eq!(output.size(), [4, 4, 4]);
        assert_eq!(output.spacing(), [1.0, 1.0, 1.0]);

        // input voxel (0, 0, 0) lands at output index (0, 3, 0)
        assert_eq!(output.data()[[0, 3, 0]], 1);
        let ones = output.data().iter().filter(|v| **v == 1).count();
        let fives = output.data().iter().filter(|v| **v == 5).count();
        assert_eq!(ones, 1);
        assert_eq!(fives, 63);
    }

    #[test]
    fn converted_volumes_are_stable_under_reconversion() {
        let mut data = Array3::from_elem((4, 4, 4), 9i16);
        data[[1, 2, 3]] = -4;
        let volume = Volume::new(
            data,
            [1.0, 1.0, 1.0],
            Point3::origin(),
            quarter_turn(),
        );

        let once = OrientationPipeline::new().run(volume);
        let twice = OrientationPipeline::new().run(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn observer_sees_every_stage_of_a_conversion() {
        struct Recorder {
            checked: Cell<bool>,
            boxed: Cell<bool>,
            volumes: Cell<usize>,
        }

        impl PipelineObserver<u16> for Recorder {
            fn on_orientation_checked(&self, needs_conversion: bool) {
                self.checked.set(needs_conversion);
            }

            fn on_bounding_box(&self, _bounds: &BoundingBox) {
                self.boxed.set(true);
            }

            fn on_volume(&self, stage: &str, _volume: &Volume<u16>) {
                assert_eq!(stage, "resampled");
                self.volumes.set(self.volumes.get() + 1);
            }
        }

        let recorder = Recorder {
            checked: Cell::new(false),
            boxed: Cell::new(false),
            volumes: Cell::new(0),
        };
        let volume = Volume::new(
            Array3::<u16>::zeros((2, 2, 2)),
            [1.0, 1.0, 1.0],
            Point3::origin(),
            quarter_turn(),
        );
        OrientationPipeline::with_observer(&recorder).run(volume);
        assert!(recorder.checked.get());
        assert!(recorder.boxed.get());
        assert_eq!(recorder.volumes.get(), 1);
    }
}
