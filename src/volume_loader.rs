use crate::enums::ScalarType;
use crate::volume::{Volume, Voxel};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::PixelDecoder,
};
use dicom_dictionary_std::tags;
use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Slices whose orientation cosines differ by more than this are not part
/// of the same rigid geometry.
const ORIENTATION_TOLERANCE: f64 = 1e-3;

/// Allowed spread of inter-slice gaps relative to their mean.
const SPACING_RELATIVE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No DICOM series found in directory")]
    NoSeriesFound,

    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Inconsistent slice orientation")]
    InconsistentOrientation,

    #[error("Non-uniform slice spacing (min {min:.4}, max {max:.4})")]
    NonUniformSliceSpacing { min: f64, max: f64 },

    #[error("Slice positions are coincident")]
    CoincidentSlices,

    #[error("Missing or invalid {name}")]
    MissingAttribute { name: &'static str },

    #[error("Unsupported pixel format: {detail}")]
    UnsupportedPixelFormat { detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    Decode(#[from] dicom::pixeldata::Error),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Scan a directory for DICOM files and return the objects of one
    /// series.
    ///
    /// Files that cannot be opened as DICOM or carry no Series Instance UID
    /// are skipped. When several series share the directory, the first UID
    /// in lexicographic order wins and the rest are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or contains no
    /// DICOM series.
    pub fn scan_directory(
        path: impl AsRef<Path>,
    ) -> Result<Vec<FileDicomObject<InMemDicomObject>>, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();

        let opened: Vec<(String, FileDicomObject<InMemDicomObject>)> = paths
            .par_iter()
            .filter_map(|path| {
                let object = match open_file(path) {
                    Ok(object) => object,
                    Err(error) => {
                        debug!("skipping {}: {}", path.display(), error);
                        return None;
                    }
                };
                match Self::string_attribute(&object, tags::SERIES_INSTANCE_UID) {
                    Some(uid) => Some((uid, object)),
                    None => {
                        debug!("skipping {}: no Series Instance UID", path.display());
                        None
                    }
                }
            })
            .collect();

        let mut series: BTreeMap<String, Vec<FileDicomObject<InMemDicomObject>>> =
            BTreeMap::new();
        for (uid, object) in opened {
            series.entry(uid).or_default().push(object);
        }

        let count = series.len();
        let Some((uid, objects)) = series.into_iter().next() else {
            return Err(VolumeLoaderError::NoSeriesFound);
        };
        if count > 1 {
            warn!("directory holds {} series, converting only {}", count, uid);
        }
        info!("series {} with {} file(s)", uid, objects.len());
        Ok(objects)
    }

    /// Choose the voxel scalar type for a series from its first object.
    ///
    /// Float pixel data selects a float type directly; everything else goes
    /// through [`ScalarType::from_stored_format`] with the stored bit
    /// depth, sign and rescale parameters.
    ///
    /// # Errors
    ///
    /// Returns an error when the pixel format attributes are missing or
    /// describe a format without a matching scalar type.
    pub fn detect_scalar_type(
        object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<ScalarType, VolumeLoaderError> {
        if object.element(tags::FLOAT_PIXEL_DATA).is_ok() {
            return Ok(ScalarType::F32);
        }
        if object.element(tags::DOUBLE_FLOAT_PIXEL_DATA).is_ok() {
            return Ok(ScalarType::F64);
        }

        let bits_allocated = Self::int_attribute(object, tags::BITS_ALLOCATED).ok_or(
            VolumeLoaderError::MissingAttribute {
                name: "Bits Allocated",
            },
        )?;
        let bits_stored =
            Self::int_attribute(object, tags::BITS_STORED).unwrap_or(bits_allocated);
        let signed =
            Self::int_attribute(object, tags::PIXEL_REPRESENTATION).unwrap_or(0) == 1;
        let slope = Self::float_attribute(object, tags::RESCALE_SLOPE).unwrap_or(1.0);
        let intercept =
            Self::float_attribute(object, tags::RESCALE_INTERCEPT).unwrap_or(0.0);

        ScalarType::from_stored_format(bits_allocated, bits_stored, signed, slope, intercept)
            .ok_or(VolumeLoaderError::UnsupportedPixelFormat {
                detail: format!("{bits_allocated} bits allocated"),
            })
    }

    /// Assemble DICOM objects of one series into a volume.
    ///
    /// Slices are ordered by the projection of their position onto the
    /// slice normal, decoded in parallel and stacked. The volume carries
    /// the geometry of the sorted stack: the first slice position as
    /// origin, the orientation cosines and their cross product as
    /// direction, and pixel plus inter-slice spacing.
    ///
    /// # Errors
    ///
    /// Returns an error when geometry attributes are missing, slices
    /// disagree on orientation or dimensions, gaps between slices are
    /// non-uniform, or pixel data cannot be decoded.
    pub fn load_from_objects<T: Voxel>(
        objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<Volume<T>, VolumeLoaderError> {
        if objects.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        let (row, column, normal) = Self::slice_orientation(&objects[0])?;
        for object in &objects[1..] {
            let (other_row, other_column, _) = Self::slice_orientation(object)?;
            if (other_row - row).norm() > ORIENTATION_TOLERANCE
                || (other_column - column).norm() > ORIENTATION_TOLERANCE
            {
                return Err(VolumeLoaderError::InconsistentOrientation);
            }
        }

        let mut ordered = objects
            .iter()
            .map(|object| {
                let position = Self::slice_position(object).ok_or(
                    VolumeLoaderError::MissingAttribute {
                        name: "Image Position (Patient)",
                    },
                )?;
                Ok((position.coords.dot(&normal), position, object))
            })
            .collect::<Result<Vec<_>, VolumeLoaderError>>()?;
        ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let pixel_spacing = Self::multi_float_attribute(&objects[0], tags::PIXEL_SPACING)
            .filter(|values| values.len() >= 2 && values.iter().all(|v| *v > 0.0))
            .ok_or(VolumeLoaderError::MissingAttribute {
                name: "Pixel Spacing",
            })?;
        // Pixel Spacing is (row spacing, column spacing), i.e. (dy, dx)
        let spacing_y = pixel_spacing[0];
        let spacing_x = pixel_spacing[1];
        let spacing_z = if ordered.len() > 1 {
            let projections: Vec<f64> = ordered.iter().map(|entry| entry.0).collect();
            Self::spacing_between_slices(&projections)?
        } else {
            Self::fallback_slice_spacing(&objects[0])
        };

        let origin = ordered[0].1;
        let direction = Matrix3::from_columns(&[row, column, normal]);

        let images: Vec<Array2<T>> = ordered
            .par_iter()
            .map(|(_, _, object)| Self::decode_slice::<T>(object))
            .collect::<Result<_, _>>()?;

        Self::validate_dimensions(&images)?;
        let volume_array = Self::build_volume_array(&images);

        let (depth, height, width) = volume_array.dim();
        info!(
            "loaded volume {}x{}x{} with spacing ({:.3}, {:.3}, {:.3})",
            width, height, depth, spacing_x, spacing_y, spacing_z
        );

        Ok(Volume::new(
            volume_array,
            [spacing_x, spacing_y, spacing_z],
            origin,
            direction,
        ))
    }

    fn slice_orientation(
        object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<(Vector3<f64>, Vector3<f64>, Vector3<f64>), VolumeLoaderError> {
        const NAME: &str = "Image Orientation (Patient)";

        let cosines = Self::multi_float_attribute(object, tags::IMAGE_ORIENTATION_PATIENT)
            .filter(|values| values.len() >= 6)
            .ok_or(VolumeLoaderError::MissingAttribute { name: NAME })?;
        let row = Vector3::new(cosines[0], cosines[1], cosines[2])
            .try_normalize(1e-12)
            .ok_or(VolumeLoaderError::MissingAttribute { name: NAME })?;
        let column = Vector3::new(cosines[3], cosines[4], cosines[5])
            .try_normalize(1e-12)
            .ok_or(VolumeLoaderError::MissingAttribute { name: NAME })?;
        let normal = row
            .cross(&column)
            .try_normalize(1e-12)
            .ok_or(VolumeLoaderError::MissingAttribute { name: NAME })?;
        Ok((row, column, normal))
    }

    fn slice_position(object: &FileDicomObject<InMemDicomObject>) -> Option<Point3<f64>> {
        let position = Self::multi_float_attribute(object, tags::IMAGE_POSITION_PATIENT)?;
        if position.len() < 3 {
            return None;
        }
        Some(Point3::new(position[0], position[1], position[2]))
    }

    /// Mean gap between consecutive projections, rejecting spreads beyond
    /// one percent of the mean.
    fn spacing_between_slices(projections: &[f64]) -> Result<f64, VolumeLoaderError> {
        let gaps: Vec<f64> = projections
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect();
        let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
        if mean <= f64::EPSILON {
            return Err(VolumeLoaderError::CoincidentSlices);
        }
        let min = gaps.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = gaps.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max - min > SPACING_RELATIVE_TOLERANCE * mean {
            return Err(VolumeLoaderError::NonUniformSliceSpacing { min, max });
        }
        Ok(mean)
    }

    fn fallback_slice_spacing(object: &FileDicomObject<InMemDicomObject>) -> f64 {
        if let Some(spacing) = Self::float_attribute(object, tags::SPACING_BETWEEN_SLICES)
            .filter(|spacing| *spacing > 0.0)
        {
            return spacing;
        }
        if let Some(thickness) = Self::float_attribute(object, tags::SLICE_THICKNESS)
            .filter(|thickness| *thickness > 0.0)
        {
            return thickness;
        }
        warn!("no slice spacing information, assuming 1.0");
        1.0
    }

    fn decode_slice<T: Voxel>(
        object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Array2<T>, VolumeLoaderError> {
        let pixel_data = object.decode_pixel_data()?;
        let array = pixel_data.to_ndarray::<T>()?;
        let (frames, samples) = (array.shape()[0], array.shape()[3]);
        if frames != 1 || samples != 1 {
            return Err(VolumeLoaderError::UnsupportedPixelFormat {
                detail: format!("{frames} frame(s), {samples} sample(s) per pixel"),
            });
        }
        Ok(array.slice_move(s![0, .., .., 0]))
    }

    fn validate_dimensions<T: Voxel>(
        images: &[Array2<T>],
    ) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|image| image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array<T: Voxel>(images: &[Array2<T>]) -> Array3<T> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::from_elem((depth, height, width), T::zero());

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }

    fn string_attribute(
        object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<String> {
        object
            .element(tag)
            .ok()?
            .to_str()
            .ok()
            .map(|value| value.trim().to_string())
    }

    fn int_attribute(
        object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<u16> {
        object.element(tag).ok()?.to_int::<u16>().ok()
    }

    fn float_attribute(
        object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<f64> {
        object.element(tag).ok()?.to_float64().ok()
    }

    fn multi_float_attribute(
        object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<Vec<f64>> {
        object.element(tag).ok()?.to_multi_float64().ok()
    }
}
