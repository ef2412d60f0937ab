//! # DICOM-to-NRRD library
//!
//! This crate reads a DICOM series from a directory and turns it into a
//! single 3D volume in the canonical RAI orientation, ready to be written
//! as an NRRD file.
//!
//! The library is built on the dicom-rs ecosystem. A directory is scanned
//! for DICOM files, the first series (by Series Instance UID) is kept and
//! its slices are sorted along the scan axis, decoded in parallel using
//! rayon and stacked into a [`volume::Volume`] carrying the full physical
//! geometry (origin, spacing, direction cosines). When the direction
//! deviates from the canonical identity orientation, the volume is
//! resampled onto an axis-aligned grid covering its physical bounding box,
//! using trilinear interpolation and the volume minimum as background.
//! Voxels keep their stored scalar type end to end; the type is picked per
//! series via [`enums::ScalarType`].
//!
//! DICOM files are assumed to have the following attributes:
//!  - Grayscale pixel data (no multiframe, one sample per pixel)
//!  - Image Position (Patient) and Image Orientation (Patient) per slice
//!  - Images from the same series (Series Instance UID)
//!
//! # Examples
//!
//! ## Converting a CT series to NRRD
//!
//! Scan a directory, load the slices as `i16`, canonicalize the
//! orientation and write the result.
//!
//! ```no_run
//! # use dicom_to_nrrd::nrrd::NrrdWriter;
//! # use dicom_to_nrrd::orientation::OrientationPipeline;
//! # use dicom_to_nrrd::volume_loader::VolumeLoader;
//! let objects = VolumeLoader::scan_directory("dicom")
//!     .expect("should have found a series in the directory");
//! let volume = VolumeLoader::load_from_objects::<i16>(&objects)
//!     .expect("should have assembled the slices into a volume");
//! let volume = OrientationPipeline::new().run(volume);
//! NrrdWriter::write_file(&volume, "volume.nrrd")
//!     .expect("should have written the volume");
//! ```

pub mod enums;
mod interpolator;
pub mod nrrd;
pub mod orientation;
pub mod resampler;
pub mod volume;
pub mod volume_loader;
