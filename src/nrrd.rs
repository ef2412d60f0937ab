use crate::volume::{Volume, Voxel};

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NrrdWriteError {
    #[error("Could not create {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Voxel types serializable as NRRD raw data.
pub trait NrrdScalar: Voxel {
    /// Value of the NRRD `type:` header field.
    const NRRD_TYPE: &'static str;

    /// Write one sample in little-endian byte order.
    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()>;
}

impl NrrdScalar for u8 {
    const NRRD_TYPE: &'static str = "uint8";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self)
    }
}

impl NrrdScalar for i8 {
    const NRRD_TYPE: &'static str = "int8";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_i8(self)
    }
}

impl NrrdScalar for u16 {
    const NRRD_TYPE: &'static str = "uint16";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self)
    }
}

impl NrrdScalar for i16 {
    const NRRD_TYPE: &'static str = "int16";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_i16::<LittleEndian>(self)
    }
}

impl NrrdScalar for u32 {
    const NRRD_TYPE: &'static str = "uint32";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self)
    }
}

impl NrrdScalar for i32 {
    const NRRD_TYPE: &'static str = "int32";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self)
    }
}

impl NrrdScalar for f32 {
    const NRRD_TYPE: &'static str = "float";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self)
    }
}

impl NrrdScalar for f64 {
    const NRRD_TYPE: &'static str = "double";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_f64::<LittleEndian>(self)
    }
}

/// Writes volumes as single-file NRRD with raw little-endian encoding.
///
/// The header records the physical geometry in the
/// left-posterior-superior space: per-axis `space directions` are the
/// direction columns scaled by spacing, and `space origin` is the centre
/// of the first voxel. Sample order matches the buffer layout, x fastest.
pub struct NrrdWriter;

impl NrrdWriter {
    /// Serialize `volume` to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created or written.
    pub fn write_file<T: NrrdScalar>(
        volume: &Volume<T>,
        path: impl AsRef<Path>,
    ) -> Result<(), NrrdWriteError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| NrrdWriteError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        Self::write_header(volume, &mut writer)?;
        for &value in volume.data().iter() {
            value.write_le(&mut writer)?;
        }
        writer.flush()?;

        debug!("wrote {}", path.display());
        Ok(())
    }

    fn write_header<T: NrrdScalar, W: Write>(
        volume: &Volume<T>,
        writer: &mut W,
    ) -> io::Result<()> {
        let size = volume.size();
        let spacing = volume.spacing();
        let direction = volume.direction();
        let origin = volume.origin();

        writeln!(writer, "NRRD0004")?;
        writeln!(writer, "# Complete NRRD file format specification at:")?;
        writeln!(writer, "# http://teem.sourceforge.net/nrrd/format.html")?;
        writeln!(writer, "type: {}", T::NRRD_TYPE)?;
        writeln!(writer, "dimension: 3")?;
        writeln!(writer, "space: left-posterior-superior")?;
        writeln!(writer, "sizes: {} {} {}", size[0], size[1], size[2])?;
        write!(writer, "space directions:")?;
        for axis in 0..3 {
            write!(
                writer,
                " ({},{},{})",
                direction[(0, axis)] * spacing[axis],
                direction[(1, axis)] * spacing[axis],
                direction[(2, axis)] * spacing[axis],
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "kinds: domain domain domain")?;
        writeln!(writer, "endian: little")?;
        writeln!(writer, "encoding: raw")?;
        writeln!(writer, "space origin: ({},{},{})", origin.x, origin.y, origin.z)?;
        writeln!(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Point3};
    use ndarray::Array3;

    fn written_bytes<T: NrrdScalar>(volume: &Volume<T>) -> (String, Vec<u8>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.nrrd");
        NrrdWriter::write_file(volume, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let split = bytes
            .windows(2)
            .position(|pair| pair == b"\n\n")
            .expect("header/data separator");
        let header = String::from_utf8(bytes[..split].to_vec()).unwrap();
        (header, bytes[split + 2..].to_vec())
    }

    #[test]
    fn header_describes_the_grid() {
        let volume = Volume::new(
            Array3::<u16>::zeros((1, 2, 3)),
            [0.5, 0.7, 2.5],
            Point3::new(10.0, -3.5, 4.0),
            Matrix3::identity(),
        );
        let (header, _) = written_bytes(&volume);
        assert!(header.starts_with("NRRD0004\n"));
        assert!(header.contains("type: uint16"));
        assert!(header.contains("dimension: 3"));
        assert!(header.contains("space: left-posterior-superior"));
        assert!(header.contains("sizes: 3 2 1"));
        assert!(header.contains("space directions: (0.5,0,0) (0,0.7,0) (0,0,2.5)"));
        assert!(header.contains("kinds: domain domain domain"));
        assert!(header.contains("endian: little"));
        assert!(header.contains("encoding: raw"));
        assert!(header.contains("space origin: (10,-3.5,4)"));
    }

    #[test]
    fn samples_are_raw_little_endian_in_buffer_order() {
        let data = Array3::from_shape_vec(
            (2, 2, 2),
            vec![0x0102u16, 2, 3, 4, 5, 6, 7, 8],
        )
        .unwrap();
        let volume = Volume::new(
            data,
            [1.0, 1.0, 1.0],
            Point3::origin(),
            Matrix3::identity(),
        );
        let (_, data) = written_bytes(&volume);
        assert_eq!(data.len(), 16);
        assert_eq!(&data[..2], &[0x02, 0x01]);
        assert_eq!(&data[2..4], &[0x02, 0x00]);
    }

    #[test]
    fn float_volumes_round_trip_byte_exact() {
        let data = Array3::from_shape_vec((1, 1, 2), vec![1.5f32, -2.25]).unwrap();
        let volume = Volume::new(
            data,
            [1.0, 1.0, 1.0],
            Point3::origin(),
            Matrix3::identity(),
        );
        let (header, data) = written_bytes(&volume);
        assert!(header.contains("type: float"));
        assert_eq!(data.len(), 8);
        assert_eq!(&data[..4], &1.5f32.to_le_bytes());
        assert_eq!(&data[4..], &(-2.25f32).to_le_bytes());
    }

    #[test]
    fn rotated_directions_scale_each_axis_column() {
        let direction = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let volume = Volume::new(
            Array3::<u8>::zeros((2, 2, 2)),
            [2.0, 3.0, 4.0],
            Point3::origin(),
            direction,
        );
        let (header, _) = written_bytes(&volume);
        assert!(header.contains("type: uint8"));
        assert!(header.contains("space directions: (0,-2,0) (3,0,0) (0,0,4)"));
    }
}
