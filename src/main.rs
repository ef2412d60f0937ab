//! A CLI tool for converting a DICOM series directory
//! into a canonically oriented NRRD volume file.
use std::path::PathBuf;

use clap::Parser;
use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom_to_nrrd::enums::ScalarType;
use dicom_to_nrrd::nrrd::{NrrdScalar, NrrdWriter};
use dicom_to_nrrd::orientation::{BoundingBox, OrientationPipeline, PipelineObserver};
use dicom_to_nrrd::volume::Volume;
use dicom_to_nrrd::volume_loader::VolumeLoader;
use tracing::{error, info, warn, Level};

/// Convert a DICOM series into an NRRD volume
#[derive(Debug, Parser)]
struct App {
    /// Directory containing the DICOM series
    dicom_dir: PathBuf,

    /// Path to the output NRRD file
    output: PathBuf,

    /// Dump intermediate volumes next to the conversion stages
    #[arg(long = "debug")]
    debug: bool,

    /// Folder receiving the intermediate volume dumps
    #[arg(long = "debug-folder", default_value = ".")]
    debug_folder: PathBuf,

    /// Print more information while converting
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Writes each observed stage as `<stage>.nrrd` into the debug folder.
/// Dump failures are reported but never abort the conversion.
struct DebugDumper {
    folder: PathBuf,
}

impl<T: NrrdScalar> PipelineObserver<T> for DebugDumper {
    fn on_orientation_checked(&self, needs_conversion: bool) {
        info!("orientation conversion needed: {}", needs_conversion);
    }

    fn on_bounding_box(&self, bounds: &BoundingBox) {
        info!(
            "physical bounds x [{:.3}, {:.3}] y [{:.3}, {:.3}] z [{:.3}, {:.3}]",
            bounds.xmin, bounds.xmax, bounds.ymin, bounds.ymax, bounds.zmin, bounds.zmax
        );
    }

    fn on_volume(&self, stage: &str, volume: &Volume<T>) {
        let path = self.folder.join(format!("{stage}.nrrd"));
        if let Err(error) = NrrdWriter::write_file(volume, &path) {
            warn!("could not dump {} volume: {}", stage, error);
        }
    }
}

fn main() {
    let app = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if app.verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .unwrap_or_else(|e| {
        eprintln!("[ERROR] Could not set up global logging subscriber: {}", e);
    });

    if app.debug {
        info!("input directory = {}", app.dicom_dir.display());
        info!("output path     = {}", app.output.display());
        info!("debug folder    = {}", app.debug_folder.display());
    }

    let objects = VolumeLoader::scan_directory(&app.dicom_dir).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(-1);
    });

    let scalar_type = VolumeLoader::detect_scalar_type(&objects[0]).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(-2);
    });
    info!("voxel type {}", scalar_type);

    match scalar_type {
        ScalarType::U8 => run::<u8>(&objects, &app),
        ScalarType::I8 => run::<i8>(&objects, &app),
        ScalarType::U16 => run::<u16>(&objects, &app),
        ScalarType::I16 => run::<i16>(&objects, &app),
        ScalarType::U32 => run::<u32>(&objects, &app),
        ScalarType::I32 => run::<i32>(&objects, &app),
        ScalarType::F32 => run::<f32>(&objects, &app),
        ScalarType::F64 => run::<f64>(&objects, &app),
    }
}

fn run<T: NrrdScalar>(objects: &[FileDicomObject<InMemDicomObject>], app: &App) {
    let volume = VolumeLoader::load_from_objects::<T>(objects).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(-1);
    });

    let dumper = DebugDumper {
        folder: app.debug_folder.clone(),
    };
    let pipeline = if app.debug {
        dumper.on_volume("loaded", &volume);
        OrientationPipeline::with_observer(&dumper)
    } else {
        OrientationPipeline::new()
    };
    let volume = pipeline.run(volume);

    NrrdWriter::write_file(&volume, &app.output).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(-3);
    });
    info!("volume saved to {}", app.output.display());
}

#[cfg(test)]
mod tests {
    use crate::App;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }
}
