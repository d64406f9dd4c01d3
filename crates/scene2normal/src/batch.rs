use anyhow::{Context, Result};
use fibscene::{
    encode_scene, postprocess_heightfield, postprocess_normal_map, ExtractorConfig,
    HeightfieldExtractor, PrimitiveKind, SceneDescription,
};
use log::{debug, info, warn};
use ndarray::Array3;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::tiff::write_rgb8_tiff;

const OUTPUT_SUFFIX: &str = "_normal_map.tif";

/// Read-only configuration shared by every file of one batch run.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub extractor: ExtractorConfig,
    pub background: f32,
    pub keep_going: bool,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    /// Input path and rendered error chain for every file that failed.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Image-ready outputs for one scene.
#[derive(Debug, Clone)]
pub struct RenderedScene {
    /// `(side, side, 2 * layers)`, clamped to the extractor's max height.
    pub heightfield: Array3<f32>,
    /// `(side, side, 3)` bytes.
    pub normal_map: Array3<u8>,
}

/// Regular files directly inside `dir`, sorted by file name so runs are
/// reproducible.
pub fn list_scene_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// `<output_dir>/<input file name>_normal_map.tif`; the input extension is kept.
pub fn output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let mut name = input
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(OUTPUT_SUFFIX);
    output_dir.join(name)
}

/// Parse, encode, extract and postprocess one scene file.
pub fn render_scene<E, F>(path: &Path, settings: &BatchSettings, make_extractor: &F) -> Result<RenderedScene>
where
    E: HeightfieldExtractor,
    F: Fn(ExtractorConfig) -> E,
{
    // The file is closed as soon as parsing returns.
    let scene = SceneDescription::from_path(path)
        .with_context(|| format!("parsing {}", path.display()))?;

    info!(
        "{}: {} spheres, {} cylinders, {} cubes",
        path.display(),
        scene.records(PrimitiveKind::Sphere).len(),
        scene.records(PrimitiveKind::Cylinder).len(),
        scene.records(PrimitiveKind::Cube).len()
    );

    let batch = encode_scene(&scene);

    let mut extractor = make_extractor(settings.extractor);
    extractor
        .add_batch(&batch)
        .with_context(|| format!("handing {} to the extractor", path.display()))?;

    let raw = extractor
        .extract(settings.background)
        .with_context(|| format!("extracting {}", path.display()))?;

    let side = settings.extractor.resolution.0 as usize;
    debug!(
        "Raw heightfield {:?}, raw normal map {:?}",
        raw.heightfield.shape(),
        raw.normal_map.dim()
    );

    let heightfield = postprocess_heightfield(
        &raw.heightfield,
        side,
        settings.extractor.channel_count(),
        settings.extractor.max_height,
    )?;
    let normal_map = postprocess_normal_map(&raw.normal_map)?;

    Ok(RenderedScene {
        heightfield,
        normal_map,
    })
}

/// Render one file and write its normal map; returns the written path.
pub fn process_file<E, F>(path: &Path, settings: &BatchSettings, make_extractor: &F) -> Result<PathBuf>
where
    E: HeightfieldExtractor,
    F: Fn(ExtractorConfig) -> E,
{
    let rendered = render_scene(path, settings, make_extractor)?;

    let out_path = output_path(&settings.output_dir, path);
    write_rgb8_tiff(&out_path, &rendered.normal_map)?;

    info!("OK {} -> {}", path.display(), out_path.display());
    Ok(out_path)
}

/// Process every scene file in `settings.input_dir`, one after another.
///
/// Without `keep_going` the first failure aborts the run and is returned;
/// with it, failures are collected in the report and the run continues.
pub fn run_batch<E, F>(settings: &BatchSettings, make_extractor: F) -> Result<BatchReport>
where
    E: HeightfieldExtractor,
    F: Fn(ExtractorConfig) -> E,
{
    fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("creating {}", settings.output_dir.display()))?;

    let files = list_scene_files(&settings.input_dir)?;
    info!(
        "Processing {} scene files from {}",
        files.len(),
        settings.input_dir.display()
    );

    let mut report = BatchReport::default();

    for path in files {
        match process_file(&path, settings, &make_extractor) {
            Ok(out_path) => report.written.push(out_path),
            Err(err) if settings.keep_going => {
                warn!("Error processing {}: {:#}", path.display(), err);
                report.failed.push((path, format!("{:#}", err)));
            }
            Err(err) => return Err(err.context(format!("batch stopped at {}", path.display()))),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fibscene::{CpuExtractor, ExtractError, Extraction, Normal, ParseError};
    use ndarray::{ArrayD, ArrayView2, IxDyn};
    use std::cell::RefCell;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene2normal-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn settings(root: &Path, side: u32, keep_going: bool) -> BatchSettings {
        BatchSettings {
            input_dir: root.join("in"),
            output_dir: root.join("out"),
            extractor: ExtractorConfig::square(side, 2, 256.0),
            background: 0.0,
            keep_going,
        }
    }

    fn write_scene(root: &Path, name: &str, text: &str) {
        let dir = root.join("in");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), text).unwrap();
    }

    /// Records which kinds reach the extractor and returns a flat scene.
    struct Recording<'a> {
        calls: &'a RefCell<Vec<(&'static str, usize)>>,
        config: ExtractorConfig,
    }

    impl HeightfieldExtractor for Recording<'_> {
        fn add_spheres(&mut self, rows: ArrayView2<'_, f32>) -> Result<(), ExtractError> {
            self.calls.borrow_mut().push(("spheres", rows.nrows()));
            Ok(())
        }

        fn add_cylinders(&mut self, rows: ArrayView2<'_, f32>) -> Result<(), ExtractError> {
            self.calls.borrow_mut().push(("cylinders", rows.nrows()));
            Ok(())
        }

        fn add_cuboids(&mut self, rows: ArrayView2<'_, f32>) -> Result<(), ExtractError> {
            self.calls.borrow_mut().push(("cuboids", rows.nrows()));
            Ok(())
        }

        fn extract(&mut self, background: f32) -> Result<Extraction, ExtractError> {
            let side = self.config.resolution.0 as usize;
            let layers = self.config.layer_count;
            Ok(Extraction {
                heightfield: ArrayD::from_elem(IxDyn(&[side, side, layers, 2]), background),
                normal_map: Array3::from_elem((side, side, 1), Normal::BACKGROUND),
            })
        }
    }

    #[test]
    fn output_name_keeps_the_input_file_name() {
        assert_eq!(
            output_path(Path::new("out"), Path::new("config_data/scene_01.txt")),
            PathBuf::from("out/scene_01.txt_normal_map.tif")
        );
    }

    #[test]
    fn scene_files_are_sorted_and_subdirectories_skipped() {
        let root = scratch_dir("listing");
        write_scene(&root, "c.txt", "0\n0\n0\n");
        write_scene(&root, "a.txt", "0\n0\n0\n");
        write_scene(&root, "b", "0\n0\n0\n");
        fs::create_dir_all(root.join("in").join("nested")).unwrap();
        fs::write(root.join("in").join("nested").join("0.txt"), "0\n0\n0\n").unwrap();

        let names: Vec<String> = list_scene_files(&root.join("in"))
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b", "c.txt"]);
    }

    #[test]
    fn missing_input_directory_is_an_error() {
        let root = scratch_dir("missing");
        assert!(list_scene_files(&root.join("does-not-exist")).is_err());
    }

    #[test]
    fn batch_writes_one_rgb_tiff_per_scene() {
        let root = scratch_dir("end-to-end");
        write_scene(&root, "sphere.txt", "# one sphere\n1\n0\n0\n0 3 3 5 2\n");
        write_scene(&root, "mixed.txt", "1\n1\n1\n0 1 1 1 1\n1 4 4 4 0.5 0.5 0.5 1 3\n2 6 2 8 0 0 0 1 1 1\n");

        let settings = settings(&root, 8, false);
        let report = run_batch(&settings, CpuExtractor::new).unwrap();

        assert!(report.is_success());
        assert_eq!(
            report.written,
            vec![
                root.join("out").join("mixed.txt_normal_map.tif"),
                root.join("out").join("sphere.txt_normal_map.tif"),
            ]
        );

        let image = image::open(&report.written[1]).unwrap().into_rgb8();
        assert_eq!(image.dimensions(), (8, 8));
        // Sphere centre (3.5, 3.5) faces the viewer; the corner is background.
        assert_eq!(image.get_pixel(3, 3).0, [127, 127, 0]);
        assert_eq!(image.get_pixel(7, 7).0, [127, 127, 0]);
        // One pixel right of the centre the normal tilts towards +x.
        assert_eq!(image.get_pixel(4, 3).0, [191, 127, 17]);
    }

    #[test]
    fn rendered_heightfield_has_two_channels_per_layer() {
        let root = scratch_dir("render");
        write_scene(&root, "s.txt", "1\n0\n0\n0 2 2 300 1\n");
        let settings = settings(&root, 5, false);

        let rendered = render_scene(&root.join("in").join("s.txt"), &settings, &CpuExtractor::new).unwrap();
        assert_eq!(rendered.heightfield.dim(), (5, 5, 4));
        assert_eq!(rendered.normal_map.dim(), (5, 5, 3));
        assert!(rendered.heightfield.iter().all(|&v| v <= 256.0));
    }

    #[test]
    fn empty_kinds_never_reach_the_extractor() {
        let root = scratch_dir("empty-kinds");
        write_scene(&root, "s.txt", "2\n0\n1\n0 0 0 0 1\n1 1 1 1 1\n2 0 0 0 0 0 0 1 1 1\n");

        let calls = RefCell::new(Vec::new());
        let settings = settings(&root, 4, false);
        let report = run_batch(&settings, |config: ExtractorConfig| Recording {
            calls: &calls,
            config,
        })
        .unwrap();

        assert_eq!(report.written.len(), 1);
        assert_eq!(*calls.borrow(), vec![("spheres", 2), ("cuboids", 1)]);
    }

    #[test]
    fn first_failure_stops_the_batch() {
        let root = scratch_dir("fail-fast");
        write_scene(&root, "a_bad.txt", "1\n0\n0\n0 1 2 3\n");
        write_scene(&root, "b_good.txt", "0\n0\n0\n");

        let settings = settings(&root, 4, false);
        let err = run_batch(&settings, CpuExtractor::new).unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("a_bad.txt"), "{message}");
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::ArityMismatch { expected: 5, .. })
        ));
        assert!(!root.join("out").join("b_good.txt_normal_map.tif").exists());
    }

    #[test]
    fn keep_going_collects_failures_and_continues() {
        let root = scratch_dir("keep-going");
        write_scene(&root, "a_bad.txt", "1\n0\n");
        write_scene(&root, "b_good.txt", "0\n0\n0\n");

        let settings = settings(&root, 4, true);
        let report = run_batch(&settings, CpuExtractor::new).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, root.join("in").join("a_bad.txt"));
        assert!(report.failed[0].1.contains("end of input"));
        assert_eq!(report.written, vec![root.join("out").join("b_good.txt_normal_map.tif")]);
    }
}
