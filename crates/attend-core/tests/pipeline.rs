//! Build a gallery from disk, then recognize against it with a CSV ledger.

use attend_core::ledger::FixedClock;
use attend_core::{
    Annotation, Annotator, AttendanceLedger, BoundingBox, CsvLedgerStore, EuclideanMatcher,
    ExtractError, FaceExtractor, FeatureVector, FrameSource, GalleryBuilder, GalleryStore,
    LedgerStore, RecognitionConfig, RecognitionLoop,
};
use chrono::NaiveDate;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Whole image is one face when its first pixel is not black; the vector is
/// that pixel's red/green channels divided by ten.
struct FirstPixelExtractor;

impl FaceExtractor for FirstPixelExtractor {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
        if image.get_pixel(0, 0).0 == [0, 0, 0] {
            return Ok(Vec::new());
        }
        Ok(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: image.width() as f32,
            height: image.height() as f32,
            confidence: 1.0,
        }])
    }

    fn encode(&mut self, image: &RgbImage, _face: &BoundingBox) -> Result<FeatureVector, ExtractError> {
        let Rgb([r, g, _]) = *image.get_pixel(0, 0);
        Ok(FeatureVector::new(vec![r as f32 / 10.0, g as f32 / 10.0]))
    }
}

struct Frames(Vec<RgbImage>);

impl FrameSource for Frames {
    fn read_frame(&mut self) -> Option<RgbImage> {
        (!self.0.is_empty()).then(|| self.0.remove(0))
    }
}

struct NullAnnotator;

impl Annotator for NullAnnotator {
    fn present(&mut self, _frame: &RgbImage, _annotations: &[Annotation]) {}

    fn stop_requested(&mut self) -> bool {
        false
    }
}

fn solid(rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(8, 8, Rgb(rgb))
}

fn save(path: &Path, img: &RgbImage) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    img.save(path).unwrap();
}

fn clock() -> FixedClock {
    FixedClock(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap())
}

#[test]
fn gallery_build_skips_faceless_and_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dataset");
    save(&root.join("A").join("a1.png"), &solid([10, 0, 0]));
    save(&root.join("A").join("a2.png"), &solid([12, 0, 0]));
    save(&root.join("B").join("b1.png"), &solid([0, 40, 0]));
    save(&root.join("B").join("b2.png"), &solid([0, 0, 0]));

    let store = GalleryStore::new(dir.path().join("encodings").join("encodings.bin"));
    let out = GalleryBuilder::new(&mut FirstPixelExtractor, &store).build(&root).unwrap();

    assert_eq!(out.gallery.len(), 3);
    assert_eq!(out.skipped, 1);

    let loaded = store.load().unwrap();
    assert_eq!(loaded.labels(), &["A", "A", "B"]);
    assert_eq!(loaded.vectors(), out.gallery.vectors());
}

#[test]
fn carol_recognized_once_stranger_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("dataset");
    // Carol's vector is [1.0, 0.0]
    save(&root.join("Carol").join("c.png"), &solid([10, 0, 0]));

    let store = GalleryStore::new(dir.path().join("g.bin"));
    GalleryBuilder::new(&mut FirstPixelExtractor, &store).build(&root).unwrap();

    let ledger_path = dir.path().join("attendance.csv");
    let mut ledger = AttendanceLedger::with_clock(CsvLedgerStore::new(&ledger_path), clock());
    let config = RecognitionConfig::new(0.5, 1, 1.0).unwrap();

    // distance 0.8 from Carol: unknown, nothing written
    let far = Frames(vec![solid([18, 0, 0])]);
    let summary = RecognitionLoop::new(config, &mut FirstPixelExtractor, EuclideanMatcher, &mut NullAnnotator, &mut ledger)
        .run(&store, || Ok::<_, std::io::Error>(far))
        .unwrap();
    assert_eq!(summary.faces_recognized, 0);
    assert!(!ledger_path.exists());

    // distance 0.3, seen on three frames: one row
    let near = Frames(vec![solid([13, 0, 0]); 3]);
    let summary = RecognitionLoop::new(config, &mut FirstPixelExtractor, EuclideanMatcher, &mut NullAnnotator, &mut ledger)
        .run(&store, || Ok::<_, std::io::Error>(near))
        .unwrap();
    assert_eq!(summary.faces_recognized, 3);
    assert_eq!(summary.attendees_recorded, 1);

    let records = CsvLedgerStore::new(&ledger_path).load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "Carol");
    assert_eq!(records[0].timestamp, "2024-01-01 09:00:00");
    assert_eq!(
        std::fs::read_to_string(&ledger_path).unwrap(),
        "name,timestamp\nCarol,2024-01-01 09:00:00\n"
    );
}
