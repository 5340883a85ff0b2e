//! End-to-end checks against real model files. Set `FACEVERIFY_MODEL_DIR`
//! to a directory holding the YuNet and SFace exports; tests skip otherwise.

use anyhow::Result;
use faceverify_vision::model::{DETECTOR_MODEL_FILE, SFACE_MODEL_FILE};
use faceverify_vision::{EncoderInput, Pipeline, PipelineConfig};
use image::{DynamicImage, RgbImage};
use std::path::PathBuf;

fn config() -> Option<PipelineConfig> {
    let dir = PathBuf::from(std::env::var("FACEVERIFY_MODEL_DIR").ok()?);
    let detector_model = dir.join(DETECTOR_MODEL_FILE);
    let recognizer_model = dir.join(SFACE_MODEL_FILE);
    if !detector_model.exists() || !recognizer_model.exists() {
        return None;
    }

    Some(PipelineConfig {
        detector_model,
        recognizer_model,
        encoder_input: EncoderInput::SFACE,
        score_threshold: 0.6,
        nms_threshold: 0.3,
    })
}

#[test]
fn blank_image_has_no_face() -> Result<()> {
    env_logger::try_init().ok();
    let Some(cfg) = config() else {
        eprintln!("Skipping: models not found");
        return Ok(());
    };

    let mut pipeline = Pipeline::load(&cfg)?;
    assert_eq!(pipeline.dimension(), 128);
    let blank = DynamicImage::ImageRgb8(RgbImage::new(320, 240));
    assert!(pipeline.extract_embedding(&blank)?.is_none());
    Ok(())
}

#[test]
fn recognizer_with_wrong_input_size_fails_to_load() {
    let Some(cfg) = config() else {
        eprintln!("Skipping: models not found");
        return;
    };

    // SFace is traced at a fixed 112x112
    let cfg = PipelineConfig {
        encoder_input: EncoderInput::FACENET,
        ..cfg
    };
    let err = Pipeline::load(&cfg).err().expect("160x160 input accepted by SFace");
    assert!(format!("{:#}", err).contains("rejected a 160x160 input"));
}

#[test]
fn same_photo_embeds_identically() -> Result<()> {
    env_logger::try_init().ok();
    let Some(cfg) = config() else {
        eprintln!("Skipping: models not found");
        return Ok(());
    };

    let img_path = "test_faces/face1.png";
    if !std::path::Path::new(img_path).exists() {
        eprintln!("Skipping: {} not found", img_path);
        return Ok(());
    }

    let mut pipeline = Pipeline::load(&cfg)?;
    let img = image::open(img_path)?;

    let Some((detection, first)) = pipeline.process_image(&img)? else {
        anyhow::bail!("no face detected in {}", img_path);
    };
    println!("{}: score {:.3}, bbox {:?}", img_path, detection.score, detection.bbox);

    let second = pipeline.extract_embedding(&img)?.expect("face detected once already");
    assert_eq!(first.len(), 128);
    assert_eq!(first, second);
    Ok(())
}
