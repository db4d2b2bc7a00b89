//! Concrete workflow plans.
//!
//! Three workflows cover the caller-facing operations: full 3D model
//! generation from a photo, preview rendering for garments that lack one,
//! and garment try-on against a generated avatar. Every stage container
//! fetches its inputs from the object store and writes its outputs back;
//! the plans here only wire up images, arguments, and key templates.

use crate::config::PipelineConfig;
use crate::pipeline::plan::WorkflowPlan;
use crate::stage::descriptor::{Bindings, StageCommand, StageDescriptor};
use crate::store::keys::{
    garment_display_name, Gender, FIT_KEY, GARMENT_KEY, IMAGE_KEY, KEYPOINTS_KEY, MODEL_KEY,
    SMOOTH_MODEL_KEY,
};

/// Image running pose estimation.
pub const OPENPOSE_IMAGE: &str = "openpose";
/// Image running body mesh fitting.
pub const SMPLIFY_IMAGE: &str = "smplify-x";
/// Image running mesh smoothing, preview rendering, and cloth simulation.
pub const BLENDER_IMAGE: &str = "blender:latest";

/// Builds the model generation workflow:
/// photo → keypoints → fitted mesh → smoothed mesh.
pub fn model_generation_plan(config: &PipelineConfig) -> WorkflowPlan {
    let data = config.data_bucket.as_str();

    WorkflowPlan::new("model-generation", [IMAGE_KEY])
        .with_stage(
            StageDescriptor::new("pose-keypoints", OPENPOSE_IMAGE)
                .with_command(
                    StageCommand::new()
                        .arg("python3")
                        .arg("generate_keypoints.py")
                        .arg(data)
                        .template(IMAGE_KEY),
                )
                .require(data, IMAGE_KEY)
                .produce(data, KEYPOINTS_KEY)
                .with_network(&config.network)
                .with_gpu(true)
                .with_timeout(config.stage_timeout),
        )
        .with_stage(
            StageDescriptor::new("mesh-fit", SMPLIFY_IMAGE)
                .with_command(
                    StageCommand::new()
                        .arg("python3")
                        .arg("generate_mesh.py")
                        .arg(data)
                        .template(IMAGE_KEY)
                        .template(KEYPOINTS_KEY)
                        .template("{gender}"),
                )
                .require(data, IMAGE_KEY)
                .require(data, KEYPOINTS_KEY)
                .produce(data, MODEL_KEY)
                .with_network(&config.network)
                .with_gpu(true)
                .with_timeout(config.stage_timeout),
        )
        .with_stage(
            StageDescriptor::new("mesh-smooth", BLENDER_IMAGE)
                .with_command(
                    StageCommand::new()
                        .arg("python3")
                        .arg("./minio_helpers/fetch_shade_smooth.py")
                        .arg(data)
                        .template(MODEL_KEY),
                )
                .require(data, MODEL_KEY)
                .produce(data, SMOOTH_MODEL_KEY)
                .with_network(&config.network)
                .with_gpu(true)
                .with_timeout(config.stage_timeout),
        )
}

/// Bindings for one model generation run.
///
/// `folder_id` is the caller-supplied unique identifier threaded through
/// every key template; `ext` carries its leading dot.
pub fn model_bindings(folder_id: &str, ext: &str, gender: Gender) -> Bindings {
    Bindings::new()
        .with("id", folder_id)
        .with("ext", ext)
        .with("gender", gender.as_str())
}

/// Builds the preview generation workflow for a set of blend files without
/// a preview render.
///
/// One blender run renders all missing previews; the container receives the
/// comma-joined blend keys, mirroring its fetch script contract.
pub fn preview_generation_plan(
    config: &PipelineConfig,
    missing_previews: &[String],
) -> WorkflowPlan {
    let clothes = config.clothes_bucket.as_str();

    let mut stage = StageDescriptor::new("garment-previews", BLENDER_IMAGE)
        .with_command(
            StageCommand::new()
                .arg("python3")
                .arg("./minio_helpers/fetch_generate_preview.py")
                .arg(clothes)
                .arg(missing_previews.join(",")),
        )
        .with_network(&config.network)
        .with_gpu(true)
        .with_timeout(config.stage_timeout);

    for blend in missing_previews {
        stage = stage.require(clothes, blend.as_str());
        let mut parts = blend.split('/');
        if let (Some(clothing), Some(gender)) = (parts.next(), parts.next()) {
            stage = stage.produce(clothes, format!("previews/{clothing}/{gender}.png").as_str());
        }
    }

    WorkflowPlan::new(
        "preview-generation",
        missing_previews.iter().map(String::clone),
    )
    .with_stage(stage)
}

/// Builds the try-on workflow: fits one garment onto a generated avatar.
pub fn try_on_plan(config: &PipelineConfig) -> WorkflowPlan {
    let data = config.data_bucket.as_str();
    let clothes = config.clothes_bucket.as_str();

    WorkflowPlan::new("try-on", ["{avatar_obj}", GARMENT_KEY]).with_stage(
        StageDescriptor::new("cloth-fit", BLENDER_IMAGE)
            .with_command(
                StageCommand::new()
                    .arg("python3")
                    .arg("./minio_helpers/fetch_try_on.py")
                    .arg(data)
                    .arg(clothes)
                    .template("{avatar_obj}")
                    .template(GARMENT_KEY)
                    .template("{gender}")
                    .template("{quality}")
                    .template("{color}"),
            )
            .require(data, "{avatar_obj}")
            .require(clothes, GARMENT_KEY)
            .produce(data, FIT_KEY)
            .with_network(&config.network)
            .with_gpu(true)
            .with_timeout(config.stage_timeout),
    )
}

/// Bindings for one try-on run.
pub fn try_on_bindings(
    avatar_obj_key: &str,
    clothing: &str,
    gender: Gender,
    size: &str,
    quality: &str,
    color: &str,
) -> Bindings {
    Bindings::new()
        .with("avatar_obj", avatar_obj_key)
        .with("clothing", clothing)
        .with("gender", gender.as_str())
        .with("size", size)
        .with("garment", garment_display_name(clothing))
        .with("quality", quality)
        .with("color", color)
}
