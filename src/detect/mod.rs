mod backend;
mod backends;
mod labels;

use anyhow::{anyhow, Result};

pub use backend::{DetectorBackend, RawDetection};
pub use backends::{ScriptedBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{LabelMap, COCO_CLASSES};

use crate::config::DetectorSettings;

/// Build the backend named in the settings.
pub fn build_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let labels = match &settings.labels_path {
        Some(path) => LabelMap::from_file(path)?,
        None => LabelMap::coco(),
    };
    let mut backend: Box<dyn DetectorBackend> = match settings.backend.as_str() {
        "stub" => Box::new(StubBackend::new(labels)),
        "tract" => build_tract(settings, labels)?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };
    backend.warm_up()?;
    log::info!(
        "detector backend {} ready ({} classes)",
        backend.name(),
        backend.labels().len()
    );
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings, labels: LabelMap) -> Result<Box<dyn DetectorBackend>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("the tract backend requires detector.model_path"))?;
    Ok(Box::new(TractBackend::new(
        model_path,
        labels,
        settings.input_width,
        settings.input_height,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings, _labels: LabelMap) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("the tract backend requires the backend-tract feature"))
}
