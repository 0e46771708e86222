//! Making a worker image available locally.

use inferport_backends::WorkerImage;
use tracing::{debug, info};

use crate::config::RegistryCredentials;
use crate::engine::ContainerEngine;
use crate::error::{EngineResult, WorkerFailure};

/// Pull `image` unless it is already cached, logging in first for private
/// images.
///
/// Nothing serialises concurrent pulls of the same image.
pub async fn ensure_image(
    engine: &dyn ContainerEngine,
    image: &WorkerImage,
    credentials: Option<&RegistryCredentials>,
) -> EngineResult<()> {
    if engine.image_present(&image.name).await? {
        debug!(image = %image.name, "image already present");
        return Ok(());
    }
    if image.requires_credentials {
        let credentials = credentials.ok_or(WorkerFailure::CredentialsRequired)?;
        debug!(registry = %credentials.registry, "attempting login");
        engine.login(credentials).await?;
        debug!("login successful");
    }
    info!(image = %image.name, "Downloading container image...");
    engine.pull(&image.name).await?;
    info!("Download complete");
    Ok(())
}
