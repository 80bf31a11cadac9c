//! Building container images for the topology from local sources.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::exec::Executor;

/// Build the image at `path` and return its id (the last line `docker build
/// --quiet` prints). Failure diagnostics land in the system temp dir.
pub fn build_image_from_path(docker: &str, name: &str, path: &Path) -> Result<String> {
    if !path.is_dir() {
        bail!("image source for {name} is not a directory: {}", path.display());
    }
    let path_arg = path.to_string_lossy();
    info!(image = name, path = %path.display(), "building image");

    let out = Executor::new(std::env::temp_dir())
        .run_checked(&[docker, "build", "--quiet", &*path_arg])
        .with_context(|| format!("build image {name}"))?;
    let stdout = out.stdout_str();
    let id = stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
        .with_context(|| format!("docker build printed no image id for {name}: {stdout:?}"))?;
    info!(image = name, id = %id, "built image");
    Ok(id)
}

/// Build an image from inline Dockerfile contents.
pub fn build_image_from_dockerfile(docker: &str, name: &str, dockerfile: &str) -> Result<String> {
    let dir = tempfile::tempdir().context("create image build dir")?;
    fs::write(dir.path().join("Dockerfile"), dockerfile)
        .with_context(|| format!("write Dockerfile for {name}"))?;
    build_image_from_path(docker, name, dir.path())
}
