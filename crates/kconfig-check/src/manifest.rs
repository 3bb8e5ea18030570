use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::check::CheckInputs;
use crate::error::{Error, Result};

/// Inputs of one config check, recorded in a TOML file.
///
/// Relative paths are resolved against the directory of the manifest.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CheckManifest {
    pub dot_config: Option<PathBuf>,
    pub defconfig: Option<PathBuf>,
    pub pre_defconfig_fragments: Vec<PathBuf>,
    pub post_defconfig_fragments: Vec<PathBuf>,
}

/// Values given on the command line. They take precedence over the manifest.
#[derive(Debug, Clone, Default)]
pub struct InputOverrides {
    pub dot_config: Option<PathBuf>,
    pub defconfig: Option<PathBuf>,
    pub pre_defconfig_fragments: Vec<PathBuf>,
    pub post_defconfig_fragments: Vec<PathBuf>,
}

fn resolve_ref_path(from_file: &Path, reference: &Path) -> PathBuf {
    if reference.is_absolute() {
        reference.to_path_buf()
    } else {
        from_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(reference)
    }
}

pub fn load(path: &Path) -> Result<CheckManifest> {
    let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut manifest: CheckManifest = toml::from_str(&data).map_err(|e| Error::Manifest {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })?;

    manifest.dot_config = manifest.dot_config.map(|p| resolve_ref_path(path, &p));
    manifest.defconfig = manifest.defconfig.map(|p| resolve_ref_path(path, &p));
    for p in manifest
        .pre_defconfig_fragments
        .iter_mut()
        .chain(manifest.post_defconfig_fragments.iter_mut())
    {
        let resolved = resolve_ref_path(path, p);
        *p = resolved;
    }

    tracing::debug!(
        manifest = %path.display(),
        pre = manifest.pre_defconfig_fragments.len(),
        post = manifest.post_defconfig_fragments.len(),
        "loaded check manifest"
    );
    Ok(manifest)
}

impl CheckManifest {
    /// Combines the manifest with command line values. A non-empty fragment
    /// list on the command line replaces the manifest's list.
    pub fn into_inputs(self, overrides: InputOverrides) -> Result<CheckInputs> {
        let Some(dot_config) = overrides.dot_config.or(self.dot_config) else {
            return Err(Error::Usage(
                "--dot_config is required (on the command line or as dot_config in the manifest)"
                    .into(),
            ));
        };
        let pick = |cli: Vec<PathBuf>, manifest: Vec<PathBuf>| {
            if cli.is_empty() { manifest } else { cli }
        };
        Ok(CheckInputs {
            dot_config,
            defconfig: overrides.defconfig.or(self.defconfig),
            pre_defconfig_fragments: pick(
                overrides.pre_defconfig_fragments,
                self.pre_defconfig_fragments,
            ),
            post_defconfig_fragments: pick(
                overrides.post_defconfig_fragments,
                self.post_defconfig_fragments,
            ),
        })
    }
}
