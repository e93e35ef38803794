// Kernel Cache: on-disk artifacts
//
// Layout: `<root>/v<crate version>/<kernel name>.src` holds the kernel's
// textual form and `<kernel name>.kmod` a manifest with its code, suffix,
// operator hash and definition text. A manifest is reused only when its
// definitions match the request exactly. No machine code is stored: a disk
// load validates the manifest and re-lowers the kernel from the decoded code
// through the active kernel source, so `disk_loads` counts those validated
// rebuilds. Files are written to a temporary name and renamed into place.

use crate::compiler::backend::{CompiledKernel, KernelSource};
use crate::compiler::encode::{kernel_source, CellKernelSpec, KernelRequest};
use crate::core::error::{GraphBlasError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_MAGIC: &str = "rsk-kernel 1";
const DEFINITIONS_MARKER: &str = "\ndefinitions\n";

/// Directory holding the artifacts of this crate version
pub fn version_dir(root: &Path) -> PathBuf {
    root.join(format!("v{}", env!("CARGO_PKG_VERSION")))
}

pub fn manifest_path(root: &Path, request: &KernelRequest) -> PathBuf {
    version_dir(root).join(format!("{}.kmod", request.key.name()))
}

pub fn source_path(root: &Path, request: &KernelRequest) -> PathBuf {
    version_dir(root).join(format!("{}.src", request.key.name()))
}

fn io_error(path: &Path, e: std::io::Error) -> GraphBlasError {
    GraphBlasError::JitError(format!("{}: {}", path.display(), e))
}

/// Outcome of looking for a kernel on disk
pub(crate) enum DiskLookup {
    Missing,
    /// Same key, different definitions or a damaged manifest
    Mismatch,
    Loaded(CompiledKernel),
}

#[derive(Debug, PartialEq, Eq)]
struct Manifest {
    code: u64,
    suffix: String,
    hash: u64,
    definitions: String,
}

impl Manifest {
    fn render(&self) -> String {
        format!(
            "{}\ncode {:x}\nsuffix {}\nhash {:x}{}{}",
            MANIFEST_MAGIC, self.code, self.suffix, self.hash, DEFINITIONS_MARKER, self.definitions
        )
    }

    fn parse(text: &str) -> Option<Self> {
        let (head, definitions) = text.split_once(DEFINITIONS_MARKER)?;
        let mut lines = head.lines();
        if lines.next()? != MANIFEST_MAGIC {
            return None;
        }
        let code = u64::from_str_radix(lines.next()?.strip_prefix("code ")?, 16).ok()?;
        let suffix = lines.next()?.strip_prefix("suffix ")?.to_string();
        let hash = u64::from_str_radix(lines.next()?.strip_prefix("hash ")?, 16).ok()?;
        Some(Self {
            code,
            suffix,
            hash,
            definitions: definitions.to_string(),
        })
    }
}

/// Look for `request` under `root` and lower it through `source`
pub(crate) fn load(root: &Path, request: &KernelRequest, source: &dyn KernelSource) -> Result<DiskLookup> {
    let path = manifest_path(root, request);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DiskLookup::Missing),
        Err(e) => return Err(io_error(&path, e)),
    };
    let manifest = match Manifest::parse(&text) {
        Some(m) => m,
        None => {
            log::warn!("damaged kernel manifest {}", path.display());
            return Ok(DiskLookup::Mismatch);
        }
    };
    if manifest.code != request.key.code
        || manifest.suffix != request.key.suffix
        || manifest.hash != request.key.hash
        || manifest.definitions != request.definitions
    {
        log::debug!("kernel {} on disk has other definitions", request.key.name());
        return Ok(DiskLookup::Mismatch);
    }
    let spec = CellKernelSpec::decode(manifest.code)?;
    if spec != request.spec {
        return Ok(DiskLookup::Mismatch);
    }
    let kernel = source.build(&spec)?;
    log::info!("loaded kernel {} from {}", request.key.name(), path.display());
    Ok(DiskLookup::Loaded(kernel))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension(format!("tmp{}", std::process::id()));
    fs::write(&tmp, contents).map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_error(path, e)
    })
}

/// Persist the source and manifest of `request` under `root`
pub(crate) fn store(root: &Path, request: &KernelRequest) -> Result<()> {
    let dir = version_dir(root);
    fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
    write_atomic(&source_path(root, request), &kernel_source(request))?;
    let manifest = Manifest {
        code: request.key.code,
        suffix: request.key.suffix.clone(),
        hash: request.key.hash,
        definitions: request.definitions.clone(),
    };
    write_atomic(&manifest_path(root, request), &manifest.render())
}
