/*!
 * Module Hook Registry
 * Intercepts module loads by name/version/optional-subpath and applies a
 * patch function exactly once per matching load
 *
 * The host's composition point calls [`HookRegistry::notify_load`] exactly
 * once per distinct physical load, synchronously, before the loaded module
 * is handed to its original requester. A failing patch is logged and the
 * original export surface is returned; instrumentation failures never
 * surface to the application.
 */

pub mod version;

use crate::core::errors::HookError;
use crate::core::types::{HookResult, ModuleExports};
use dashmap::DashSet;
use parking_lot::RwLock;
use semver::VersionReq;
use serde::Deserialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// Patch function: receives the export surface, returns the surface the
/// host continues to bind to (normally a decorated replacement)
pub type PatchFn = Box<dyn Fn(ModuleExports) -> HookResult<ModuleExports> + Send + Sync>;

/// What to hook: a module name, optional accepted version ranges, and an
/// optional subpath within the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub name: String,
    pub versions: Vec<String>,
    pub file: Option<String>,
}

impl Hook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
            file: None,
        }
    }

    pub fn with_versions(mut self, versions: &[&str]) -> Self {
        self.versions = versions.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// The full load path this hook matches: `name` joined with `file`
    fn full_name(&self) -> String {
        match &self.file {
            Some(file) => format!("{}/{}", self.name, file),
            None => self.name.clone(),
        }
    }
}

/// One load event, as delivered by the host
#[derive(Clone)]
pub struct ModuleLoad {
    /// Reported load path (module name, possibly with a subpath; separators
    /// may be platform-specific)
    pub path: String,
    /// Base directory holding the module's version metadata, when resolvable
    pub base_dir: Option<PathBuf>,
    /// The module's exported surface
    pub exports: ModuleExports,
}

impl ModuleLoad {
    pub fn new(path: impl Into<String>, exports: ModuleExports) -> Self {
        Self {
            path: path.into(),
            base_dir: None,
            exports,
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }
}

struct Registration {
    id: u64,
    full_name: String,
    ranges: Vec<VersionReq>,
    patch: PatchFn,
}

/// Process-wide registry of module hooks
///
/// Registrations are created at startup and live for the process lifetime;
/// load dispatch is read-mostly. Multiple registrations on the same module
/// name (different subpaths or not) are independent and compose: each sees
/// the surface produced by the previous one.
#[derive(Default)]
pub struct HookRegistry {
    registrations: RwLock<Vec<Arc<Registration>>>,
    /// (registration id, load identity) pairs already patched - at most one
    /// patch attempt per qualifying physical load
    applied: DashSet<(u64, String)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a patch function for a module
    ///
    /// Fails only on an unparseable version range; at load time the patch
    /// itself can never fail the host.
    pub fn register(&self, hook: Hook, patch: PatchFn) -> HookResult<()> {
        let ranges = version::parse_ranges(&hook.versions)?;
        let mut registrations = self.registrations.write();
        let registration = Registration {
            id: registrations.len() as u64,
            full_name: hook.full_name(),
            ranges,
            patch,
        };
        debug!(module = %registration.full_name, "hook registered");
        registrations.push(Arc::new(registration));
        Ok(())
    }

    /// Offer one module load to every matching registration
    ///
    /// Returns the export surface subsequent host code should bind to:
    /// the composed result of the applied patches, or the original surface
    /// wherever a patch failed.
    pub fn notify_load(&self, load: ModuleLoad) -> ModuleExports {
        let canonical = load.path.replace('\\', "/");
        let load_key = match &load.base_dir {
            Some(dir) => format!("{}|{}", canonical, dir.display()),
            None => canonical.clone(),
        };

        let registrations: Vec<Arc<Registration>> = self
            .registrations
            .read()
            .iter()
            .filter(|reg| reg.full_name == canonical)
            .cloned()
            .collect();
        if registrations.is_empty() {
            return load.exports;
        }

        let version = resolve_version(load.base_dir.as_deref());
        let mut exports = load.exports;
        for registration in registrations {
            if !version::matches(version.as_deref(), &registration.ranges) {
                debug!(
                    module = %canonical,
                    version = version.as_deref().unwrap_or("unknown"),
                    "version out of range, skipping hook"
                );
                continue;
            }
            if !self.applied.insert((registration.id, load_key.clone())) {
                continue;
            }
            exports = apply_patch(&registration, exports);
        }
        exports
    }
}

/// Run one patch inside the failure boundary
///
/// On `Err` or panic the original surface is kept; the host never sees the
/// failure.
fn apply_patch(registration: &Registration, exports: ModuleExports) -> ModuleExports {
    let original = Arc::clone(&exports);
    match catch_unwind(AssertUnwindSafe(|| (registration.patch)(exports))) {
        Ok(Ok(patched)) => patched,
        Ok(Err(err)) => {
            error!(module = %registration.full_name, error = %err, "patch function failed, module left unpatched");
            original
        }
        Err(_) => {
            error!(module = %registration.full_name, "patch function panicked, module left unpatched");
            original
        }
    }
}

#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

/// Read the module's semantic version from the manifest at its base
/// directory; any failure resolves to `None` (fail-open)
fn resolve_version(base_dir: Option<&Path>) -> Option<String> {
    let manifest_path = base_dir?.join("package.json");
    let raw = std::fs::read_to_string(&manifest_path)
        .map_err(|err| {
            debug!(path = %manifest_path.display(), error = %err, "no readable version metadata");
            err
        })
        .ok()?;
    let manifest: PackageManifest = serde_json::from_str(&raw).ok()?;
    manifest.version
}
