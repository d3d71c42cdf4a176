/*!
 * Hook Registry Tests
 * Version-gated patching with on-disk metadata, subpath filtering, and the
 * patch failure boundary
 */

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tracetap::{Hook, HookRegistry, ModuleExports, ModuleLoad};

struct Surface(&'static str);

fn exports(tag: &'static str) -> ModuleExports {
    Arc::new(Surface(tag))
}

fn surface_tag(exports: &ModuleExports) -> &'static str {
    exports.downcast_ref::<Surface>().unwrap().0
}

fn module_dir(version: Option<&str>) -> TempDir {
    let dir = TempDir::new().unwrap();
    if let Some(version) = version {
        fs::write(
            dir.path().join("package.json"),
            format!(r#"{{"name": "kafkajs", "version": "{version}"}}"#),
        )
        .unwrap();
    }
    dir
}

fn counting_registration(registry: &HookRegistry, hook: Hook) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    registry
        .register(
            hook,
            Box::new(move |exports| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(exports)
            }),
        )
        .unwrap();
    calls
}

#[test]
fn test_version_in_range_is_patched() {
    let registry = HookRegistry::new();
    let calls = counting_registration(&registry, Hook::new("kafkajs").with_versions(&[">=1.4"]));

    let dir = module_dir(Some("1.5.2"));
    registry.notify_load(ModuleLoad::new("kafkajs", exports("kafkajs")).with_base_dir(dir.path()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_version_out_of_range_is_never_offered() {
    let registry = HookRegistry::new();
    let calls = counting_registration(&registry, Hook::new("kafkajs").with_versions(&[">=1.4"]));

    let dir = module_dir(Some("1.3.0"));
    let original = exports("kafkajs");
    let returned = registry
        .notify_load(ModuleLoad::new("kafkajs", Arc::clone(&original)).with_base_dir(dir.path()));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&returned, &original));
}

#[test]
fn test_missing_metadata_fails_open() {
    let registry = HookRegistry::new();
    let calls = counting_registration(&registry, Hook::new("kafkajs").with_versions(&[">=1.4"]));

    // Base dir exists but carries no manifest.
    let dir = module_dir(None);
    registry.notify_load(ModuleLoad::new("kafkajs", exports("kafkajs")).with_base_dir(dir.path()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_loose_manifest_version_is_coerced() {
    let registry = HookRegistry::new();
    let calls = counting_registration(&registry, Hook::new("kafkajs").with_versions(&[">=1.4"]));

    let dir = module_dir(Some("1.4"));
    registry.notify_load(ModuleLoad::new("kafkajs", exports("kafkajs")).with_base_dir(dir.path()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_subpath_load_does_not_reach_main_registration() {
    let registry = HookRegistry::new();
    let main_calls = counting_registration(&registry, Hook::new("pubsub"));
    let lease_calls = counting_registration(
        &registry,
        Hook::new("pubsub").with_file("build/src/lease-manager.js"),
    );

    registry.notify_load(ModuleLoad::new(
        "pubsub\\build\\src\\lease-manager.js",
        exports("lease"),
    ));

    assert_eq!(main_calls.load(Ordering::SeqCst), 0);
    assert_eq!(lease_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_distinct_loads_each_get_one_patch_attempt() {
    let registry = HookRegistry::new();
    let calls = counting_registration(&registry, Hook::new("kafkajs"));

    let first = module_dir(Some("2.0.0"));
    let second = module_dir(Some("2.1.0"));
    let load_a = ModuleLoad::new("kafkajs", exports("a")).with_base_dir(first.path());
    let load_b = ModuleLoad::new("kafkajs", exports("b")).with_base_dir(second.path());

    registry.notify_load(load_a.clone());
    registry.notify_load(load_b);
    // A duplicate notification of the same physical load is ignored.
    registry.notify_load(load_a);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_patch_keeps_host_running_on_original_surface() {
    let registry = HookRegistry::new();
    registry
        .register(
            Hook::new("kafkajs"),
            Box::new(|_| {
                Err(tracetap::HookError::PatchFailed {
                    module: "kafkajs".into(),
                    reason: "constructor moved".into(),
                })
            }),
        )
        .unwrap();
    // A second, healthy registration still composes on the original.
    registry
        .register(Hook::new("kafkajs"), Box::new(|_| Ok(exports("patched"))))
        .unwrap();

    let returned = registry.notify_load(ModuleLoad::new("kafkajs", exports("original")));
    assert_eq!(surface_tag(&returned), "patched");
}
