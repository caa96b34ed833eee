//! Reconciliation of tailing sidecars against the desired configs
//!
//! Everything here is a pure function of its inputs: the desired configs are
//! recomputed on every admission call and the reconciliation is idempotent,
//! so no state is kept between calls.

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::api::core::v1::{Container, Volume};
use kube::ResourceExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::annotation;
use crate::adapters::sidecar_builder::{
    build_host_path_volume, build_sidecar_container, find_volume_mount, host_path_volume_id,
    is_sidecar, mounts_volume, sidecar_id, tails_file,
};
use crate::crd::{SidecarConfig, TailingSidecar};

/// Fold the configs of every TailingSidecar into one named set
///
/// Resources are folded in name order, so when two of them declare the same
/// config name the one with the greatest resource name wins.
pub fn join_tailing_sidecar_configs(
    tailing_sidecars: &[TailingSidecar],
) -> BTreeMap<String, SidecarConfig> {
    let mut ordered: Vec<&TailingSidecar> = tailing_sidecars.iter().collect();
    ordered.sort_by_key(|ts| ts.name_any());

    let mut configs = BTreeMap::new();
    for tailing_sidecar in ordered {
        for (name, config) in &tailing_sidecar.spec.configs {
            configs.insert(name.clone(), config.clone());
        }
    }
    configs
}

/// Merge TailingSidecar configs with the configs of the Pod annotation
///
/// Annotation entries override resource configs of the same name. The
/// result holds at most one config per (file, volume) pair; on duplicates
/// the entry with the smallest name is kept.
pub fn resolve_configs(
    tailing_sidecars: &[TailingSidecar],
    annotation_value: &str,
) -> BTreeMap<String, SidecarConfig> {
    let mut configs = join_tailing_sidecar_configs(tailing_sidecars);

    let (annotation_configs, errors) = annotation::parse_annotation(annotation_value);
    for e in errors {
        warn!(error = %e, "Skipping malformed tailing-sidecar annotation entry");
    }
    configs.extend(annotation_configs);

    let mut seen = HashSet::new();
    configs.retain(|_, config| seen.insert(config.clone()));
    configs
}

/// Fresh random token used for Pods that have no name yet
pub fn fresh_token() -> String {
    Uuid::new_v4().to_string()
}

/// Directory on the node under which a Pod's sidecars stage their data
///
/// Pods with a namespace and a name get `<root>/<namespace>/<name>`. Pods
/// still waiting for a generated name get
/// `<root>/<generateName without trailing '-'>/<token>`, which differs on
/// every call.
pub fn host_path_dir(
    root: &str,
    namespace: &str,
    name: &str,
    generate_name: &str,
    token: impl FnOnce() -> String,
) -> String {
    if !namespace.is_empty() && !name.is_empty() {
        return format!("{}/{}/{}", root, namespace, name);
    }
    format!("{}/{}/{}", root, generate_name.trim_end_matches('-'), token())
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Names of sidecars created in this pass
    pub added: Vec<String>,
    /// Names of existing sidecars that were kept
    pub kept: Vec<String>,
    /// Names of existing sidecars that were removed
    pub removed: Vec<String>,
    /// Configs skipped because no container mounts their volume or no
    /// identifier is left to assign
    pub skipped: Vec<SidecarConfig>,
}

impl ReconcileReport {
    /// Whether the pass changed the Pod
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Containers and volumes after reconciliation
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
    pub report: ReconcileReport,
}

fn satisfies(container: &Container, config: &SidecarConfig) -> bool {
    tails_file(container, &config.file) && mounts_volume(container, &config.volume)
}

/// First identifier that can be assigned without reusing one still in use
///
/// Starts at the number of existing sidecars and moves past any
/// `tailing-sidecar<N>` container or `volume-sidecar<N>` volume present.
/// Returns `None` when the greatest identifier in use is `u32::MAX`.
fn first_free_id(containers: &[Container], volumes: &[Volume]) -> Option<u32> {
    let existing = containers.iter().filter(|c| is_sidecar(c)).count() as u32;
    let max_in_use = containers
        .iter()
        .filter_map(sidecar_id)
        .chain(volumes.iter().filter_map(|v| host_path_volume_id(&v.name)))
        .max();

    match max_in_use {
        Some(max) => max.checked_add(1).map(|next| existing.max(next)),
        None => Some(existing),
    }
}

/// Bring the sidecars of a Pod in line with the desired configs
///
/// Existing sidecars with a satisfying config are kept, the others removed
/// together with the host-path volumes only they mounted. Each unsatisfied
/// config gets a new sidecar, unless no container mounts its volume.
/// Non-sidecar containers are returned untouched and in order.
pub fn reconcile(
    containers: &[Container],
    volumes: &[Volume],
    desired: &BTreeMap<String, SidecarConfig>,
    host_path_dir: &str,
    image: &str,
) -> Reconciled {
    let mut report = ReconcileReport::default();
    let mut next_id = first_free_id(containers, volumes);

    // Every (file, volume) pair is claimed by at most one sidecar, existing
    // or new, so duplicates never survive a pass.
    let mut claimed: HashSet<&SidecarConfig> = HashSet::new();
    let mut kept_containers = Vec::with_capacity(containers.len());
    let mut removed_containers = Vec::new();

    for container in containers {
        if !is_sidecar(container) {
            kept_containers.push(container.clone());
            continue;
        }

        let satisfied = desired
            .values()
            .find(|config| !claimed.contains(config) && satisfies(container, config));

        match satisfied {
            Some(config) => {
                claimed.insert(config);
                report.kept.push(container.name.clone());
                kept_containers.push(container.clone());
            }
            None => {
                report.removed.push(container.name.clone());
                removed_containers.push(container);
            }
        }
    }

    let mut new_containers = Vec::new();
    let mut new_volumes = Vec::new();

    for (name, config) in desired {
        if claimed.contains(config) {
            info!(
                config = %name,
                file = %config.file,
                volume = %config.volume,
                "Tailing sidecar exists"
            );
            continue;
        }

        let Some(source_mount) = find_volume_mount(containers, &config.volume) else {
            warn!(
                config = %name,
                file = %config.file,
                volume = %config.volume,
                "Failed to find volume, skipping tailing sidecar"
            );
            report.skipped.push(config.clone());
            continue;
        };

        let Some(id) = next_id else {
            warn!(
                config = %name,
                file = %config.file,
                volume = %config.volume,
                "No free sidecar identifier, skipping tailing sidecar"
            );
            report.skipped.push(config.clone());
            continue;
        };

        let container = build_sidecar_container(id, image, &config.file, source_mount);
        info!(
            config = %name,
            file = %config.file,
            volume = %config.volume,
            container = %container.name,
            "Adding tailing sidecar"
        );
        report.added.push(container.name.clone());
        new_volumes.push(build_host_path_volume(id, host_path_dir));
        new_containers.push(container);
        claimed.insert(config);
        next_id = id.checked_add(1);
    }

    // Host-path volumes of removed sidecars go with them, unless a kept
    // container still mounts them.
    let kept_volumes = volumes.iter().filter(|volume| {
        let owned_by_removed = volume.host_path.is_some()
            && host_path_volume_id(&volume.name).is_some()
            && removed_containers
                .iter()
                .any(|c| mounts_volume(c, &volume.name));
        !owned_by_removed || kept_containers.iter().any(|c| mounts_volume(c, &volume.name))
    });

    for name in &report.removed {
        info!(container = %name, "Removing tailing sidecar");
    }

    let volumes = kept_volumes.cloned().chain(new_volumes).collect();
    kept_containers.extend(new_containers);

    Reconciled {
        containers: kept_containers,
        volumes,
        report,
    }
}
