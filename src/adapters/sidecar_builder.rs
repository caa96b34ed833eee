//! Builders for tailing sidecar containers and their host-path volumes

use k8s_openapi::api::core::v1::{Container, EnvVar, HostPathVolumeSource, Volume, VolumeMount};

/// Environment variable carrying the path of the file to tail
pub const SIDECAR_ENV: &str = "PATH_TO_TAIL";

/// Name prefix shared by every tailing sidecar container
pub const SIDECAR_CONTAINER_PREFIX: &str = "tailing-sidecar";

/// Name prefix shared by every tailing sidecar host-path volume
pub const HOST_PATH_VOLUME_PREFIX: &str = "volume-sidecar";

/// Mount path of the staging volume inside the sidecar
pub const HOST_PATH_MOUNT_PATH: &str = "/tailing-sidecar/var";

/// Default root directory on the node for sidecar staging directories
pub const DEFAULT_HOST_PATH_ROOT: &str = "/var/log/tailing-sidecar-fluentbit";

const HOST_PATH_TYPE: &str = "DirectoryOrCreate";

/// Container name for sidecar `id`
pub fn sidecar_container_name(id: u32) -> String {
    format!("{}{}", SIDECAR_CONTAINER_PREFIX, id)
}

/// Host-path volume name for sidecar `id`
pub fn host_path_volume_name(id: u32) -> String {
    format!("{}{}", HOST_PATH_VOLUME_PREFIX, id)
}

/// Whether a container is a tailing sidecar
pub fn is_sidecar(container: &Container) -> bool {
    container.name.starts_with(SIDECAR_CONTAINER_PREFIX)
}

/// Numeric identifier of a sidecar container, if its name carries one
pub fn sidecar_id(container: &Container) -> Option<u32> {
    container
        .name
        .strip_prefix(SIDECAR_CONTAINER_PREFIX)
        .and_then(|suffix| suffix.parse().ok())
}

/// Numeric identifier of a sidecar host-path volume, if the name carries one
pub fn host_path_volume_id(volume_name: &str) -> Option<u32> {
    volume_name
        .strip_prefix(HOST_PATH_VOLUME_PREFIX)
        .and_then(|suffix| suffix.parse().ok())
}

/// Build the host-path volume backing sidecar `id`'s staging directory
pub fn build_host_path_volume(id: u32, host_path_dir: &str) -> Volume {
    Volume {
        name: host_path_volume_name(id),
        host_path: Some(HostPathVolumeSource {
            path: format!("{}/{}", host_path_dir, sidecar_container_name(id)),
            type_: Some(HOST_PATH_TYPE.to_string()),
        }),
        ..Default::default()
    }
}

/// Build sidecar `id` tailing `file` from the existing `source_mount`
pub fn build_sidecar_container(
    id: u32,
    image: &str,
    file: &str,
    source_mount: VolumeMount,
) -> Container {
    Container {
        name: sidecar_container_name(id),
        image: Some(image.to_string()),
        env: Some(vec![EnvVar {
            name: SIDECAR_ENV.to_string(),
            value: Some(file.to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            source_mount,
            VolumeMount {
                name: host_path_volume_name(id),
                mount_path: HOST_PATH_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

/// Whether the container tails `file`
pub fn tails_file(container: &Container, file: &str) -> bool {
    container.env.iter().flatten().any(|env| {
        env.name == SIDECAR_ENV && env.value.as_deref() == Some(file)
    })
}

/// Whether the container mounts the volume named `volume`
pub fn mounts_volume(container: &Container, volume: &str) -> bool {
    container
        .volume_mounts
        .iter()
        .flatten()
        .any(|mount| mount.name == volume)
}

/// Find the first mount named `volume` across all containers
pub fn find_volume_mount(containers: &[Container], volume: &str) -> Option<VolumeMount> {
    containers
        .iter()
        .flat_map(|c| c.volume_mounts.iter().flatten())
        .find(|mount| mount.name == volume)
        .cloned()
}
