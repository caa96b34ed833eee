//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, Pod, PodSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tailing_sidecar_operator::adapters::annotation::SIDECAR_ANNOTATION;
use tailing_sidecar_operator::adapters::tailing_sidecars::ConfigSource;
use tailing_sidecar_operator::crd::{SidecarConfig, TailingSidecar, TailingSidecarSpec};
use tailing_sidecar_operator::{Error, Result};

pub const NAMESPACE: &str = "default";
pub const POD_NAME: &str = "app-pod";
pub const IMAGE: &str = "sumologic/tailing-sidecar:test";
pub const ROOT: &str = "/var/log/tailing-sidecar-fluentbit";

/// A container mounting `volume` at `/data/<volume>`
pub fn app_container(name: &str, volume: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some("busybox".to_string()),
        volume_mounts: Some(vec![VolumeMount {
            name: volume.to_string(),
            mount_path: format!("/data/{}", volume),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Pod with one `app` container mounting the `app-data` volume
pub fn app_pod(annotation: Option<&str>) -> Pod {
    let annotations = annotation.map(|value| {
        BTreeMap::from([(SIDECAR_ANNOTATION.to_string(), value.to_string())])
    });

    Pod {
        metadata: ObjectMeta {
            name: Some(POD_NAME.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            annotations,
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![app_container("app", "app-data")],
            volumes: Some(vec![empty_dir_volume("app-data")]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn tailing_sidecar(name: &str, configs: &[(&str, &str, &str)]) -> TailingSidecar {
    let configs = configs
        .iter()
        .map(|(config_name, file, volume)| {
            (config_name.to_string(), SidecarConfig::new(*file, *volume))
        })
        .collect();

    let mut resource = TailingSidecar::new(name, TailingSidecarSpec { configs });
    resource.metadata.namespace = Some(NAMESPACE.to_string());
    resource
}

pub fn desired(configs: &[(&str, &str, &str)]) -> BTreeMap<String, SidecarConfig> {
    configs
        .iter()
        .map(|(name, file, volume)| (name.to_string(), SidecarConfig::new(*file, *volume)))
        .collect()
}

/// In-memory TailingSidecar source
#[derive(Default)]
pub struct FakeSource {
    pub items: Vec<TailingSidecar>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl FakeSource {
    pub fn with(items: Vec<TailingSidecar>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl ConfigSource for FakeSource {
    async fn list_tailing_sidecars(&self, namespace: &str) -> Result<Vec<TailingSidecar>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::KubeError(format!(
                "tailingsidecars is forbidden in namespace {}",
                namespace
            )));
        }
        Ok(self
            .items
            .iter()
            .filter(|ts| ts.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }
}

pub fn containers(pod: &Pod) -> &[Container] {
    pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or(&[])
}

pub fn volumes(pod: &Pod) -> &[Volume] {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_deref())
        .unwrap_or(&[])
}

pub fn container_names(pod: &Pod) -> Vec<String> {
    containers(pod).iter().map(|c| c.name.clone()).collect()
}

pub fn volume_names(pod: &Pod) -> Vec<String> {
    volumes(pod).iter().map(|v| v.name.clone()).collect()
}
