//! Invocation descriptor
//!
//! One fully resolved `create` request: the generated name, the image, the
//! passthrough modes and every container/host option from the deployment
//! config, rendered into the runtime's argument vector.

use poddeploy_foundation::{CgroupNamespace, DeploymentConfig, NetworkMode, PodmanConfig};
use std::collections::BTreeMap;

/// Everything needed to create one container
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationSpec {
    /// Container name (`prefix_suffix`)
    pub name: String,
    /// Image reference
    pub image: String,
    pub cgroup_ns: Option<CgroupNamespace>,
    pub network: Option<NetworkMode>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub domainname: Option<String>,
    pub working_dir: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// `SOURCE:TARGET[:OPTIONS]` entries
    pub binds: Vec<String>,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
    pub read_only: bool,
    pub memory: Option<u64>,
    pub nano_cpus: Option<u64>,
    pub pids_limit: Option<i64>,
    /// Arguments after the image
    pub command: Vec<String>,
}

impl InvocationSpec {
    /// Bare spec with no options
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cgroup_ns: None,
            network: None,
            env: Vec::new(),
            user: None,
            hostname: None,
            domainname: None,
            working_dir: None,
            labels: BTreeMap::new(),
            binds: Vec::new(),
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            security_opt: Vec::new(),
            read_only: false,
            memory: None,
            nano_cpus: None,
            pids_limit: None,
            command: Vec::new(),
        }
    }

    /// Merge the deployment options and passthrough modes with a name and image.
    ///
    /// An explicit `networkMode` wins over `NetworkDisabled`.
    pub fn resolve(
        podman: &PodmanConfig,
        deployment: &DeploymentConfig,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        let container = &deployment.container;
        let host = &deployment.host;

        let network = podman.network().or_else(|| {
            if container.network_disabled {
                Some(NetworkMode::None)
            } else {
                None
            }
        });

        Self {
            cgroup_ns: podman.cgroup_namespace(),
            network,
            env: container.env.clone(),
            user: container.user.clone(),
            hostname: container.hostname.clone(),
            domainname: container.domainname.clone(),
            working_dir: container.working_dir.clone(),
            labels: container.labels.clone(),
            binds: host.binds.clone(),
            cap_add: host.cap_add.clone(),
            cap_drop: host.cap_drop.clone(),
            security_opt: host.security_opt.clone(),
            read_only: host.readonly_rootfs,
            memory: host.memory,
            nano_cpus: host.nano_cpus,
            pids_limit: host.pids_limit,
            command: container.cmd.clone(),
            ..Self::new(name, image)
        }
    }

    /// Build `create` arguments (without the subcommand itself)
    pub fn build_args(&self) -> Vec<String> {
        // Keep stdin open so the attach step can stream into it
        let mut args = vec!["--interactive".to_string()];

        args.push("--name".to_string());
        args.push(self.name.clone());

        // Namespaces
        if let Some(cgroup_ns) = &self.cgroup_ns {
            args.push("--cgroupns".to_string());
            args.push(cgroup_ns.to_string());
        }
        if let Some(network) = &self.network {
            args.push("--network".to_string());
            args.push(network.to_string());
        }

        // Identity
        if let Some(user) = &self.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        if let Some(hostname) = &self.hostname {
            args.push("--hostname".to_string());
            args.push(hostname.clone());
        }
        if let Some(domainname) = &self.domainname {
            args.push("--domainname".to_string());
            args.push(domainname.clone());
        }
        if let Some(dir) = &self.working_dir {
            args.push("--workdir".to_string());
            args.push(dir.clone());
        }

        // Environment
        for entry in &self.env {
            args.push("--env".to_string());
            args.push(entry.clone());
        }

        // Volumes
        for bind in &self.binds {
            args.push("--volume".to_string());
            args.push(bind.clone());
        }

        // Resource limits
        if let Some(memory) = self.memory {
            args.push("--memory".to_string());
            args.push(memory.to_string());
        }
        if let Some(nano_cpus) = self.nano_cpus {
            args.push("--cpus".to_string());
            args.push(format_cpus(nano_cpus));
        }
        if let Some(pids) = self.pids_limit {
            args.push("--pids-limit".to_string());
            args.push(pids.to_string());
        }
        if self.read_only {
            args.push("--read-only".to_string());
        }

        // Security
        for cap in &self.cap_drop {
            args.push("--cap-drop".to_string());
            args.push(cap.clone());
        }
        for cap in &self.cap_add {
            args.push("--cap-add".to_string());
            args.push(cap.clone());
        }
        for opt in &self.security_opt {
            args.push("--security-opt".to_string());
            args.push(opt.clone());
        }

        // Labels
        for (key, value) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        // Image
        args.push(self.image.clone());

        // Command
        args.extend(self.command.iter().cloned());

        args
    }
}

/// `NanoCpus` -> `--cpus` value, e.g. 1_500_000_000 -> "1.5"
fn format_cpus(nano_cpus: u64) -> String {
    let whole = nano_cpus / 1_000_000_000;
    let frac = nano_cpus % 1_000_000_000;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:09}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
