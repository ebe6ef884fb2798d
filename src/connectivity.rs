//! Post-apply reachability validation
//!
//! For every backend that is already running: confirm both proxy and backend
//! sit on the target network, then probe network-layer reachability between
//! them. Backends that have not been started yet are skipped with a note -
//! provisioning order may wire the network before starting services. Any
//! hard failure among running backends fails the whole deployment.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::backend::BackendSpec;
use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::proxy::{ProxyHosting, ReverseProxyTarget};
use crate::runner::CommandRunner;
use crate::topology::NetworkSpec;

/// What the validator checked and what it skipped
#[derive(Debug, Clone, Default)]
pub struct ConnectivityReport {
    /// Backends probed successfully
    pub checked: Vec<String>,
    /// Backends skipped because they are not running yet
    pub skipped: Vec<String>,
}

/// Timeout for the loopback TCP probe used with host-managed proxies
const TCP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub fn validate(
    runner: &dyn CommandRunner,
    network: &NetworkSpec,
    proxy: &ReverseProxyTarget,
    backend: &BackendSpec,
) -> DeployResult<ConnectivityReport> {
    let docker = Docker::new(runner);
    let mut report = ConnectivityReport::default();

    for container in backend.container_names() {
        let info = match docker.inspect_container(container)? {
            Some(info) if info.running => info,
            _ => {
                report.skipped.push(container.to_string());
                continue;
            }
        };

        if !info.is_on_network(&network.name) {
            return Err(DeployError::NotOnNetwork {
                container: container.to_string(),
                network: network.name.clone(),
            });
        }

        match &proxy.hosting {
            ProxyHosting::Docker { container: proxy_container }
            | ProxyHosting::SelfProvisioned { container: proxy_container } => {
                probe_from_container(&docker, &network.name, proxy_container, container)?;
            }
            ProxyHosting::Systemd | ProxyHosting::Standalone => {
                // Host nginx reaches backends over published ports
                let upstream = if container == crate::backend::DB_CONTAINER {
                    &backend.db_upstream
                } else {
                    &backend.relay_upstream
                };
                probe_loopback(container, &upstream.host, upstream.port)?;
            }
        }
        report.checked.push(container.to_string());
    }

    Ok(report)
}

/// Membership check on the proxy side, then an in-network ping
fn probe_from_container(
    docker: &Docker,
    network: &str,
    proxy_container: &str,
    backend_container: &str,
) -> DeployResult<()> {
    let proxy_info = docker
        .inspect_container(proxy_container)?
        .ok_or_else(|| DeployError::Docker {
            message: format!("proxy container '{}' not found", proxy_container),
        })?;
    if !proxy_info.is_on_network(network) {
        return Err(DeployError::NotOnNetwork {
            container: proxy_container.to_string(),
            network: network.to_string(),
        });
    }

    let output = docker.exec(
        proxy_container,
        &["ping", "-c", "1", "-W", "2", backend_container],
    )?;
    if output.success() {
        Ok(())
    } else {
        Err(DeployError::ReachabilityFailed {
            from: proxy_container.to_string(),
            to: backend_container.to_string(),
            detail: output.diagnostic().trim().to_string(),
        })
    }
}

fn probe_loopback(backend_container: &str, host: &str, port: u16) -> DeployResult<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| DeployError::ReachabilityFailed {
            from: "host".to_string(),
            to: backend_container.to_string(),
            detail: format!("bad upstream address: {}", e),
        })?;
    TcpStream::connect_timeout(&addr, TCP_PROBE_TIMEOUT).map_err(|e| {
        DeployError::ReachabilityFailed {
            from: "host".to_string(),
            to: backend_container.to_string(),
            detail: e.to_string(),
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::proxy::DeliveryStrategy;
    use crate::runner::MockRunner;
    use crate::topology::NetworkMode;
    use std::path::PathBuf;

    fn network() -> NetworkSpec {
        NetworkSpec {
            name: "notes-net".to_string(),
            mode: NetworkMode::Isolated,
            subnet: Some("172.24.0.0/16".to_string()),
            gateway: Some("172.24.0.1".to_string()),
            external: false,
        }
    }

    fn docker_proxy() -> ReverseProxyTarget {
        ReverseProxyTarget {
            hosting: ProxyHosting::Docker {
                container: "proxy1".to_string(),
            },
            config_destination: PathBuf::from("/srv/proxy/conf.d/notes.conf"),
            delivery: DeliveryStrategy::VolumeMounted,
        }
    }

    fn backend(kind: &str) -> BackendSpec {
        let mut config = Config::default();
        config.domain = "notes.example.com".to_string();
        config.backend.kind = kind.to_string();
        BackendSpec::from_config(&config, true).unwrap()
    }

    fn inspect_json(running: bool, networks: &str) -> String {
        format!(
            r#"[{{"Name": "/c", "State": {{"Running": {}, "Restarting": false}},
                "Mounts": [], "NetworkSettings": {{"Networks": {{{}}}}}}}]"#,
            running, networks
        )
    }

    #[test]
    fn not_started_backends_are_skipped() {
        let mock = MockRunner::new();
        mock.on_fail("docker inspect notes-couchdb", "No such object");
        let report = validate(&mock, &network(), &docker_proxy(), &backend("document_database"))
            .unwrap();
        assert!(report.checked.is_empty());
        assert_eq!(report.skipped, vec!["notes-couchdb"]);
        // No probe is attempted for a backend that is not running
        assert_eq!(mock.call_count("docker exec"), 0);
    }

    #[test]
    fn running_backend_is_probed_from_proxy() {
        let mock = MockRunner::new();
        mock.on(
            "docker inspect notes-couchdb",
            &inspect_json(true, r#""notes-net": {}"#),
        );
        mock.on(
            "docker inspect proxy1",
            &inspect_json(true, r#""notes-net": {}"#),
        );
        mock.on("docker exec proxy1 ping", "1 packets transmitted, 1 received");
        let report = validate(&mock, &network(), &docker_proxy(), &backend("document_database"))
            .unwrap();
        assert_eq!(report.checked, vec!["notes-couchdb"]);
        assert_eq!(mock.call_count("docker exec proxy1 ping"), 1);
    }

    #[test]
    fn backend_off_network_is_fatal() {
        let mock = MockRunner::new();
        mock.on(
            "docker inspect notes-couchdb",
            &inspect_json(true, r#""bridge": {}"#),
        );
        let err = validate(&mock, &network(), &docker_proxy(), &backend("document_database"))
            .unwrap_err();
        assert!(matches!(err, DeployError::NotOnNetwork { .. }));
    }

    #[test]
    fn proxy_off_network_is_fatal() {
        let mock = MockRunner::new();
        mock.on(
            "docker inspect notes-couchdb",
            &inspect_json(true, r#""notes-net": {}"#),
        );
        mock.on("docker inspect proxy1", &inspect_json(true, r#""appnet": {}"#));
        let err = validate(&mock, &network(), &docker_proxy(), &backend("document_database"))
            .unwrap_err();
        match err {
            DeployError::NotOnNetwork { container, .. } => assert_eq!(container, "proxy1"),
            other => panic!("expected NotOnNetwork, got {:?}", other),
        }
    }

    #[test]
    fn failed_ping_is_fatal_with_detail() {
        let mock = MockRunner::new();
        mock.on(
            "docker inspect notes-couchdb",
            &inspect_json(true, r#""notes-net": {}"#),
        );
        mock.on(
            "docker inspect proxy1",
            &inspect_json(true, r#""notes-net": {}"#),
        );
        mock.on_fail("docker exec proxy1 ping", "100% packet loss");
        let err = validate(&mock, &network(), &docker_proxy(), &backend("document_database"))
            .unwrap_err();
        match err {
            DeployError::ReachabilityFailed { detail, .. } => {
                assert!(detail.contains("packet loss"));
            }
            other => panic!("expected ReachabilityFailed, got {:?}", other),
        }
    }

    #[test]
    fn both_kind_checks_each_running_backend() {
        let mock = MockRunner::new();
        mock.on(
            "docker inspect notes-couchdb",
            &inspect_json(true, r#""notes-net": {}"#),
        );
        mock.on(
            "docker inspect notes-relay",
            &inspect_json(false, r#""notes-net": {}"#),
        );
        mock.on(
            "docker inspect proxy1",
            &inspect_json(true, r#""notes-net": {}"#),
        );
        mock.on("docker exec proxy1 ping", "ok");
        let report = validate(&mock, &network(), &docker_proxy(), &backend("both")).unwrap();
        assert_eq!(report.checked, vec!["notes-couchdb"]);
        assert_eq!(report.skipped, vec!["notes-relay"]);
    }
}
