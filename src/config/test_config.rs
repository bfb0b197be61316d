use super::{Api, Backend, Config, ConfigBox, Logs, Orchestrator, Probe, Service, K8S};
use std::time::Duration;

/// Creates a new test configuration.
///
/// Two services: `whoami` catches everything, `api` is routed by host.
/// Backend hosts point nowhere and are rewritten by the test harness.
pub fn new_test_config() -> Config {
    Config {
        gate: ConfigBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            api: Some(Api {
                name: Some("scalegate:0".to_string()),
                port: Some("0".to_string()),
            }),
            orchestrator: Some(Orchestrator {
                endpoint: None,
                timeout: Some(Duration::from_secs(1)),
                poll_interval: Some(Duration::from_millis(20)),
            }),
            k8s: Some(K8S {
                probe: Probe {
                    timeout: Some(Duration::from_secs(1)),
                },
            }),
            services: vec![
                Service {
                    service_name: "whoami".to_string(),
                    keep_alive: Some(Duration::from_secs(60)),
                    scale_timeout: Some(Duration::from_secs(2)),
                    orchestrator_endpoint: None,
                    hosts: vec![],
                    path_prefix: None,
                    backend: Some(Backend {
                        scheme: Some("http".to_string()),
                        host: Some("127.0.0.1:1".to_string()),
                        timeout: Some(Duration::from_secs(5)),
                    }),
                },
                Service {
                    service_name: "api".to_string(),
                    keep_alive: Some(Duration::from_secs(120)),
                    scale_timeout: Some(Duration::from_millis(300)),
                    orchestrator_endpoint: None,
                    hosts: vec!["api.example.org".to_string()],
                    path_prefix: None,
                    backend: Some(Backend {
                        scheme: Some("http".to_string()),
                        host: Some("127.0.0.1:1".to_string()),
                        timeout: Some(Duration::from_secs(5)),
                    }),
                },
            ],
        },
    }
}
