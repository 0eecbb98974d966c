//! NodePort allocation for the public apiserver service
//!
//! The allocator walks every service in the local mirror, collects each
//! non-zero NodePort, and hands out the smallest free port in the
//! configured inclusive range. Two reconciles racing between probe and
//! create can pick the same port; the loser's create fails and the next
//! attempt re-polls a now-warm cache.

use crate::cache::ServiceLister;
use crate::{Error, Result};

/// Smallest free NodePort in `[min, max]` across all cached services.
pub fn free_node_port(services: &dyn ServiceLister, min: i32, max: i32) -> Result<i32> {
    let mut used = std::collections::HashSet::new();
    for service in services.services()? {
        let ports = service.spec.and_then(|s| s.ports).unwrap_or_default();
        for port in ports {
            match port.node_port {
                Some(p) if p != 0 => {
                    used.insert(p);
                }
                _ => {}
            }
        }
    }

    (min..=max)
        .find(|p| !used.contains(p))
        .ok_or(Error::PortsExhausted { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockServiceLister;
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};

    fn service_with_ports(node_ports: &[i32]) -> Service {
        Service {
            spec: Some(ServiceSpec {
                ports: Some(
                    node_ports
                        .iter()
                        .map(|p| ServicePort {
                            node_port: Some(*p),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn lister_with(services: Vec<Service>) -> MockServiceLister {
        let mut lister = MockServiceLister::new();
        lister
            .expect_services()
            .returning(move || Ok(services.clone()));
        lister
    }

    #[test]
    fn empty_cache_yields_the_range_minimum() {
        let lister = lister_with(vec![]);
        assert_eq!(free_node_port(&lister, 30000, 30010).unwrap(), 30000);
    }

    #[test]
    fn occupied_ports_are_skipped() {
        let lister = lister_with(vec![
            service_with_ports(&[30000]),
            service_with_ports(&[30001, 30003]),
        ]);
        assert_eq!(free_node_port(&lister, 30000, 30010).unwrap(), 30002);
    }

    #[test]
    fn zero_node_ports_do_not_count() {
        // ClusterIP services report NodePort 0; they must not block the range.
        let lister = lister_with(vec![service_with_ports(&[0, 30001])]);
        assert_eq!(free_node_port(&lister, 30000, 30010).unwrap(), 30000);
    }

    #[test]
    fn exhausted_range_is_an_error() {
        let lister = lister_with(vec![service_with_ports(&[30000, 30001, 30002])]);
        let err = free_node_port(&lister, 30000, 30002).unwrap_err();
        assert!(matches!(
            err,
            Error::PortsExhausted { min: 30000, max: 30002 }
        ));
    }

    #[test]
    fn ports_outside_the_range_are_irrelevant() {
        let lister = lister_with(vec![service_with_ports(&[29999, 31000])]);
        assert_eq!(free_node_port(&lister, 30000, 30010).unwrap(), 30000);
    }
}
