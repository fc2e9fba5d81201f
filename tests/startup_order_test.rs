/// Property-based tests for dependency-aware startup ordering
///
/// For any acyclic registry every service must appear exactly once and
/// strictly after all of its dependencies, whatever manual `startOrder`
/// overrides say. Cycles must be reported rather than looped on.
use proptest::prelude::*;
use service_orchestrator::registry::{Registry, ServiceConfig};
use service_orchestrator::Error;
use std::collections::HashMap;

/// A DAG over `n` services: service `i` may only depend on services `< i`,
/// and catalogue order is a permutation so roots do not always come first.
fn dag_strategy() -> impl Strategy<Value = Vec<ServiceConfig>> {
    (1usize..14)
        .prop_flat_map(|n| {
            let deps = proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n);
            let orders = proptest::collection::vec(proptest::option::of(0u32..20), n);
            let perm = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
            (Just(n), deps, orders, perm)
        })
        .prop_map(|(n, deps, orders, perm)| {
            let services: Vec<ServiceConfig> = (0..n)
                .map(|i| {
                    let mut service = ServiceConfig::new(format!("svc-{}", i), 3000 + i as u16);
                    service.run.command = "node".to_string();
                    service.dependencies = (0..i)
                        .filter(|&j| deps[i][j])
                        .map(|j| format!("svc-{}", j))
                        .collect();
                    service.start_order = orders[i];
                    service
                })
                .collect();
            perm.iter().map(|&index| services[index].clone()).collect()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_startup_order_respects_dependencies(services in dag_strategy()) {
        let registry = Registry::new(services.clone());
        prop_assert!(registry.validate().is_ok());

        let order = registry.calculate_startup_order().unwrap();
        prop_assert_eq!(order.len(), services.len());

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.service_id.as_str(), i))
            .collect();
        prop_assert_eq!(position.len(), services.len(), "a service was emitted twice");

        for (i, entry) in order.iter().enumerate() {
            prop_assert_eq!(entry.order, i);
        }
        for service in &services {
            for dep in &service.dependencies {
                prop_assert!(
                    position[dep.as_str()] < position[service.id.as_str()],
                    "{} must start before {}", dep, service.id
                );
            }
            prop_assert!(!registry.has_circular_dependency(&service.id));
        }
    }
}

#[test]
fn test_two_service_cycle_is_reported() {
    let mut a = ServiceConfig::new("a", 3001);
    a.run.command = "node".to_string();
    a.dependencies = vec!["b".to_string()];
    let mut b = ServiceConfig::new("b", 3002);
    b.run.command = "node".to_string();
    b.dependencies = vec!["a".to_string()];
    let registry = Registry::new(vec![a, b]);

    match registry.calculate_startup_order() {
        Err(Error::CircularDependency(id)) => assert!(id == "a" || id == "b"),
        other => panic!("expected a circular dependency error, got {:?}", other),
    }
    assert!(registry.has_circular_dependency("a"));
    assert!(registry.has_circular_dependency("b"));

    let errors = registry.validation_errors();
    assert!(errors.iter().any(|e| e.contains("Circular dependency")));
}

#[test]
fn test_dependent_outside_cycle_sees_it() {
    let mut a = ServiceConfig::new("a", 3001);
    a.dependencies = vec!["b".to_string()];
    let mut b = ServiceConfig::new("b", 3002);
    b.dependencies = vec!["a".to_string()];
    let mut c = ServiceConfig::new("c", 3003);
    c.dependencies = vec!["a".to_string()];
    let d = ServiceConfig::new("d", 3004);
    let registry = Registry::new(vec![a, b, c, d]);

    assert!(registry.has_circular_dependency("c"));
    assert!(!registry.has_circular_dependency("d"));
}

#[test]
fn test_sample_registry_order() {
    let registry = Registry::from_file(std::path::Path::new("registry.yaml")).unwrap();
    registry.validate().unwrap();
    let ids: Vec<String> = registry
        .calculate_startup_order()
        .unwrap()
        .into_iter()
        .map(|entry| entry.service_id)
        .collect();

    let pos = |id: &str| ids.iter().position(|s| s == id).unwrap();
    assert_eq!(ids.len(), 5);
    assert!(pos("postgresql") < pos("auth-service"));
    assert!(pos("auth-service") < pos("api-gateway"));
    assert!(pos("api-gateway") < pos("admin-panel"));
}
