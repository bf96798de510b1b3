//! Module dependency resolution
//!
//! Computes the load order for registered modules with Kahn's algorithm.
//! Ready modules are taken lowest priority first, then lowest ID.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use tracing::debug;

use crate::module::traits::{ModuleError, ModuleMetadata};

/// Dependency resolution result
#[derive(Debug, Clone)]
pub struct DependencyResolution {
    /// Modules in load order (dependencies first)
    pub load_order: Vec<String>,
    /// Reverse edges: module -> modules that depend on it
    pub dependents: HashMap<String, Vec<String>>,
}

/// Dependency resolver
pub struct ModuleDependencies;

impl ModuleDependencies {
    /// Resolve module dependencies and determine load order
    ///
    /// Pure function over metadata: never touches module instances.
    pub fn resolve<'a, I>(modules: I) -> Result<DependencyResolution, ModuleError>
    where
        I: IntoIterator<Item = &'a ModuleMetadata>,
    {
        let mut by_id: HashMap<&str, &ModuleMetadata> = HashMap::new();
        for meta in modules {
            by_id.insert(meta.id.as_str(), meta);
        }

        // Sorted so that the reported missing dependency is deterministic
        let mut ids: Vec<&str> = by_id.keys().copied().collect();
        ids.sort_unstable();

        let mut in_degree: HashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for id in &ids {
            let meta = by_id[id];
            let deps: BTreeSet<&str> = meta.dependencies.iter().map(String::as_str).collect();
            for dep in deps {
                if !by_id.contains_key(dep) {
                    return Err(ModuleError::DependencyMissing {
                        module: meta.id.clone(),
                        dependency: dep.to_string(),
                    });
                }
                dependents
                    .entry(dep.to_string())
                    .or_default()
                    .push(meta.id.clone());
                if let Some(degree) = in_degree.get_mut(id) {
                    *degree += 1;
                }
            }
        }

        let load_order = Self::topological_sort(&by_id, &dependents, in_degree)?;

        debug!("Dependency resolution complete: {:?}", load_order);

        Ok(DependencyResolution {
            load_order,
            dependents,
        })
    }

    /// Kahn's algorithm with a (priority, id) min-heap as the ready frontier
    fn topological_sort(
        by_id: &HashMap<&str, &ModuleMetadata>,
        dependents: &HashMap<String, Vec<String>>,
        mut in_degree: HashMap<&str, usize>,
    ) -> Result<Vec<String>, ModuleError> {
        let mut ready: BinaryHeap<Reverse<(i32, String)>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| Reverse((by_id[id].priority, id.to_string())))
            .collect();

        let mut order = Vec::with_capacity(by_id.len());

        while let Some(Reverse((_, id))) = ready.pop() {
            if let Some(children) = dependents.get(&id) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(Reverse((by_id[child.as_str()].priority, child.clone())));
                        }
                    }
                }
            }
            order.push(id);
        }

        if order.len() < by_id.len() {
            let mut stuck: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            stuck.sort();
            return Err(ModuleError::CircularDependency(stuck));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, priority: i32, deps: &[&str]) -> ModuleMetadata {
        deps.iter().fold(
            ModuleMetadata::new(id, id, "1.0.0").with_priority(priority),
            |m, d| m.with_dependency(*d),
        )
    }

    #[test]
    fn test_chain_orders_dependencies_first() {
        let modules = vec![meta("c", 0, &["b"]), meta("a", 0, &[]), meta("b", 0, &["a"])];
        let resolution = ModuleDependencies::resolve(&modules).unwrap();
        assert_eq!(resolution.load_order, vec!["a", "b", "c"]);
        assert_eq!(resolution.dependents["a"], vec!["b".to_string()]);
    }

    #[test]
    fn test_priority_then_id_breaks_ties() {
        let modules = vec![
            meta("zeta", -1, &[]),
            meta("beta", 5, &[]),
            meta("alpha", 5, &[]),
            meta("gamma", 0, &["zeta"]),
        ];
        let resolution = ModuleDependencies::resolve(&modules).unwrap();
        assert_eq!(resolution.load_order, vec!["zeta", "gamma", "alpha", "beta"]);
    }

    #[test]
    fn test_duplicate_dependency_counted_once() {
        let modules = vec![meta("a", 0, &[]), meta("b", 0, &["a", "a"])];
        let resolution = ModuleDependencies::resolve(&modules).unwrap();
        assert_eq!(resolution.load_order, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_dependency_named() {
        let modules = vec![meta("deploy", 0, &["docker"])];
        match ModuleDependencies::resolve(&modules) {
            Err(ModuleError::DependencyMissing { module, dependency }) => {
                assert_eq!(module, "deploy");
                assert_eq!(dependency, "docker");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_transitive_cycle_reported_in_aggregate() {
        let modules = vec![
            meta("root", 0, &[]),
            meta("a", 0, &["c"]),
            meta("b", 0, &["a"]),
            meta("c", 0, &["b"]),
        ];
        match ModuleDependencies::resolve(&modules) {
            Err(ModuleError::CircularDependency(ids)) => assert_eq!(ids, vec!["a", "b", "c"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_input() {
        let resolution = ModuleDependencies::resolve(std::iter::empty::<&ModuleMetadata>()).unwrap();
        assert!(resolution.load_order.is_empty());
    }
}
