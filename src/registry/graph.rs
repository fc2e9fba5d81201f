use super::types::{ServiceConfig, StartupOrder};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Dependency graph view over a service catalogue.
///
/// Edges point from a service to the services it depends on. Dependency ids
/// that do not resolve to a catalogue entry are ignored here; registry
/// validation reports them.
#[derive(Debug)]
pub struct Graph<'a> {
    services: &'a [ServiceConfig],
    index: HashMap<&'a str, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl<'a> Graph<'a> {
    pub fn new(services: &'a [ServiceConfig]) -> Self {
        let index = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        Self { services, index }
    }

    /// Sort key: manual `startOrder` if present, else catalogue position.
    fn priority(&self, idx: usize) -> (usize, usize) {
        let service = &self.services[idx];
        let primary = service.start_order.map(|o| o as usize).unwrap_or(idx);
        (primary, idx)
    }

    /// Resolved dependency indices of `idx`, in priority order.
    fn dependencies_of(&self, idx: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self.services[idx]
            .dependencies
            .iter()
            .filter_map(|dep| self.index.get(dep.as_str()).copied())
            .collect();
        deps.sort_by_key(|&d| self.priority(d));
        deps.dedup();
        deps
    }

    /// Depth-first topological sort; dependencies are emitted before dependents.
    ///
    /// Fails with [`Error::CircularDependency`] naming the first node found
    /// again on the active DFS path.
    pub fn startup_order(&self) -> Result<Vec<StartupOrder>> {
        let mut roots: Vec<usize> = (0..self.services.len()).collect();
        roots.sort_by_key(|&i| self.priority(i));

        let mut marks: HashMap<usize, Mark> = HashMap::new();
        let mut emitted = Vec::with_capacity(self.services.len());

        for root in roots {
            self.visit(root, &mut marks, &mut emitted)?;
        }

        Ok(emitted
            .into_iter()
            .enumerate()
            .map(|(order, idx)| {
                let service = &self.services[idx];
                StartupOrder {
                    service_id: service.id.clone(),
                    order,
                    dependencies: service.dependencies.clone(),
                }
            })
            .collect())
    }

    fn visit(
        &self,
        idx: usize,
        marks: &mut HashMap<usize, Mark>,
        emitted: &mut Vec<usize>,
    ) -> Result<()> {
        match marks.get(&idx) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(Error::CircularDependency(self.services[idx].id.clone()));
            }
            None => {}
        }

        marks.insert(idx, Mark::Visiting);
        for dep in self.dependencies_of(idx) {
            self.visit(dep, marks, emitted)?;
        }
        marks.insert(idx, Mark::Done);
        emitted.push(idx);
        Ok(())
    }

    /// Whether a cycle is reachable from `service_id`.
    pub fn has_cycle_from(&self, service_id: &str) -> bool {
        let Some(&root) = self.index.get(service_id) else {
            return false;
        };
        let mut marks = HashMap::new();
        let mut emitted = Vec::new();
        self.visit(root, &mut marks, &mut emitted).is_err()
    }

    /// Find a cycle anywhere in the graph and return it as a path, first node repeated last.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut path = Vec::new();

        for idx in 0..self.services.len() {
            if !visited.contains(&idx) {
                if let Some(cycle) = self.find_cycle_dfs(idx, &mut visited, &mut on_path, &mut path)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn find_cycle_dfs(
        &self,
        idx: usize,
        visited: &mut HashSet<usize>,
        on_path: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        visited.insert(idx);
        on_path.insert(idx);
        path.push(idx);

        for dep in self.dependencies_of(idx) {
            if !visited.contains(&dep) {
                if let Some(cycle) = self.find_cycle_dfs(dep, visited, on_path, path) {
                    return Some(cycle);
                }
            } else if on_path.contains(&dep) {
                let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&n| self.services[n].id.clone())
                    .collect();
                cycle.push(self.services[dep].id.clone());
                return Some(cycle);
            }
        }

        on_path.remove(&idx);
        path.pop();
        None
    }

    /// Transitive dependencies of `service_id` followed by the service itself.
    ///
    /// Cycle-safe: each node is visited once.
    pub fn dependency_chain(&self, service_id: &str) -> Vec<String> {
        let Some(&root) = self.index.get(service_id) else {
            return Vec::new();
        };
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        self.chain_dfs(root, &mut visited, &mut chain);
        chain
    }

    fn chain_dfs(&self, idx: usize, visited: &mut HashSet<usize>, chain: &mut Vec<String>) {
        if !visited.insert(idx) {
            return;
        }
        for dep in self.dependencies_of(idx) {
            self.chain_dfs(dep, visited, chain);
        }
        chain.push(self.services[idx].id.clone());
    }
}
