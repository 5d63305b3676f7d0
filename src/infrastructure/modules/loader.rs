//! Module loader - discovers packages and orders them by dependency

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::context::{HostContext, LoadingContext};
use super::manifest::{is_manifest, ModulePackage};
use crate::application::errors::ModuleError;
use crate::domain::traits::Module;

/// Result of scanning the modules directory
#[derive(Debug, Default)]
pub struct Discovery {
    pub packages: Vec<ModulePackage>,
    /// One entry per manifest that could not be read or parsed
    pub errors: Vec<ModuleError>,
}

/// Packages in an order where every required dependency comes first
#[derive(Debug, Default)]
pub struct LoadPlan {
    pub ordered: Vec<ModulePackage>,
    /// Packages dropped from the plan: cycles and duplicate names
    pub rejected: Vec<ModuleError>,
}

impl LoadPlan {
    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|p| p.name()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.ordered.iter().position(|p| p.name() == name)
    }
}

const UNVISITED: usize = usize::MAX;

/// Modules on a cycle of the given graph, found with an iterative Tarjan
/// strongly-connected-components pass. Edges point from a module to what it
/// depends on.
fn cyclic_nodes(graph: &[Vec<usize>]) -> Vec<bool> {
    let n = graph.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut cyclic = vec![false; n];
    let mut next = 0;

    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }
        index[start] = next;
        low[start] = next;
        next += 1;
        stack.push(start);
        on_stack[start] = true;
        // (node, next edge to follow)
        let mut calls: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = calls.last_mut() {
            let v = frame.0;
            if let Some(&w) = graph[v].get(frame.1) {
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next;
                    low[w] = next;
                    next += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    calls.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] != index[v] {
                continue;
            }

            let mut component = Vec::new();
            while let Some(w) = stack.pop() {
                on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            if component.len() > 1 || graph[v].contains(&v) {
                for w in component {
                    cyclic[w] = true;
                }
            }
        }
    }

    cyclic
}

/// Whether `to` can be reached from `from` along the graph's edges
fn reaches(graph: &[Vec<usize>], from: usize, to: usize) -> bool {
    let mut seen = vec![false; graph.len()];
    let mut pending = vec![from];
    while let Some(v) = pending.pop() {
        if v == to {
            return true;
        }
        if std::mem::replace(&mut seen[v], true) {
            continue;
        }
        pending.extend(graph[v].iter().copied().filter(|w| !seen[*w]));
    }
    false
}

/// Dependencies-first order of an acyclic graph, iterative post-order DFS
fn post_order(graph: &[Vec<usize>], skip: &[bool]) -> Vec<usize> {
    let mut visited = skip.to_vec();
    let mut order = Vec::with_capacity(graph.len());

    for start in 0..graph.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let v = frame.0;
            match graph[v].get(frame.1) {
                Some(&w) => {
                    frame.1 += 1;
                    if !visited[w] {
                        visited[w] = true;
                        stack.push((w, 0));
                    }
                }
                None => {
                    order.push(v);
                    stack.pop();
                }
            }
        }
    }

    order
}

/// Module loader
pub struct ModuleLoader {
    directory: PathBuf,
    host: Arc<HostContext>,
}

impl ModuleLoader {
    pub fn new(directory: impl Into<PathBuf>, host: Arc<HostContext>) -> Self {
        Self {
            directory: directory.into(),
            host,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn host(&self) -> &Arc<HostContext> {
        &self.host
    }

    /// Read every manifest in the directory without running any module code
    pub fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();

        if !self.directory.exists() {
            tracing::warn!("Module directory does not exist: {}", self.directory.display());
            return discovery;
        }

        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                discovery.errors.push(ModuleError::Io(e));
                return discovery;
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => paths.push(entry.path()),
                Err(e) => tracing::warn!("Failed to read directory entry: {}", e),
            }
        }
        paths.sort();

        for path in paths {
            // Skip hidden files
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.'))
            {
                continue;
            }
            if !is_manifest(&path) {
                continue;
            }

            match ModulePackage::from_file(&path) {
                Ok(package) => {
                    tracing::debug!("Discovered module {} at {}", package.descriptor.full_name(), path.display());
                    discovery.packages.push(package);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    discovery.errors.push(e);
                }
            }
        }

        discovery
    }

    /// Find one package by module name
    pub fn find(&self, name: &str) -> Result<ModulePackage, ModuleError> {
        self.discover()
            .packages
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))
    }

    /// Order packages so required dependencies load first.
    ///
    /// Cycles are searched on the required edges alone; every module on one
    /// is rejected. Soft dependencies that are present then refine the order,
    /// except where following one would close a cycle, in which case it is
    /// dropped. Required dependencies that are absent (or rejected) do not
    /// block planning; enabling the module fails later.
    pub fn plan(packages: Vec<ModulePackage>) -> LoadPlan {
        let mut plan = LoadPlan::default();

        let mut by_name: BTreeMap<String, ModulePackage> = BTreeMap::new();
        for package in packages {
            if by_name.contains_key(package.name()) {
                tracing::warn!("Duplicate module name '{}' at {}", package.name(), package.manifest_path.display());
                plan.rejected.push(ModuleError::DuplicateName(package.name().to_string()));
                continue;
            }
            by_name.insert(package.name().to_string(), package);
        }

        let names: Vec<String> = by_name.keys().cloned().collect();
        let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        let resolve = |deps: &[String]| -> Vec<usize> { deps.iter().filter_map(|d| index.get(d.as_str()).copied()).collect() };

        let required: Vec<Vec<usize>> = by_name.values().map(|p| resolve(&p.descriptor.depend)).collect();
        let soft: Vec<Vec<usize>> = by_name.values().map(|p| resolve(&p.descriptor.softdepend)).collect();

        let cyclic = cyclic_nodes(&required);
        for (name, _) in names.iter().zip(&cyclic).filter(|(_, c)| **c) {
            tracing::error!("Module '{}' is part of a dependency cycle", name);
            plan.rejected.push(ModuleError::CyclicDependency(name.clone()));
        }

        let mut graph: Vec<Vec<usize>> = required
            .iter()
            .map(|deps| deps.iter().copied().filter(|d| !cyclic[*d]).collect())
            .collect();
        for (module, deps) in soft.iter().enumerate() {
            if cyclic[module] {
                continue;
            }
            for &dep in deps {
                if cyclic[dep] || graph[module].contains(&dep) {
                    continue;
                }
                if reaches(&graph, dep, module) {
                    tracing::debug!("Ignoring soft dependency {} -> {}: it would close a cycle", names[module], names[dep]);
                    continue;
                }
                graph[module].push(dep);
            }
        }

        for i in post_order(&graph, &cyclic) {
            if let Some(package) = by_name.remove(&names[i]) {
                plan.ordered.push(package);
            }
        }

        plan
    }

    /// Build the loading context for a package and create its module instance
    pub fn instantiate(&self, package: &ModulePackage) -> Result<(Box<dyn Module>, LoadingContext), ModuleError> {
        let context = match package.library_path() {
            Some(library) => LoadingContext::with_library(package.name(), library, self.host.clone())?,
            None => LoadingContext::host_only(package.name(), self.host.clone()),
        };
        let instance = context.instantiate(&package.descriptor.main)?;
        Ok((instance, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ModuleDescriptor;

    fn package(name: &str, depend: &[&str], softdepend: &[&str]) -> ModulePackage {
        let mut descriptor = ModuleDescriptor::new(name, "1.0", name);
        descriptor.depend = depend.iter().map(|s| s.to_string()).collect();
        descriptor.softdepend = softdepend.iter().map(|s| s.to_string()).collect();
        ModulePackage::builtin(descriptor)
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("modbot-loader-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_dependencies_come_first() {
        let plan = ModuleLoader::plan(vec![
            package("a", &["b"], &[]),
            package("b", &["c"], &[]),
            package("c", &[], &[]),
            package("d", &["a", "c"], &[]),
        ]);

        assert!(plan.rejected.is_empty());
        for (module, dep) in [("a", "b"), ("b", "c"), ("d", "a"), ("d", "c")] {
            assert!(plan.position(dep) < plan.position(module), "{} must load before {}", dep, module);
        }
    }

    #[test]
    fn test_cycle_rejected_by_name() {
        let plan = ModuleLoader::plan(vec![
            package("a", &["b"], &[]),
            package("b", &["a"], &[]),
            package("solo", &[], &[]),
        ]);

        assert_eq!(plan.names(), vec!["solo"]);
        let names: Vec<String> = plan
            .rejected
            .iter()
            .map(|e| match e {
                ModuleError::CyclicDependency(name) => name.clone(),
                other => panic!("unexpected error {}", other),
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let plan = ModuleLoader::plan(vec![package("me", &["me"], &[])]);
        assert!(plan.ordered.is_empty());
        assert!(matches!(&plan.rejected[0], ModuleError::CyclicDependency(name) if name == "me"));
    }

    #[test]
    fn test_dependent_of_cycle_stays_in_plan() {
        let plan = ModuleLoader::plan(vec![
            package("a", &["b"], &[]),
            package("b", &["a"], &[]),
            package("user", &["a"], &[]),
        ]);
        assert_eq!(plan.names(), vec!["user"]);
        assert_eq!(plan.rejected.len(), 2);
    }

    #[test]
    fn test_soft_dependency_orders_but_never_fails() {
        let plan = ModuleLoader::plan(vec![
            package("a", &[], &["z", "missing"]),
            package("z", &[], &[]),
        ]);
        assert!(plan.rejected.is_empty());
        assert!(plan.position("z") < plan.position("a"));
    }

    #[test]
    fn test_soft_cycle_is_ignored() {
        let plan = ModuleLoader::plan(vec![
            package("a", &["b"], &[]),
            package("b", &[], &["a"]),
        ]);
        assert!(plan.rejected.is_empty());
        assert!(plan.position("b") < plan.position("a"));
    }

    fn rejected_names(plan: &LoadPlan) -> Vec<&str> {
        plan.rejected
            .iter()
            .map(|e| match e {
                ModuleError::CyclicDependency(name) => name.as_str(),
                other => panic!("unexpected error {}", other),
            })
            .collect()
    }

    #[test]
    fn test_required_cycle_entered_through_soft_edge() {
        let plan = ModuleLoader::plan(vec![
            package("a", &["d", "b"], &[]),
            package("b", &["c"], &[]),
            package("c", &["a"], &[]),
            package("d", &[], &["c"]),
        ]);

        assert_eq!(rejected_names(&plan), vec!["a", "b", "c"]);
        assert_eq!(plan.names(), vec!["d"]);
    }

    #[test]
    fn test_soft_edge_first_on_path_keeps_required_order() {
        // "a" is visited first and softly wants "b", which requires "a"
        let plan = ModuleLoader::plan(vec![
            package("a", &[], &["b"]),
            package("b", &["a"], &[]),
        ]);

        assert!(plan.rejected.is_empty());
        assert!(plan.position("a") < plan.position("b"));
    }

    #[test]
    fn test_every_member_of_required_cycle_rejected() {
        // "d" only joins the cycle through a node the search already finished
        let plan = ModuleLoader::plan(vec![
            package("a", &["b", "d"], &[]),
            package("b", &["c"], &[]),
            package("c", &["a"], &[]),
            package("d", &["b"], &[]),
            package("free", &[], &["d"]),
        ]);

        assert_eq!(rejected_names(&plan), vec!["a", "b", "c", "d"]);
        assert_eq!(plan.names(), vec!["free"]);
    }

    #[test]
    fn test_mixed_edges_respect_every_required_dependency() {
        let packages = vec![
            package("core", &[], &["ui"]),
            package("db", &["core"], &["cache"]),
            package("cache", &["core"], &["db"]),
            package("ui", &["db", "cache"], &["core"]),
        ];
        let plan = ModuleLoader::plan(packages.clone());

        assert!(plan.rejected.is_empty());
        assert_eq!(plan.ordered.len(), 4);
        for package in &packages {
            for dep in &package.descriptor.depend {
                assert!(plan.position(dep) < plan.position(package.name()), "{} must load before {}", dep, package.name());
            }
        }
    }

    #[test]
    fn test_missing_required_dependency_still_planned() {
        let plan = ModuleLoader::plan(vec![package("lonely", &["absent"], &[])]);
        assert_eq!(plan.names(), vec!["lonely"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let plan = ModuleLoader::plan(vec![package("a", &[], &[]), package("a", &[], &[])]);
        assert_eq!(plan.ordered.len(), 1);
        assert!(matches!(&plan.rejected[0], ModuleError::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let count = 5_000;
        let packages = (0..count)
            .map(|i| {
                let deps: Vec<String> = if i + 1 < count { vec![format!("m{}", i + 1)] } else { vec![] };
                let mut descriptor = ModuleDescriptor::new(format!("m{}", i), "1", "x");
                descriptor.depend = deps;
                ModulePackage::builtin(descriptor)
            })
            .collect();
        let plan = ModuleLoader::plan(packages);
        assert_eq!(plan.ordered.len(), count);
        assert_eq!(plan.ordered[0].name(), format!("m{}", count - 1));
    }

    #[test]
    fn test_discover_skips_malformed_manifests() {
        let dir = temp_dir();
        std::fs::write(dir.join("good.yml"), "name: good\nversion: '1'\nmain: good\n").unwrap();
        std::fs::write(dir.join("bad.yaml"), "name: [oops\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.join(".hidden.yml"), "garbage").unwrap();

        let loader = ModuleLoader::new(&dir, Arc::new(HostContext::new()));
        let discovery = loader.discover();

        assert_eq!(discovery.packages.len(), 1);
        assert_eq!(discovery.packages[0].name(), "good");
        assert_eq!(discovery.errors.len(), 1);
        assert!(matches!(discovery.errors[0], ModuleError::DescriptorParse { .. }));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_discover_missing_directory_is_empty() {
        let loader = ModuleLoader::new("/nonexistent/modbot/modules", Arc::new(HostContext::new()));
        let discovery = loader.discover();
        assert!(discovery.packages.is_empty());
        assert!(discovery.errors.is_empty());
    }
}
