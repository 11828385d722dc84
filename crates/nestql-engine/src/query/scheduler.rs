//! Dependency scheduling.
//!
//! Every action depends on its parent action. The scheduler layers the
//! dependency graph so that an action runs one phase after the deepest action
//! it depends on, and groups the actions of a phase by parent.
//!
//! ```text
//! phase 0: [create_authors]
//! phase 1: [create_authors.books, create_authors.awards]
//! phase 2: [create_authors.books.reviews]
//! ```

use std::collections::{BTreeMap, VecDeque};

use nestql_common::types::Path;
use nestql_common::utils::error::{Error, Result};

use super::action::{ActionId, ActionPlan};

/// Edges between the actions of one plan.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// `dependencies[a]` lists the actions `a` waits for.
    dependencies: Vec<Vec<ActionId>>,
}

impl DependencyGraph {
    /// Builds the parent-before-child graph of a plan.
    ///
    /// # Errors
    ///
    /// Returns `SCHEDULING_INVARIANT` if an action names a parent that is not
    /// in the plan.
    pub fn from_plan(plan: &ActionPlan) -> Result<Self> {
        let mut graph = Self {
            dependencies: vec![Vec::new(); plan.len()],
        };
        for action in plan.iter() {
            let Some(parent) = &action.parent else {
                continue;
            };
            let dependency = plan.id_of(parent).ok_or_else(|| {
                Error::SchedulingInvariant(format!(
                    "action '{}' depends on missing action '{parent}'",
                    action.path
                ))
            })?;
            graph.add_edge(action.id, dependency)?;
        }
        Ok(graph)
    }

    /// Records that `dependent` must run after `dependency`.
    ///
    /// # Errors
    ///
    /// Returns `SCHEDULING_INVARIANT` for unknown ids or a self-dependency.
    pub fn add_edge(&mut self, dependent: ActionId, dependency: ActionId) -> Result<()> {
        let len = self.dependencies.len();
        if dependent.0 >= len || dependency.0 >= len {
            return Err(Error::SchedulingInvariant(format!(
                "edge {} -> {} references an action outside the plan",
                dependent.0, dependency.0
            )));
        }
        if dependent == dependency {
            return Err(Error::SchedulingInvariant(format!(
                "action {} depends on itself",
                dependent.0
            )));
        }
        let edges = &mut self.dependencies[dependent.0];
        if !edges.contains(&dependency) {
            edges.push(dependency);
        }
        Ok(())
    }

    /// Actions `id` waits for.
    #[must_use]
    pub fn dependencies_of(&self, id: ActionId) -> &[ActionId] {
        self.dependencies.get(id.0).map_or(&[], Vec::as_slice)
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns `true` if the graph has no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Layers the graph into phases.
    ///
    /// # Errors
    ///
    /// Returns `SCHEDULING_INVARIANT` if the graph has a cycle or does not
    /// match the plan.
    pub fn schedule(&self, plan: &ActionPlan) -> Result<Schedule> {
        let n = self.dependencies.len();
        if n != plan.len() {
            return Err(Error::SchedulingInvariant(format!(
                "graph has {n} actions, plan has {}",
                plan.len()
            )));
        }

        let mut pending: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (dependent, edges) in self.dependencies.iter().enumerate() {
            for dependency in edges {
                dependents[dependency.0].push(dependent);
            }
        }

        let mut phase_of = vec![0usize; n];
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut visited = 0;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            for &dependent in &dependents[current] {
                phase_of[dependent] = phase_of[dependent].max(phase_of[current] + 1);
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if visited != n {
            let stuck: Vec<String> = (0..n)
                .filter(|&i| pending[i] > 0)
                .filter_map(|i| plan.get(ActionId(i)))
                .map(|action| action.path.to_string())
                .collect();
            return Err(Error::SchedulingInvariant(format!(
                "dependency cycle between {}",
                stuck.join(", ")
            )));
        }

        let phase_count = phase_of.iter().max().map_or(0, |max| max + 1);
        let mut layers: Vec<BTreeMap<Option<Path>, Vec<ActionId>>> =
            vec![BTreeMap::new(); phase_count];
        for action in plan.iter() {
            layers[phase_of[action.id.0]]
                .entry(action.parent.clone())
                .or_default()
                .push(action.id);
        }

        let phases = layers
            .into_iter()
            .map(|groups| Phase {
                groups: groups
                    .into_iter()
                    .map(|(parent, mut actions)| {
                        actions.sort_by(|a, b| {
                            let path = |id: &ActionId| plan.get(*id).map(|action| &action.path);
                            path(a).cmp(&path(b))
                        });
                        Group { parent, actions }
                    })
                    .collect(),
            })
            .collect();

        let schedule = Schedule {
            phases,
            phase_of: phase_of.clone(),
        };
        schedule.verify(self)?;
        Ok(schedule)
    }
}

/// Builds the parent-before-child schedule of a plan.
///
/// # Errors
///
/// Returns `SCHEDULING_INVARIANT` if the plan is inconsistent.
pub fn schedule(plan: &ActionPlan) -> Result<Schedule> {
    DependencyGraph::from_plan(plan)?.schedule(plan)
}

/// Actions sharing a parent within one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Shared parent path, `None` for top-level actions.
    pub parent: Option<Path>,
    /// Members, ordered by path.
    pub actions: Vec<ActionId>,
}

/// Actions that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    /// Groups ordered by parent path.
    pub groups: Vec<Group>,
}

impl Phase {
    /// Every action of the phase, group by group.
    pub fn actions(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.groups.iter().flat_map(|group| group.actions.iter().copied())
    }
}

/// Ordered phases of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Phases in execution order.
    pub phases: Vec<Phase>,
    phase_of: Vec<usize>,
}

impl Schedule {
    /// Phase index of an action.
    #[must_use]
    pub fn phase_of(&self, id: ActionId) -> Option<usize> {
        self.phase_of.get(id.0).copied()
    }

    /// Number of phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Returns `true` for an empty plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    fn verify(&self, graph: &DependencyGraph) -> Result<()> {
        for (dependent, edges) in graph.dependencies.iter().enumerate() {
            for dependency in edges {
                if self.phase_of[dependency.0] >= self.phase_of[dependent] {
                    return Err(Error::SchedulingInvariant(format!(
                        "action {dependent} is scheduled no later than its dependency {}",
                        dependency.0
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::action::{Action, ActionArgs, ActionFamily, ActionKind, ParentBinding};
    use nestql_common::ErrorKind;
    use proptest::prelude::*;

    fn action(path: &[&str]) -> Action {
        let path = Path::from_fields(path.iter().copied());
        Action {
            id: ActionId(0),
            parent: path.parent().filter(|parent| !parent.is_root()),
            path,
            model: "m".to_string(),
            family: ActionFamily::new(ActionKind::Find, true),
            selection: Vec::new(),
            args: ActionArgs::default(),
            binding: ParentBinding::Root,
            internal: false,
            ordinal: 0,
        }
    }

    fn plan(paths: &[&[&str]]) -> ActionPlan {
        let mut plan = ActionPlan::new();
        for path in paths {
            plan.push(action(path)).unwrap();
        }
        plan
    }

    fn phase_paths(schedule: &Schedule, plan: &ActionPlan) -> Vec<Vec<String>> {
        schedule
            .phases
            .iter()
            .map(|phase| {
                phase
                    .actions()
                    .map(|id| plan.get(id).unwrap().path.to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_one_phase_per_depth() {
        let plan = plan(&[
            &["a"],
            &["a", "x"],
            &["a", "x", "deep"],
            &["b"],
            &["a", "w"],
        ]);
        let schedule = schedule(&plan).unwrap();
        assert_eq!(
            phase_paths(&schedule, &plan),
            vec![vec!["a", "b"], vec!["a.w", "a.x"], vec!["a.x.deep"]]
        );
        assert_eq!(schedule.phase_of(ActionId(2)), Some(2));
    }

    #[test]
    fn test_groups_by_parent() {
        let plan = plan(&[&["a"], &["b"], &["b", "y"], &["a", "z"], &["a", "x"]]);
        let schedule = schedule(&plan).unwrap();
        let groups = &schedule.phases[1].groups;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].parent, Some(Path::from_fields(["a"])));
        assert_eq!(groups[0].actions, vec![ActionId(4), ActionId(3)]);
        assert_eq!(groups[1].parent, Some(Path::from_fields(["b"])));
        assert_eq!(schedule.phases[0].groups[0].parent, None);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let plan = plan(&[&["a"], &["a", "b"]]);
        let mut graph = DependencyGraph::from_plan(&plan).unwrap();
        graph.add_edge(ActionId(0), ActionId(1)).unwrap();
        let err = graph.schedule(&plan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchedulingInvariant);
    }

    #[test]
    fn test_invalid_edges() {
        let plan = plan(&[&["a"]]);
        let mut graph = DependencyGraph::from_plan(&plan).unwrap();
        assert!(graph.add_edge(ActionId(0), ActionId(0)).is_err());
        assert!(graph.add_edge(ActionId(0), ActionId(3)).is_err());
    }

    #[test]
    fn test_missing_parent_is_rejected() {
        let plan = plan(&[&["a", "b"]]);
        let err = DependencyGraph::from_plan(&plan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchedulingInvariant);
    }

    #[test]
    fn test_empty_plan() {
        let schedule = schedule(&ActionPlan::new()).unwrap();
        assert!(schedule.is_empty());
    }

    proptest! {
        #[test]
        fn prop_children_run_after_parents(shape in prop::collection::vec(0usize..4, 1..12)) {
            // Each entry picks how many children the previous top-level
            // action gets; every child gets one grandchild.
            let mut paths: Vec<Vec<String>> = Vec::new();
            for (i, children) in shape.iter().enumerate() {
                let root = format!("r{i}");
                paths.push(vec![root.clone()]);
                for c in 0..*children {
                    let child = format!("c{c}");
                    paths.push(vec![root.clone(), child.clone()]);
                    paths.push(vec![root.clone(), child, "g".to_string()]);
                }
            }
            let mut plan = ActionPlan::new();
            for path in &paths {
                let refs: Vec<&str> = path.iter().map(String::as_str).collect();
                plan.push(action(&refs)).unwrap();
            }

            let schedule = schedule(&plan).unwrap();
            for action in plan.iter() {
                let phase = schedule.phase_of(action.id).unwrap();
                prop_assert_eq!(phase, action.path.depth() - 1);
                if let Some(parent) = &action.parent {
                    let parent_id = plan.id_of(parent).unwrap();
                    prop_assert!(schedule.phase_of(parent_id).unwrap() < phase);
                }
            }
            let scheduled: usize = schedule.phases.iter().map(|p| p.actions().count()).sum();
            prop_assert_eq!(scheduled, plan.len());
        }
    }
}
