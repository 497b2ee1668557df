//! Dependency resolution for submitted task sets.
//!
//! A task set is turned into a [`DependencyGraph`], validated for missing
//! references and cycles, then peeled into stages with Kahn's algorithm.
//! Every task in a stage depends only on tasks from earlier stages, so the
//! tasks of one stage can run concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use super::task::Task;
use super::types::TaskId;

/// A batch of mutually independent tasks.
pub type Stage = Vec<Arc<Task>>;

/// Errors raised while building or ordering a task graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Two submitted tasks share an id.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// A dependency references a task that was not submitted.
    #[error("dependency not found: task '{task}' depends on non-existent task '{dependency}'")]
    DependencyNotFound { task: TaskId, dependency: TaskId },

    /// The dependency relation contains a cycle.
    #[error("circular dependency detected involving task: {0}")]
    CircularDependency(TaskId),

    /// Sorting did not account for every task.
    #[error("dependency graph inconsistent: ordered {processed} of {total} tasks")]
    GraphSizeMismatch { processed: usize, total: usize },
}

/// Stateless entry point for turning task sets into stages.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve tasks into ordered stages.
    ///
    /// The concatenation of the returned stages is a permutation of the input
    /// and every task's dependencies sit in a strictly earlier stage. Within a
    /// stage, tasks keep their submission order.
    pub fn resolve<I, T>(tasks: I) -> Result<Vec<Stage>, ResolveError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arc<Task>>,
    {
        DependencyGraph::build(tasks)?.stages()
    }

    /// Resolve tasks and flatten the stages into a single execution order.
    pub fn execution_order<I, T>(tasks: I) -> Result<Vec<TaskId>, ResolveError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arc<Task>>,
    {
        DependencyGraph::build(tasks)?.execution_order()
    }
}

/// Adjacency view of a task set.
///
/// Nodes are indexed by submission position; each dependency is one edge.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    tasks: Vec<Arc<Task>>,
    index: HashMap<TaskId, usize>,
    /// node -> nodes it depends on
    dependencies: Vec<Vec<usize>>,
    /// node -> nodes that depend on it
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph, rejecting duplicate ids and unknown dependencies.
    pub fn build<I, T>(tasks: I) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arc<Task>>,
    {
        let tasks: Vec<Arc<Task>> = tasks.into_iter().map(Into::into).collect();

        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), i).is_some() {
                return Err(ResolveError::DuplicateTask(task.id.clone()));
            }
        }

        let mut dependencies = vec![Vec::new(); tasks.len()];
        let mut dependents = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let Some(&j) = index.get(dep) else {
                    return Err(ResolveError::DependencyNotFound {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                dependencies[i].push(j);
                dependents[j].push(i);
            }
        }

        Ok(Self {
            tasks,
            index,
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task by id.
    pub fn task(&self, id: &TaskId) -> Option<&Arc<Task>> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Depth-first cycle detection.
    ///
    /// Uses an explicit stack so deep chains cannot overflow the call stack.
    pub fn validate(&self) -> Result<(), ResolveError> {
        let n = self.tasks.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];

        for root in 0..n {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            on_stack[root] = true;
            // (node, index of the next dependency to explore)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                match self.dependencies[node].get(frame.1).copied() {
                    Some(dep) => {
                        frame.1 += 1;
                        if on_stack[dep] {
                            return Err(ResolveError::CircularDependency(
                                self.tasks[dep].id.clone(),
                            ));
                        }
                        if !visited[dep] {
                            visited[dep] = true;
                            on_stack[dep] = true;
                            stack.push((dep, 0));
                        }
                    }
                    None => {
                        on_stack[node] = false;
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }

    /// Kahn's algorithm, one stage per round of zero in-degree nodes.
    ///
    /// Fails if the rounds do not cover every task, which happens when the
    /// graph still contains a cycle.
    pub fn topological_sort(&self) -> Result<Vec<Stage>, ResolveError> {
        let total = self.tasks.len();
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut frontier: Vec<usize> = (0..total).filter(|&i| in_degree[i] == 0).collect();
        let mut stages = Vec::new();
        let mut processed = 0;

        while !frontier.is_empty() {
            processed += frontier.len();

            let mut next = Vec::new();
            for &node in &frontier {
                for &dependent in &self.dependents[node] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();

            stages.push(frontier.iter().map(|&i| Arc::clone(&self.tasks[i])).collect());
            frontier = next;
        }

        if processed != total {
            return Err(ResolveError::GraphSizeMismatch { processed, total });
        }

        Ok(stages)
    }

    /// Validate, then sort into stages.
    pub fn stages(&self) -> Result<Vec<Stage>, ResolveError> {
        self.validate()?;
        self.topological_sort()
    }

    /// Flattened stage order.
    pub fn execution_order(&self) -> Result<Vec<TaskId>, ResolveError> {
        Ok(self
            .stages()?
            .into_iter()
            .flatten()
            .map(|task| task.id.clone())
            .collect())
    }

    /// Direct dependencies of a task, in declaration order.
    pub fn dependencies(&self, id: &TaskId) -> Option<&[TaskId]> {
        self.task(id).map(|task| task.dependencies.as_slice())
    }

    /// Tasks that directly depend on the given task, in submission order.
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(&i) = self.index.get(id) else {
            return Vec::new();
        };
        let mut nodes = self.dependents[i].clone();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
            .into_iter()
            .map(|j| self.tasks[j].id.clone())
            .collect()
    }

    /// Whether every dependency of `id` is in `completed`.
    ///
    /// Unknown ids can never execute.
    pub fn can_execute(&self, id: &TaskId, completed: &HashSet<TaskId>) -> bool {
        self.dependencies(id)
            .map(|deps| deps.iter().all(|dep| completed.contains(dep)))
            .unwrap_or(false)
    }

    /// Tasks not yet completed whose dependencies all are.
    pub fn ready_tasks(&self, completed: &HashSet<TaskId>) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|task| !completed.contains(&task.id))
            .filter(|task| self.can_execute(&task.id, completed))
            .map(|task| task.id.clone())
            .collect()
    }
}
