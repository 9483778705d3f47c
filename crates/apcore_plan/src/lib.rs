//! Dependency-ordered installation planning.
//!
//! [`plan`] is a pure function: given a catalog and the current state store it
//! produces an [`InstallPlan`] without performing any I/O or mutating either
//! input. Cycle and missing-dependency detection use an explicit-stack,
//! three-color depth-first search so pathological catalogs cannot blow the
//! call stack.

use std::collections::{HashMap, HashSet};

use apcore_catalog::Catalog;
use apcore_state::StateStore;

/// What the plan recommends doing with one `app_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    /// Fetch, verify, and run this package's installer.
    Install,
    /// Already installed at the catalog version; nothing to do.
    Skip,
    /// Cannot be installed: a cycle, a missing dependency, or a blocked
    /// dependency stands in the way.
    Blocked,
}

/// One entry in an [`InstallPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// The package this step concerns.
    pub app_id: String,
    /// What should happen to it.
    pub action: PlanAction,
    /// A short human-readable explanation of `action`.
    pub reason: String,
}

/// The kind of problem a [`PlanWarning`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A dependency cycle was found reachable from the plan's target.
    Cycle,
    /// A declared dependency is not present in the catalog.
    MissingDependency,
    /// The plan's target itself could not be resolved in the catalog.
    CatalogError,
}

/// A diagnostic attached to an [`InstallPlan`], beyond a single step's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanWarning {
    /// What kind of problem this is.
    pub kind: WarningKind,
    /// A human-readable description.
    pub message: String,
    /// The `app_id`s implicated by this warning.
    pub offending_ids: Vec<String>,
}

/// A dependency-ordered, annotated sequence of installation steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// Steps in topological (leaves-first) order, target last.
    pub steps: Vec<PlanStep>,
    /// Diagnostics collected while building the plan.
    pub warnings: Vec<PlanWarning>,
}

impl InstallPlan {
    /// Number of steps whose action is [`PlanAction::Install`].
    pub fn install_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.action == PlanAction::Install)
            .count()
    }

    /// Number of steps whose action is [`PlanAction::Skip`].
    pub fn skip_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.action == PlanAction::Skip)
            .count()
    }

    /// Whether the plan contains no [`PlanAction::Blocked`] steps.
    pub fn is_executable(&self) -> bool {
        !self.steps.iter().any(|s| s.action == PlanAction::Blocked)
    }

    /// Looks up the step planned for a given `app_id`, if any.
    pub fn step(&self, app_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.app_id == app_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

/// Builds an [`InstallPlan`] for installing `target` and its dependencies,
/// given the current catalog and state store contents.
pub fn plan(target: &str, catalog: &Catalog, state: &StateStore) -> InstallPlan {
    let mut warnings = Vec::new();

    if !catalog.contains(target) {
        warnings.push(PlanWarning {
            kind: WarningKind::CatalogError,
            message: format!("app_id {target:?} is not present in the catalog"),
            offending_ids: vec![target.to_string()],
        });
        return InstallPlan {
            steps: vec![PlanStep {
                app_id: target.to_string(),
                action: PlanAction::Blocked,
                reason: "not present in catalog".to_string(),
            }],
            warnings,
        };
    }

    let mut color: HashMap<String, Color> = HashMap::new();
    let mut blocked: HashSet<String> = HashSet::new();
    let mut blocked_reason: HashMap<String, String> = HashMap::new();
    let mut steps: Vec<PlanStep> = Vec::new();

    // Each stack frame is (app_id, index of the next dependency to visit).
    let mut stack: Vec<(String, usize)> = vec![(target.to_string(), 0)];
    color.insert(target.to_string(), Color::Gray);

    while let Some(&(ref id, cursor)) = stack.last() {
        let id = id.clone();
        let dependencies = catalog
            .get(&id)
            .map(|d| d.dependencies.clone())
            .unwrap_or_default();

        if cursor < dependencies.len() {
            stack.last_mut().unwrap().1 += 1;
            let dep = dependencies[cursor].clone();

            if !catalog.contains(&dep) {
                warnings.push(PlanWarning {
                    kind: WarningKind::MissingDependency,
                    message: format!("{id:?} depends on {dep:?}, which is not in the catalog"),
                    offending_ids: vec![dep.clone()],
                });
                blocked.insert(id.clone());
                blocked_reason
                    .entry(id.clone())
                    .or_insert_with(|| format!("depends on missing package {dep:?}"));
                continue;
            }

            match color.get(&dep).copied() {
                Some(Color::Gray) => {
                    let cycle_ids: Vec<String> = stack
                        .iter()
                        .skip_while(|(sid, _)| sid != &dep)
                        .map(|(sid, _)| sid.clone())
                        .collect();
                    warnings.push(PlanWarning {
                        kind: WarningKind::Cycle,
                        message: format!(
                            "dependency cycle: {}",
                            cycle_ids.join(" -> ")
                        ),
                        offending_ids: cycle_ids.clone(),
                    });
                    for cid in &cycle_ids {
                        blocked.insert(cid.clone());
                        blocked_reason
                            .entry(cid.clone())
                            .or_insert_with(|| "part of a dependency cycle".to_string());
                    }
                }
                Some(Color::Black) => {
                    // Already fully processed via another path (diamond dependency).
                }
                None => {
                    color.insert(dep.clone(), Color::Gray);
                    stack.push((dep, 0));
                }
            }
        } else {
            stack.pop();
            color.insert(id.clone(), Color::Black);
            steps.push(build_step(&id, catalog, state, &mut blocked, &mut blocked_reason));
        }
    }

    tracing::debug!(
        target,
        install = steps.iter().filter(|s| s.action == PlanAction::Install).count(),
        skip = steps.iter().filter(|s| s.action == PlanAction::Skip).count(),
        blocked = steps.iter().filter(|s| s.action == PlanAction::Blocked).count(),
        "built install plan"
    );

    InstallPlan { steps, warnings }
}

fn build_step(
    id: &str,
    catalog: &Catalog,
    state: &StateStore,
    blocked: &mut HashSet<String>,
    blocked_reason: &mut HashMap<String, String>,
) -> PlanStep {
    let propagated_from = catalog
        .get(id)
        .ok()
        .and_then(|d| d.dependencies.iter().find(|dep| blocked.contains(*dep)).cloned());

    if blocked.contains(id) || propagated_from.is_some() {
        blocked.insert(id.to_string());
        let reason = blocked_reason.entry(id.to_string()).or_insert_with(|| {
            format!(
                "depends on blocked package {:?}",
                propagated_from.unwrap_or_default()
            )
        });
        return PlanStep {
            app_id: id.to_string(),
            action: PlanAction::Blocked,
            reason: reason.clone(),
        };
    }

    let descriptor = catalog.get(id).expect("id was validated as present above");
    match state.get(id) {
        Some(record) if record.version == descriptor.version => PlanStep {
            app_id: id.to_string(),
            action: PlanAction::Skip,
            reason: format!("already installed at version {}", record.version),
        },
        Some(record) => PlanStep {
            app_id: id.to_string(),
            action: PlanAction::Install,
            reason: format!(
                "installed version {} differs from catalog version {}",
                record.version, descriptor.version
            ),
        },
        None => PlanStep {
            app_id: id.to_string(),
            action: PlanAction::Install,
            reason: "not currently installed".to_string(),
        },
    }
}
