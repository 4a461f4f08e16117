//! Stage dependency graph.
//!
//! Stages and their dependencies are declared as explicit nodes and edges.
//! A Kahn sort groups them into layers: every stage in a layer depends only
//! on stages in earlier layers, so each layer may run concurrently.

use std::collections::{BTreeMap, BTreeSet};

use framely_models::Stage;
use thiserror::Error;

/// Which resource a stage consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Needs a slot in the accelerator pool
    Accelerator,
    Cpu,
}

/// Pipeline phase a stage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Done before the shot pipeline starts
    Preparation,
    Gpu,
    Cpu,
    Audio,
    Reasoning,
}

#[derive(Debug, Clone, Copy)]
pub struct StageNode {
    pub stage: Stage,
    pub resource: ResourceClass,
    pub phase: Phase,
}

impl StageNode {
    pub const fn new(stage: Stage, resource: ResourceClass, phase: Phase) -> Self {
        Self {
            stage,
            resource,
            phase,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Stage graph contains a cycle through: {0:?}")]
    Cycle(Vec<Stage>),

    #[error("Edge references undeclared stage {0}")]
    UnknownStage(Stage),

    #[error("Stage {0} declared twice")]
    DuplicateStage(Stage),
}

/// Validated, topologically grouped stage graph.
#[derive(Debug, Clone)]
pub struct StageGraph {
    nodes: BTreeMap<Stage, StageNode>,
    deps: BTreeMap<Stage, BTreeSet<Stage>>,
    groups: Vec<Vec<Stage>>,
}

impl StageGraph {
    /// Build a graph from nodes and `(dependency, dependent)` edges.
    pub fn from_edges(nodes: &[StageNode], edges: &[(Stage, Stage)]) -> Result<Self, GraphError> {
        let mut node_map = BTreeMap::new();
        for node in nodes {
            if node_map.insert(node.stage, *node).is_some() {
                return Err(GraphError::DuplicateStage(node.stage));
            }
        }

        let mut deps: BTreeMap<Stage, BTreeSet<Stage>> =
            node_map.keys().map(|s| (*s, BTreeSet::new())).collect();
        for (from, to) in edges {
            if !node_map.contains_key(from) {
                return Err(GraphError::UnknownStage(*from));
            }
            let Some(entry) = deps.get_mut(to) else {
                return Err(GraphError::UnknownStage(*to));
            };
            entry.insert(*from);
        }

        let groups = topological_groups(&deps)?;
        Ok(Self {
            nodes: node_map,
            deps,
            groups,
        })
    }

    /// The analysis graph used by the engine.
    ///
    /// # Panics
    /// Panics if the built-in declaration is cyclic, which is a programming
    /// error caught on startup.
    pub fn standard() -> Self {
        use Stage::*;

        let gpu = |stage| StageNode::new(stage, ResourceClass::Accelerator, Phase::Gpu);
        let cpu = |stage| StageNode::new(stage, ResourceClass::Cpu, Phase::Cpu);

        let nodes = [
            StageNode::new(Prep, ResourceClass::Cpu, Phase::Preparation),
            gpu(YoloCoarse),
            gpu(YoloTiled),
            gpu(Superres),
            gpu(YoloFine),
            gpu(Sam2Refine),
            gpu(Faces),
            cpu(OcrFonts),
            cpu(ColorComp),
            cpu(MotionSaliency),
            cpu(Transitions),
            StageNode::new(AudioEng, ResourceClass::Cpu, Phase::Audio),
            StageNode::new(QwenVl, ResourceClass::Accelerator, Phase::Reasoning),
        ];
        let edges = [
            (Prep, YoloCoarse),
            (YoloCoarse, YoloTiled),
            (YoloTiled, Superres),
            (Superres, YoloFine),
            (YoloFine, Sam2Refine),
            (Prep, Faces),
            (Prep, OcrFonts),
            (Prep, ColorComp),
            (Prep, MotionSaliency),
            (Prep, AudioEng),
            (Prep, Transitions),
            (Sam2Refine, QwenVl),
            (Faces, QwenVl),
            (OcrFonts, QwenVl),
            (ColorComp, QwenVl),
            (MotionSaliency, QwenVl),
            (AudioEng, QwenVl),
        ];

        match Self::from_edges(&nodes, &edges) {
            Ok(graph) => graph,
            Err(e) => panic!("invalid built-in stage graph: {}", e),
        }
    }

    /// Concurrently runnable groups, in dependency order.
    pub fn groups(&self) -> &[Vec<Stage>] {
        &self.groups
    }

    /// All stages flattened in topological order.
    pub fn order(&self) -> Vec<Stage> {
        self.groups.iter().flatten().copied().collect()
    }

    pub fn dependencies(&self, stage: Stage) -> impl Iterator<Item = Stage> + '_ {
        self.deps.get(&stage).into_iter().flatten().copied()
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.nodes.contains_key(&stage)
    }

    pub fn requires_bounded_resource(&self, stage: Stage) -> bool {
        self.nodes
            .get(&stage)
            .map(|n| n.resource == ResourceClass::Accelerator)
            .unwrap_or(false)
    }

    pub fn phase_of(&self, stage: Stage) -> Option<Phase> {
        self.nodes.get(&stage).map(|n| n.phase)
    }

    /// Stages of one phase in topological order.
    pub fn stages_in(&self, phase: Phase) -> Vec<Stage> {
        self.groups
            .iter()
            .flatten()
            .copied()
            .filter(|s| self.phase_of(*s) == Some(phase))
            .collect()
    }
}

fn topological_groups(deps: &BTreeMap<Stage, BTreeSet<Stage>>) -> Result<Vec<Vec<Stage>>, GraphError> {
    let mut remaining: BTreeMap<Stage, usize> =
        deps.iter().map(|(stage, d)| (*stage, d.len())).collect();
    let mut groups = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<Stage> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(stage, _)| *stage)
            .collect();

        if ready.is_empty() {
            return Err(GraphError::Cycle(remaining.keys().copied().collect()));
        }

        for stage in &ready {
            remaining.remove(stage);
        }
        for (stage, count) in remaining.iter_mut() {
            let satisfied = deps[stage].iter().filter(|d| ready.contains(*d)).count();
            *count -= satisfied;
        }
        groups.push(ready);
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_graph_is_topological() {
        let graph = StageGraph::standard();
        let order = graph.order();
        assert_eq!(order.len(), Stage::ALL.len());

        let position = |s: Stage| order.iter().position(|x| *x == s).unwrap();
        for stage in &order {
            for dep in graph.dependencies(*stage) {
                assert!(position(dep) < position(*stage), "{} before {}", dep, stage);
            }
        }
    }

    #[test]
    fn test_dependencies_are_in_earlier_groups() {
        let graph = StageGraph::standard();
        let group_of = |s: Stage| graph.groups().iter().position(|g| g.contains(&s)).unwrap();
        for stage in graph.order() {
            for dep in graph.dependencies(stage) {
                assert!(group_of(dep) < group_of(stage));
            }
        }
        assert_eq!(graph.groups()[0], vec![Stage::Prep]);
        assert_eq!(graph.groups().last().unwrap(), &vec![Stage::QwenVl]);
    }

    #[test]
    fn test_gpu_phase_order() {
        let graph = StageGraph::standard();
        let gpu = graph.stages_in(Phase::Gpu);
        let pos = |s: Stage| gpu.iter().position(|x| *x == s).unwrap();
        assert!(pos(Stage::YoloCoarse) < pos(Stage::YoloTiled));
        assert!(pos(Stage::YoloTiled) < pos(Stage::Superres));
        assert!(pos(Stage::Superres) < pos(Stage::YoloFine));
        assert!(pos(Stage::YoloFine) < pos(Stage::Sam2Refine));
        assert!(gpu.contains(&Stage::Faces));
        assert!(!gpu.contains(&Stage::QwenVl));
    }

    #[test]
    fn test_resource_classes() {
        let graph = StageGraph::standard();
        assert!(graph.requires_bounded_resource(Stage::Sam2Refine));
        assert!(graph.requires_bounded_resource(Stage::QwenVl));
        assert!(!graph.requires_bounded_resource(Stage::ColorComp));
        assert!(!graph.requires_bounded_resource(Stage::AudioEng));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let nodes = [
            StageNode::new(Stage::Faces, ResourceClass::Cpu, Phase::Cpu),
            StageNode::new(Stage::OcrFonts, ResourceClass::Cpu, Phase::Cpu),
            StageNode::new(Stage::ColorComp, ResourceClass::Cpu, Phase::Cpu),
        ];
        let edges = [
            (Stage::Faces, Stage::OcrFonts),
            (Stage::OcrFonts, Stage::ColorComp),
            (Stage::ColorComp, Stage::Faces),
        ];
        assert!(matches!(
            StageGraph::from_edges(&nodes, &edges),
            Err(GraphError::Cycle(_))
        ));
    }

    #[test]
    fn test_unknown_and_duplicate_stages() {
        let nodes = [StageNode::new(Stage::Faces, ResourceClass::Cpu, Phase::Cpu)];
        assert_eq!(
            StageGraph::from_edges(&nodes, &[(Stage::Prep, Stage::Faces)]).unwrap_err(),
            GraphError::UnknownStage(Stage::Prep)
        );
        let dup = [nodes[0], nodes[0]];
        assert_eq!(
            StageGraph::from_edges(&dup, &[]).unwrap_err(),
            GraphError::DuplicateStage(Stage::Faces)
        );
    }
}
