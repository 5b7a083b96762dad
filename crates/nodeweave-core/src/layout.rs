//! Force-directed layout engine.
//!
//! Each step accumulates pairwise repulsion (bounded by a cutoff radius and
//! looked up through per-step neighbour bins), spring attraction along edges,
//! then integrates damped velocities. Speeds are capped by a temperature that
//! cools every step, so a run always settles. The engine holds no copy of the
//! scene; it reads and writes node positions and velocities in place.

use crate::config::{ConfigError, LayoutConfig};
use crate::scene::{NodeId, Scene};
use crate::spatial::{Binned, NeighborBins, SpatialGrid};
use kurbo::Vec2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Distances below this are treated as coincident.
const COINCIDENT_EPSILON: f64 = 1e-9;

/// Lifecycle of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutState {
    #[default]
    Idle,
    Running,
    Converged,
}

/// Outcome of a single [`ForceLayout::step`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Whether the simulation actually advanced.
    pub stepped: bool,
    /// State after the step.
    pub state: LayoutState,
    /// Total kinetic energy (sum of squared speeds).
    pub energy: f64,
    /// Largest distance any node moved during the step.
    pub max_displacement: f64,
    /// Neighbour pairs the repulsion pass looked at.
    pub candidates: usize,
    /// Nodes whose position changed.
    pub moved: Vec<NodeId>,
}

/// A node held in place by an ongoing drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hold {
    node: NodeId,
}

/// What the repulsion pass needs to know about a binned node.
#[derive(Debug, Clone, Copy)]
struct Body {
    id: NodeId,
    slot: usize,
    movable: bool,
}

/// Iterative spring-electrical layout solver.
#[derive(Debug, Clone)]
pub struct ForceLayout {
    config: LayoutConfig,
    state: LayoutState,
    calm_steps: u32,
    steps: u64,
    energy: f64,
    temperature: f64,
    hold: Option<Hold>,
    bins: NeighborBins<Body>,
}

impl Default for ForceLayout {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl ForceLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            temperature: config.max_speed,
            config,
            state: LayoutState::Idle,
            calm_steps: 0,
            steps: 0,
            energy: 0.0,
            hold: None,
            bins: NeighborBins::default(),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Swap in new parameters. Takes effect on the next step.
    pub fn set_config(&mut self, config: LayoutConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.temperature = self.temperature.min(config.max_speed);
        self.config = config;
        Ok(())
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LayoutState::Running
    }

    /// Kinetic energy after the last step.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Current speed cap.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Steps taken since the last [`start`](Self::start).
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Begin (or restart) the simulation with every velocity zeroed.
    pub fn start(&mut self, scene: &mut Scene) {
        for node in scene.nodes_mut() {
            node.velocity = Vec2::ZERO;
        }
        self.state = LayoutState::Running;
        self.calm_steps = 0;
        self.steps = 0;
        self.energy = 0.0;
        self.temperature = self.config.max_speed;
        log::info!("Layout started with {} nodes", scene.node_count());
    }

    /// Force the engine back to idle.
    pub fn stop(&mut self) {
        if self.state != LayoutState::Idle {
            log::info!("Layout stopped after {} steps", self.steps);
        }
        self.state = LayoutState::Idle;
        self.calm_steps = 0;
    }

    /// Wake a converged simulation after an external change and reheat it.
    pub fn perturb(&mut self) {
        if self.state == LayoutState::Converged {
            log::debug!("Layout perturbed, resuming");
            self.state = LayoutState::Running;
        }
        self.calm_steps = 0;
        self.temperature = self.config.max_speed;
    }

    /// Keep `node` out of the integration until [`release`](Self::release).
    pub fn hold(&mut self, node: NodeId) {
        self.hold = Some(Hold { node });
        self.perturb();
    }

    /// End a hold started with [`hold`](Self::hold).
    pub fn release(&mut self) -> Option<NodeId> {
        let released = self.hold.take().map(|h| h.node);
        if released.is_some() {
            self.perturb();
        }
        released
    }

    /// The node currently held by a drag, if any.
    pub fn held(&self) -> Option<NodeId> {
        self.hold.map(|h| h.node)
    }

    /// Advance the simulation by `dt`.
    ///
    /// Does nothing unless the engine is running. Forces for every node are
    /// computed from the current positions before any position is written,
    /// and the grid is refreshed for moved nodes before returning, so callers
    /// never observe a half-applied step.
    ///
    /// The run converges once the mean kinetic energy per movable node stays
    /// below `energy_threshold` for `calm_steps` steps in a row.
    pub fn step(&mut self, dt: f64, scene: &mut Scene, grid: &mut SpatialGrid) -> StepReport {
        if self.state != LayoutState::Running {
            return StepReport {
                state: self.state,
                energy: self.energy,
                ..StepReport::default()
            };
        }
        if !(dt.is_finite() && dt > 0.0) {
            log::warn!("Ignoring layout step with invalid dt {dt}");
            return StepReport {
                state: self.state,
                energy: self.energy,
                ..StepReport::default()
            };
        }

        let held = self.held();
        let config = &self.config;
        self.bins.rebuild(
            config.cutoff,
            scene.slotted_nodes().map(|(slot, node)| {
                let body = Body {
                    id: node.id(),
                    slot,
                    movable: !node.pinned && held != Some(node.id()),
                };
                (node.position, body)
            }),
        );

        let mut report = StepReport {
            stepped: true,
            ..StepReport::default()
        };
        let mut forces = vec![Vec2::ZERO; scene.node_slots()];
        for (slot, force, candidates) in repulsion_forces(&self.bins, config) {
            forces[slot] += force;
            report.candidates += candidates;
        }
        accumulate_springs(scene, config, &mut forces);

        let temperature = self.temperature;
        let mut movable = 0usize;
        for (slot, node) in scene.slotted_nodes_mut() {
            if node.pinned || held == Some(node.id()) {
                continue;
            }
            movable += 1;
            let mut velocity = (node.velocity + forces[slot] * dt) * config.damping;
            let speed = velocity.hypot();
            if speed > temperature {
                velocity *= temperature / speed;
            }
            node.velocity = velocity;
            let displacement = velocity * dt;
            report.energy += velocity.hypot2();
            if displacement != Vec2::ZERO {
                node.position += displacement;
                report.max_displacement = report.max_displacement.max(displacement.hypot());
                report.moved.push(node.id());
            }
        }
        self.temperature *= config.cooling;

        for &id in &report.moved {
            if let Some(bounds) = scene.node_bounds(id) {
                grid.update(id, bounds);
            }
        }

        self.steps += 1;
        self.energy = report.energy;
        if report.energy < config.energy_threshold * movable.max(1) as f64 {
            self.calm_steps += 1;
        } else {
            self.calm_steps = 0;
        }
        if self.calm_steps >= config.calm_steps {
            self.state = LayoutState::Converged;
            log::info!(
                "Layout converged after {} steps (energy {:.4})",
                self.steps,
                report.energy
            );
        } else {
            log::debug!(
                "Layout step {}: energy {:.4}, {} nodes moved, {} pairs",
                self.steps,
                report.energy,
                report.moved.len(),
                report.candidates
            );
        }
        report.state = self.state;
        report
    }
}

/// Unit vector for a coincident pair, pointing from `other` towards `node`.
///
/// Derived from the ids alone so the result is reproducible, and
/// antisymmetric so the pair is pushed apart rather than sideways.
fn coincident_direction(node: NodeId, other: NodeId) -> Vec2 {
    let (lo, hi) = if node < other { (node, other) } else { (other, node) };
    let mut x = lo.0.wrapping_mul(0x9E37_79B9) ^ hi.0.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 16;
    x = x.wrapping_mul(0xC2B2_AE35);
    x ^= x >> 13;
    let angle = f64::from(x) / f64::from(u32::MAX) * std::f64::consts::TAU;
    let dir = Vec2::from_angle(angle);
    if node < other { dir } else { -dir }
}

/// Repulsion acting on `body` from every node within the cutoff radius, and
/// how many neighbours were examined.
fn repulsion_on(body: &Binned<Body>, bins: &NeighborBins<Body>, config: &LayoutConfig) -> (Vec2, usize) {
    let cutoff = config.cutoff;
    let shift = config.repulsion / (cutoff * cutoff);
    let mut force = Vec2::ZERO;
    let mut candidates = 0;
    bins.query_near(body.point, |other| {
        if other.item.slot == body.item.slot {
            return;
        }
        candidates += 1;
        let mut delta = body.point - other.point;
        let mut distance = delta.hypot();
        if distance < COINCIDENT_EPSILON {
            delta = coincident_direction(body.item.id, other.item.id);
            distance = 1.0;
        }
        if distance > cutoff {
            return;
        }
        let floored = distance.max(config.min_distance);
        // Shifted so the force fades to exactly zero at the cutoff.
        let magnitude = config.repulsion / (floored * floored) - shift;
        force += delta * (magnitude / distance);
    });
    (force, candidates)
}

/// Read-only repulsion phase, partitioned by cell. Yields `(slot, force,
/// candidates)` per movable node; the caller merges them.
fn repulsion_forces(bins: &NeighborBins<Body>, config: &LayoutConfig) -> Vec<(usize, Vec2, usize)> {
    let cell = |n: usize| {
        bins.cell(n)
            .iter()
            .filter(|entry| entry.item.movable)
            .map(move |entry| {
                let (force, candidates) = repulsion_on(entry, bins, config);
                (entry.item.slot, force, candidates)
            })
    };
    #[cfg(feature = "parallel")]
    {
        (0..bins.cell_count()).into_par_iter().flat_map_iter(cell).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..bins.cell_count()).flat_map(cell).collect()
    }
}

/// Hooke springs pulling every edge towards the rest length.
fn accumulate_springs(scene: &Scene, config: &LayoutConfig, forces: &mut [Vec2]) {
    for edge in scene.edges() {
        let (Some(source), Some(target)) = (scene.node_slot(edge.source), scene.node_slot(edge.target)) else {
            continue;
        };
        let (Some(from), Some(to)) = (scene.node(edge.source), scene.node(edge.target)) else {
            continue;
        };
        let delta = to.position - from.position;
        let distance = delta.hypot();
        let direction = if distance < COINCIDENT_EPSILON {
            coincident_direction(edge.target, edge.source)
        } else {
            delta / distance
        };
        let pull = direction * (config.spring * (distance - config.rest_length));
        forces[source] += pull;
        forces[target] -= pull;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeSpec;
    use crate::shapes::CurveKind;
    use kurbo::Point;

    fn indexed(scene: &Scene) -> SpatialGrid {
        let mut grid = SpatialGrid::new(64.0).unwrap();
        for node in scene.nodes() {
            grid.insert(node.id(), node.bounds());
        }
        grid
    }

    #[test]
    fn test_state_machine() {
        let mut scene = Scene::new();
        let mut grid = indexed(&scene);
        let mut layout = ForceLayout::default();
        assert_eq!(layout.state(), LayoutState::Idle);
        assert!(!layout.step(1.0, &mut scene, &mut grid).stepped);

        layout.start(&mut scene);
        assert_eq!(layout.state(), LayoutState::Running);
        layout.stop();
        assert_eq!(layout.state(), LayoutState::Idle);
    }

    #[test]
    fn test_start_resets_velocity() {
        let mut scene = Scene::new();
        let id = scene.insert_node(NodeSpec::circle(Point::ZERO, 5.0)).unwrap();
        scene.node_mut(id).unwrap().velocity = Vec2::new(3.0, 4.0);
        let mut layout = ForceLayout::default();
        layout.start(&mut scene);
        assert_eq!(scene.node(id).unwrap().velocity, Vec2::ZERO);
    }

    #[test]
    fn test_coincident_nodes_separate_deterministically() {
        let build = || {
            let mut scene = Scene::new();
            for _ in 0..3 {
                scene.insert_node(NodeSpec::circle(Point::new(10.0, 10.0), 5.0)).unwrap();
            }
            scene
        };
        let run = |mut scene: Scene| {
            let mut grid = indexed(&scene);
            let mut layout = ForceLayout::default();
            layout.start(&mut scene);
            for _ in 0..5 {
                layout.step(1.0, &mut scene, &mut grid);
            }
            scene.nodes().map(|n| n.position).collect::<Vec<_>>()
        };
        let first = run(build());
        let second = run(build());
        assert_eq!(first, second);
        for p in &first {
            assert!(p.x.is_finite() && p.y.is_finite());
        }
        assert!((first[0] - first[1]).hypot() > 1.0);
    }

    #[test]
    fn test_coincident_direction_is_antisymmetric() {
        let a = coincident_direction(NodeId(3), NodeId(8));
        let b = coincident_direction(NodeId(8), NodeId(3));
        assert!((a + b).hypot() < 1e-12);
        assert!((a.hypot() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_clamped() {
        let mut scene = Scene::new();
        scene.insert_node(NodeSpec::circle(Point::ZERO, 1.0)).unwrap();
        scene.insert_node(NodeSpec::circle(Point::new(0.5, 0.0), 1.0)).unwrap();
        let mut grid = indexed(&scene);
        let config = LayoutConfig {
            max_speed: 2.0,
            ..LayoutConfig::default()
        };
        let mut layout = ForceLayout::new(config);
        layout.start(&mut scene);
        let report = layout.step(1.0, &mut scene, &mut grid);
        for node in scene.nodes() {
            assert!(node.velocity.hypot() <= 2.0 + 1e-12);
        }
        assert!(report.max_displacement <= 2.0 + 1e-12);
    }

    #[test]
    fn test_pinned_node_never_moves() {
        let mut scene = Scene::new();
        let anchor = scene
            .insert_node(NodeSpec::circle(Point::new(0.0, 0.0), 5.0).pinned(true))
            .unwrap();
        let free = scene.insert_node(NodeSpec::circle(Point::new(3.0, 0.0), 5.0)).unwrap();
        scene.insert_edge(anchor, free, CurveKind::Line).unwrap();
        let mut grid = indexed(&scene);
        let mut layout = ForceLayout::default();
        layout.start(&mut scene);
        for _ in 0..200 {
            layout.step(1.0, &mut scene, &mut grid);
        }
        assert_eq!(scene.node(anchor).unwrap().position, Point::ZERO);
        // The free node was pushed out towards the rest length.
        assert!(scene.node(free).unwrap().position.x > 50.0);
    }

    #[test]
    fn test_held_node_is_excluded() {
        let mut scene = Scene::new();
        let a = scene.insert_node(NodeSpec::circle(Point::ZERO, 5.0)).unwrap();
        let b = scene.insert_node(NodeSpec::circle(Point::new(5.0, 0.0), 5.0)).unwrap();
        let mut grid = indexed(&scene);
        let mut layout = ForceLayout::default();
        layout.start(&mut scene);
        layout.hold(a);
        let report = layout.step(1.0, &mut scene, &mut grid);
        assert_eq!(report.moved, vec![b]);
        assert_eq!(layout.release(), Some(a));
        let report = layout.step(1.0, &mut scene, &mut grid);
        assert!(report.moved.contains(&a));
    }

    #[test]
    fn test_grid_follows_moves() {
        let mut scene = Scene::new();
        let a = scene.insert_node(NodeSpec::circle(Point::ZERO, 2.0)).unwrap();
        let b = scene.insert_node(NodeSpec::circle(Point::new(1.0, 0.0), 2.0)).unwrap();
        let mut grid = indexed(&scene);
        let mut layout = ForceLayout::default();
        layout.start(&mut scene);
        for _ in 0..50 {
            layout.step(1.0, &mut scene, &mut grid);
        }
        for id in [a, b] {
            let p = scene.node(id).unwrap().position;
            assert!(grid.query_point(p).contains(&id));
        }
    }

    #[test]
    fn test_converges_and_stays_converged() {
        let mut scene = Scene::new();
        let a = scene.insert_node(NodeSpec::circle(Point::ZERO, 5.0)).unwrap();
        let b = scene.insert_node(NodeSpec::circle(Point::new(300.0, 0.0), 5.0)).unwrap();
        scene.insert_edge(a, b, CurveKind::Line).unwrap();
        let mut grid = indexed(&scene);
        let mut layout = ForceLayout::default();
        layout.start(&mut scene);
        let mut steps = 0;
        while layout.state() == LayoutState::Running && steps < 2000 {
            layout.step(1.0, &mut scene, &mut grid);
            steps += 1;
        }
        assert_eq!(layout.state(), LayoutState::Converged);

        let before: Vec<_> = scene.nodes().map(|n| n.position).collect();
        let report = layout.step(1.0, &mut scene, &mut grid);
        assert!(!report.stepped);
        let after: Vec<_> = scene.nodes().map(|n| n.position).collect();
        assert_eq!(before, after);

        layout.perturb();
        assert_eq!(layout.state(), LayoutState::Running);
    }

    #[test]
    fn test_invalid_dt_is_ignored() {
        let mut scene = Scene::new();
        scene.insert_node(NodeSpec::circle(Point::ZERO, 5.0)).unwrap();
        scene.insert_node(NodeSpec::circle(Point::new(1.0, 0.0), 5.0)).unwrap();
        let mut grid = indexed(&scene);
        let mut layout = ForceLayout::default();
        layout.start(&mut scene);
        assert!(!layout.step(f64::NAN, &mut scene, &mut grid).stepped);
        assert!(!layout.step(-1.0, &mut scene, &mut grid).stepped);
        assert_eq!(layout.steps(), 0);
    }

    #[test]
    fn test_temperature_cools_and_reheats() {
        let mut scene = Scene::new();
        scene.insert_node(NodeSpec::circle(Point::ZERO, 5.0)).unwrap();
        scene.insert_node(NodeSpec::circle(Point::new(20.0, 0.0), 5.0)).unwrap();
        let mut grid = indexed(&scene);
        let config = LayoutConfig {
            cooling: 0.5,
            ..LayoutConfig::default()
        };
        let mut layout = ForceLayout::new(config.clone());
        layout.start(&mut scene);
        for _ in 0..3 {
            layout.step(1.0, &mut scene, &mut grid);
        }
        assert_eq!(layout.temperature(), config.max_speed * 0.125);
        let report = layout.step(1.0, &mut scene, &mut grid);
        assert!(report.max_displacement <= config.max_speed * 0.125 + 1e-12);

        layout.perturb();
        assert_eq!(layout.temperature(), config.max_speed);
    }

    #[test]
    fn test_cooling_forces_convergence() {
        // Springs far too stiff to ever settle on their own.
        let mut scene = Scene::new();
        let a = scene.insert_node(NodeSpec::circle(Point::ZERO, 5.0)).unwrap();
        let b = scene.insert_node(NodeSpec::circle(Point::new(400.0, 0.0), 5.0)).unwrap();
        scene.insert_edge(a, b, CurveKind::Line).unwrap();
        let mut grid = indexed(&scene);
        let config = LayoutConfig {
            spring: 5.0,
            damping: 1.0,
            ..LayoutConfig::default()
        };
        let mut layout = ForceLayout::new(config);
        layout.start(&mut scene);
        let mut steps = 0;
        while layout.is_running() && steps < 2000 {
            layout.step(1.0, &mut scene, &mut grid);
            steps += 1;
        }
        assert_eq!(layout.state(), LayoutState::Converged);
    }

    #[test]
    fn test_far_nodes_do_not_repel() {
        let mut scene = Scene::new();
        scene.insert_node(NodeSpec::circle(Point::ZERO, 5.0)).unwrap();
        let cutoff = LayoutConfig::default().cutoff;
        scene
            .insert_node(NodeSpec::circle(Point::new(cutoff * 1.5, 0.0), 5.0))
            .unwrap();
        let mut grid = indexed(&scene);
        let mut layout = ForceLayout::default();
        layout.start(&mut scene);
        let report = layout.step(1.0, &mut scene, &mut grid);
        assert!(report.moved.is_empty());
        assert!(report.candidates <= 2);
    }

    #[test]
    fn test_set_config_validates() {
        let mut layout = ForceLayout::default();
        let bad = LayoutConfig {
            cooling: 0.0,
            ..LayoutConfig::default()
        };
        assert!(layout.set_config(bad).is_err());
        let slower = LayoutConfig {
            max_speed: 5.0,
            ..LayoutConfig::default()
        };
        layout.set_config(slower).unwrap();
        assert_eq!(layout.config().max_speed, 5.0);
        assert_eq!(layout.temperature(), 5.0);
    }
}
