//! NodeWeave Core Library
//!
//! Renderer-agnostic core of an interactive graph canvas: scene graph,
//! spatial index, hit-testing, force-directed layout and frame scheduling.

pub mod camera;
pub mod canvas;
pub mod config;
pub mod error;
pub mod hit;
pub mod layout;
pub mod scene;
pub mod scheduler;
pub mod selection;
pub mod shapes;
pub mod snapshot;
pub mod spatial;
pub mod storage;

pub use camera::Camera;
pub use canvas::Canvas;
pub use config::{CameraConfig, CanvasConfig, ConfigError, LayoutConfig, SchedulerConfig, SpatialConfig};
pub use error::{ErrorKind, SceneError, SceneResult, ValidationIssue};
pub use hit::{pick, pick_region};
pub use layout::{ForceLayout, LayoutState, StepReport};
pub use scene::{Edge, EdgeId, Node, NodeId, NodeSpec, Scene};
pub use scheduler::{Applied, FrameScheduler, FrameStats, Mutation, TickReport};
pub use selection::Selection;
pub use shapes::{CurveKind, NodeShape, NodeStyle, SerializableColor};
pub use snapshot::{EdgeSprite, NodeSprite, RenderSnapshot};
pub use spatial::{NeighborBins, SpatialGrid, suggested_cell_size};
pub use storage::{FileStorage, MemoryStorage, SceneDocument, Storage, StorageError};
