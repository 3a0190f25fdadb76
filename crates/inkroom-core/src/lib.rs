//! Inkroom Core Library
//!
//! Platform-agnostic engine for a collaborative whiteboard: camera, bounded
//! history log, tool state machine, region selection, the synchronization
//! protocol and the interaction loop that ties them together.

pub mod camera;
pub mod config;
pub mod error;
pub mod history;
pub mod input;
mod interaction;
pub mod operation;
pub mod protocol;
pub mod render;
pub mod selection;
pub mod session;
pub mod sync;
pub mod tools;
pub mod transport;

pub use camera::Camera;
pub use config::{EchoKey, EngineConfig, Identity, Role, SessionParams};
pub use error::{ConfigError, EngineError, EngineResult, TransportError};
pub use history::HistoryLog;
pub use input::TouchPoint;
pub use operation::{Geometry, Operation, OperationKind, Rgba, ShapeKind};
pub use protocol::{ElementMove, Envelope, Message};
pub use render::{RecordingSurface, RenderSurface, StrokeStyle};
pub use selection::Selection;
pub use session::{Feedback, LogFeedback, Session};
pub use sync::{ConnectionState, PlatformWebSocket, SyncEvent};
pub use tools::{SnipMode, Tool};
pub use transport::{MemoryHub, MemoryTransport, Transport};
