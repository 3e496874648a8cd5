//! Shape synchronization, locking, and history for a collaborative canvas.
//!
//! Many clients edit one shared set of shapes. Each client keeps an
//! optimistic local [`store::ShapeStore`], folds the remote change stream into
//! it with last-write-wins, takes short-lived per-shape leases before
//! dragging, and keeps its own transactional undo/redo log. The remote store
//! itself sits behind the [`remote::RemoteStore`] trait.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`shape`] | Shape model, geometry variants, and sparse [`shape::ShapePatch`] updates |
//! | [`geometry`] | Bounding boxes, centers, and edges per variant |
//! | [`store`] | In-memory shape store with remote last-write-wins application |
//! | [`zorder`] | Front/back/forward/backward reordering with renormalization |
//! | [`layout`] | Align and distribute helpers |
//! | [`lock`] | TTL-bounded advisory write leases |
//! | [`history`] | Transactional undo/redo with time-windowed coalescing |
//! | [`sync`] | Per-frame buffering of the remote change stream |
//! | [`reconcile`] | Merging the initial bulk load with optimistic local shapes |
//! | [`remote`] | Remote store boundary and the in-memory implementation |
//! | [`session`] | Per-client facade: the only mutation path for the UI layer |
//! | [`config`] | Environment-driven tuning knobs |
//! | [`clock`] | Wall-clock source, injectable for tests |
//! | [`error`] | Shared [`error::ErrorCode`] trait |
//! | [`consts`] | Shared numeric defaults |

pub mod clock;
pub mod config;
pub mod consts;
pub mod error;
pub mod geometry;
pub mod history;
pub mod layout;
pub mod lock;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod shape;
pub mod store;
pub mod sync;
pub mod zorder;

pub use config::SyncConfig;
pub use remote::memory::MemoryRemote;
pub use remote::{ChangeEvent, ChangeKind, PendingWrites, RemoteStore};
pub use session::{Session, SessionError};
pub use shape::{ClientId, Geometry, Shape, ShapeId, ShapePatch};
