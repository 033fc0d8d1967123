//! Split-pane service/kernel-log dashboard core.
//!
//! Panels implement [`component::Component`] and are composed left to right
//! by [`composite::Composite`]. Background producers publish into
//! per-producer mailboxes; the [`scheduler::Scheduler`] hands their events
//! to the single render loop in [`runtime`], which is the only place panel
//! state is mutated.

pub mod component;
pub mod composite;
pub mod config;
pub mod error;
pub mod event;
pub mod panels;
pub mod producer;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod theme;

pub use component::{Component, Share};
pub use composite::{is_quit_key, Composite, LayoutGeometry};
pub use config::{CommandSpec, DashboardConfig, ServiceEntry};
pub use error::{ConfigError, DashboardError};
pub use event::{EndReason, Event, LogChunk, ProducerEvent, ProducerId, Request};
pub use runtime::{run_dashboard, Dashboard, UiReceiver};
pub use scheduler::{Flow, Scheduler};
pub use service::{Service, ServiceStatus, StatusSnapshot};
pub use theme::Theme;
