//! Resource abstraction layer
//!
//! Every dashboard resource is a descriptor (name plus URLs) driving one
//! generic CRUD engine. New resources are added by declaring a descriptor,
//! not by writing fetch code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads resource descriptors from embedded JSON
//! - [`model`] - Generic CRUD engine over the query cache
//! - [`page`] - Normalizes bare-array and enveloped list responses
//! - [`models`] - Typed domain resources
//! - [`display`] - Display-name lookups over cached choices
//! - [`context`] - Ties client, cache and retry policy together
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `journal.json` - Events, categories, activity logs, multimedia
//! - `world.json` - Game worlds, world stories, characters
//! - `community.json` - News, shop items, rankings
//!
//! # Example
//!
//! ```ignore
//! use chronicle::cache::QueryParams;
//! use chronicle::resource::{models::Event, ResourceContext};
//!
//! async fn upcoming(ctx: &ResourceContext) -> chronicle::api::Result<Vec<Event>> {
//!     let events = ctx.model::<Event>()?;
//!     events.list(&QueryParams::new().with("is_active", true)).await
//! }
//! ```

pub mod context;
pub mod display;
pub mod model;
pub mod models;
pub mod page;
pub mod registry;

pub use context::ResourceContext;
pub use display::{Choice, DisplayNames};
pub use model::ResourceModel;
pub use models::{Related, Resource};
pub use page::Page;
pub use registry::{
    get_all_resource_names, get_registry, get_resource, ResourceDescriptor, UpdateMethod,
};
