//! Circle Store - Reactive Resource Cache
//!
//! In-memory stores that sit between the client UI and the remote API.
//! Each store deduplicates concurrent loads, tracks staleness per account,
//! and notifies subscribers synchronously when the active account's value
//! changes.
//!
//! # Example
//!
//! ```ignore
//! let ctx = AppContext::new(backend)?;
//! ctx.scope().set_active(Some(AccountId::from("usr_123")));
//!
//! let _sub = ctx.worlds().subscribe(|worlds| render(worlds));
//! let worlds = ctx.worlds().ensure().await?;
//! ```

#[macro_use]
mod macros;

pub mod alerts;
pub mod backend;
pub mod clock;
pub mod config;
pub mod context;
pub mod freshness;
pub mod inspector;
pub mod observer;
pub mod pipeline;
pub mod registry;
pub mod resource;
pub mod scope;
pub mod store;
pub mod stores;

pub use alerts::{Alert, AlertAction, AlertPatch, AlertSnapshot, AlertSpec, AlertStore, AlertVariant};
pub use backend::Backend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Scoping, StoreConfig, StoreConfigs};
pub use context::{AppContext, AppContextBuilder};
pub use freshness::EntryState;
pub use inspector::{InspectableStore, StoreInspector, StoreReport};
pub use observer::{Listeners, Subscription};
pub use pipeline::PipelineEvent;
pub use registry::{keys, SingletonRegistry};
pub use resource::{FnLoader, Resource, ResourceLoader};
pub use scope::AccountScope;
pub use store::{EnsureOptions, ResourceStore, ScopeDebugRecord, SetOptions};
pub use stores::{
    status_alert_variant, AccountsStore, AvatarsStore, DeveloperModeStore, Identified,
    StatusStore, UserStore, WorldsStore,
};
