pub mod config;
pub mod error;
pub mod event_log;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod promise;
pub mod proximity;
pub mod recommendation;
pub mod registry;
pub mod search;
pub mod task;
pub mod traits;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, ResolutionRequest, ServerSelection};
pub use promise::{Promise, Resolver, Settlement};
pub use registry::{Catalog, ParserRegistry, SourceRegistry};
pub use task::{AggregateState, StatefulTaskContainer, TaskContainer, TaskHandle, WeakTaskContainer};
pub use traits::{MediaParser, Source};
