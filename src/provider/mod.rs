//! Label provider: per-label query configuration
//!
//! - [`Attribute`]: constraint/return attribute, including the internal-id sentinel
//! - [`LabelProvider`]: read-only lookup contract consulted by the model and compiler
//! - [`ConfigProvider`]: resolution over a configuration map with parent inheritance

mod attribute;
pub mod config;
pub mod traits;

pub use attribute::{Attribute, INTERNAL_ID_COLUMN};
pub use config::{ConfigProvider, LabelConfig, ProviderConfig, QueryFilter, ResolvedLabel};
pub use traits::LabelProvider;
