//! Label platform REST client for the directory labeler
//!
//! [`CentraClient`] wraps the platform's v3.0 API: authentication, agent
//! lookup and label membership. [`CentraLabelStore`] adapts it to
//! [`labeler_core::LabelStore`], translating HTTP failures into the
//! store's error kinds (401 expires the session, 404 means no asset, the
//! rest are retryable rejections).

pub mod client;
pub mod error;
pub mod store;
pub mod types;

pub use client::{CentraClient, CentraConfig};
pub use error::{Error, Result};
pub use store::CentraLabelStore;
