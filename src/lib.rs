//! Generation gateway - normalizes calls to loosely-typed generative AI APIs
//!
//! Validates an inbound prompt request, makes one call to the configured
//! text or image provider, and turns whatever comes back into a stable
//! result or a classified error.

pub mod ai;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod prompts;
pub mod validate;

pub use error::{Error, Result};
pub use gateway::Gateway;
