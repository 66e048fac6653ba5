//! docmd conversion service
//!
//! Accepts uploaded documents, images, audio and text over HTTP and returns
//! markdown produced by a document converter or a vision/transcription model.
//! The [`routing`] module decides which format family, prompt and strategy a
//! payload gets; everything else is plumbing around external collaborators.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routing;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use routing::{ContentRouter, RoutePlan, Strategy};
