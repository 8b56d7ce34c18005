//! ID document intake: upload, classification, field extraction and manual review.
//!
//! The server side is [`api::router`] over a [`processor::DocumentAnalyzer`].
//! The capture and review pages are driven by [`capture::CaptureSession`] and
//! [`review::ReviewSession`] through [`client::IntakeClient`].

pub mod api;
pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod image_store;
pub mod llm;
pub mod models;
pub mod processor;
pub mod review;
pub mod store;
