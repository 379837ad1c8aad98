pub mod analyzer;
pub mod config;
pub mod error;
pub mod grouping;
pub mod health;
pub mod humanloop;
pub mod mailer;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod schema;
pub mod summary;
