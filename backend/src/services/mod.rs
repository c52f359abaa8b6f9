//! Business logic services.

pub mod authorization_service;
pub mod block_sweeper;
pub mod condition_evaluator;
pub mod metrics_service;
pub mod signin_attempts;
pub mod token_service;
