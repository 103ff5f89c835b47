//! well-billing-service: apportions well electricity bills across irrigated
//! fields and their owners.

pub mod allocation;
pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
