//! Natural-language browser automation: requests become validated command
//! lists that run against one persistent browser session.

pub mod analyzer;
pub mod brain;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod face;
pub mod hands;
pub mod intent;
pub mod interpreter;
pub mod logging;
pub mod page;
pub mod reply;
pub mod repair;
pub mod resolver;
pub mod rules;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;
