//! # Weather Agent
//!
//! A command-line weather assistant that lets a language model answer
//! questions by calling weather tools.
//!
//! This library provides:
//! - A tool-calling dispatch loop that alternates between a model backend
//!   and a tool session until the model answers
//! - Model backends for Google Gemini, Anthropic Claude and OpenRouter
//! - Weather tools over the OpenWeatherMap API, guarded by an API-key gate
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weather_agent::{client::WeatherAgent, config::Config, llm, tools};
//!
//! let config = Config::from_env()?;
//! let session = tools::WeatherToolSession::new(
//!     tools::OpenWeatherClient::new(config.weather.api_key.clone(), None)?,
//!     Arc::new(config.auth.clone()),
//!     config.client_api_key.clone(),
//! );
//! let agent = WeatherAgent::connect(llm::create_backend(&config.backend)?, Box::new(session)).await?;
//! let run = agent.answer("What's the weather in Lisbon?").await;
//! ```

pub mod agent;
pub mod auth;
pub mod client;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;
