//! Streaming LLM client with incremental decoding and usage tracking.
//!
//! One request goes to one of several vendors; their streamed responses are
//! normalized into ordered text [`Fragment`]s plus a final [`Usage`] count.
//!
//! # Example
//! ```no_run
//! use howdoi::{Client, Fragment, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), howdoi::Error> {
//!     let client = Client::from_env()?;
//!     let message = Message::user("How do I undo the last git commit?");
//!
//!     let mut exchange = client
//!         .stream("sonnet", &message)
//!         .max_tokens(256)
//!         .send()
//!         .await?;
//!
//!     while let Some(fragment) = exchange.recv().await {
//!         match fragment {
//!             Fragment::Text(text) => print!("{text}"),
//!             Fragment::Done => break,
//!         }
//!     }
//!
//!     let (usage, elapsed) = exchange.finish().await?;
//!     eprintln!("\n{usage} in {elapsed:?}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod context;
pub mod cost;
pub mod dialect;
pub mod error;
pub mod models;
pub mod providers;
pub mod report;
pub mod sse;
pub mod stream;
pub mod types;

pub use client::{Client, ClientBuilder, Exchange, RequestBuilder};
pub use cost::{Cost, ModelPricing, PricingRegistry};
pub use error::Error;
pub use models::{ModelSpec, ProviderKind};
pub use stream::{FragmentStream, Step, UnitDecoder};
pub use types::*;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
