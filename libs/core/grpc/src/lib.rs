//! # gRPC Client Library
//!
//! Channel creation with HTTP/2 tuning, dial retries with exponential backoff,
//! and a shared [`ClientPool`] that keeps one live connection per named
//! endpoint.
//!
//! ## Quick Start
//!
//! ### Single channel
//! ```ignore
//! use grpc_client::create_channel;
//!
//! let channel = create_channel("http://[::1]:50051").await?;
//! ```
//!
//! ### Pooled endpoints
//! ```ignore
//! use grpc_client::{ClientConfig, ClientPool};
//!
//! let pool = ClientPool::new();
//! let defaults = ClientConfig::new("", "");
//! let configs = ClientConfig::parse_list("mail-service=http://mail:50051", &defaults)?;
//! for failure in pool.warm_up(&configs).await {
//!     tracing::warn!(error = %failure, "Endpoint unavailable at startup");
//! }
//!
//! let handle = pool.acquire("mail-service").await?;
//! ```

pub mod channel;
pub mod error;
pub mod pool;
pub mod retry;

pub use channel::{ChannelConfig, create_channel, create_channel_with_config};
pub use error::{GrpcError, GrpcResult, PoolError, PoolResult};
pub use pool::{ChannelConnector, ClientConfig, ClientHandle, ClientPool, Connector};
pub use retry::{RetryConfig, retry_with_backoff};
