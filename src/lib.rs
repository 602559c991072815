//! # bcstatus
//!
//! Chain status and account search backend for a CryptoNote explorer.
//!
//! The crate sits between a full node and request handlers. It serves a
//! cached view of the chain height and mempool, finds import payments by
//! payment id, and runs one background output search per watched account.
//!
//! ## Components
//!
//! - [`StatusFacade`]: the query API handlers call
//! - [`ChainCache`]: cached height and all-or-nothing mempool snapshot
//! - [`PaymentSearcher`]: mempool-then-blocks payment detection
//! - [`WorkerRegistry`] / [`SearchWorker`]: per-account scanning tasks
//! - [`UnlockEvaluator`]: height and timestamp unlock rules
//!
//! The node, output-ownership detection and address encoding are reached
//! through the [`NodeInterface`], [`OutputScanner`] and [`AddressEncoder`]
//! traits. [`RpcNodeClient`] implements the node side over a daemon's RPC.

pub mod chain;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod event;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod network;
pub mod node;
pub mod payment;
pub mod search;
pub mod service;
pub mod status;
pub mod types;
pub mod unlock;

pub use chain::ChainCache;
pub use codec::{DecodeError, MsgPackDecoder, TransactionDecoder};
pub use config::StatusConfig;
pub use crypto::{AddressEncoder, OutputScanner, OwnedOutput};
pub use error::{Error, Result};
pub use event::{StatusEvent, StatusEventsChannel};
pub use network::NetworkType;
pub use node::{NodeError, NodeInterface, RpcNodeClient, RpcNodeConfig, TransactionSubmitter};
pub use payment::PaymentSearcher;
pub use search::{Search, SearchWorker, WorkerRegistry};
pub use service::{RunningService, ShutdownHandle, StatusServiceBuilder};
pub use status::{StatusFacade, StatusFacadeBuilder};
pub use unlock::{Clock, SystemClock, UnlockEvaluator};
