//! Shared registry of outbound connections, keyed by logical endpoint name.
//!
//! Every job that talks to a remote service goes through the same
//! [`ClientPool`]. The pool guarantees at most one live connection per key:
//! concurrent callers asking for the same key wait on that key's dial lock
//! and then observe the handle the first caller created. Keys never contend
//! with each other; the map itself is only write-locked long enough to insert
//! or remove an entry.
//!
//! ```ignore
//! use grpc_client::{ClientConfig, ClientPool};
//!
//! let pool = ClientPool::new();
//! let handle = pool
//!     .create_or_reuse(&ClientConfig::new("mail-service", "http://mail:50051"))
//!     .await?;
//! let channel = handle.connection().clone();
//! ```

use crate::channel::{ChannelConfig, create_channel_with_config};
use crate::error::{GrpcError, GrpcResult, PoolError, PoolResult};
use crate::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tonic::transport::Channel;
use tracing::{debug, info, warn};

/// Dial settings for one named endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
  /// Pool key
  pub name: String,
  /// Endpoint URI, e.g. `http://mail-service:50051`
  pub address: String,
  /// Bound on each individual dial attempt
  pub dial_timeout: Duration,
  /// Dial retries after the first attempt
  pub max_retries: u32,
  /// HTTP/2 keep-alive ping interval
  pub keepalive: Duration,
  /// Delay before the first retry; doubles per attempt
  pub retry_delay: Duration,
}

impl ClientConfig {
  pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      address: normalize_address(&address.into()),
      dial_timeout: Duration::from_secs(5),
      max_retries: 3,
      keepalive: Duration::from_secs(10),
      retry_delay: Duration::from_millis(100),
    }
  }

  pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
    self.dial_timeout = timeout;
    self
  }

  pub fn with_max_retries(mut self, retries: u32) -> Self {
    self.max_retries = retries;
    self
  }

  pub fn with_keepalive(mut self, interval: Duration) -> Self {
    self.keepalive = interval;
    self
  }

  pub fn with_retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = delay;
    self
  }

  /// Channel settings derived from this endpoint's dial options
  pub fn channel_config(&self) -> ChannelConfig {
    ChannelConfig::new()
      .with_connect_timeout(self.dial_timeout)
      .with_keep_alive_interval(self.keepalive)
  }

  fn retry_config(&self) -> RetryConfig {
    RetryConfig::new()
      .with_max_retries(self.max_retries)
      .with_initial_delay(self.retry_delay.as_millis() as u64)
  }

  /// Parse `name=address,name=address` into configs that share `defaults`'
  /// timeouts and retry budget.
  pub fn parse_list(spec: &str, defaults: &ClientConfig) -> GrpcResult<Vec<ClientConfig>> {
    let mut configs: Vec<ClientConfig> = Vec::new();

    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
      let (name, address) = entry
        .split_once('=')
        .map(|(n, a)| (n.trim(), a.trim()))
        .filter(|(n, a)| !n.is_empty() && !a.is_empty())
        .ok_or_else(|| {
          GrpcError::InvalidConfig(format!("expected name=address, got '{entry}'"))
        })?;

      if configs.iter().any(|c| c.name == name) {
        return Err(GrpcError::InvalidConfig(format!("duplicate client '{name}'")));
      }

      configs.push(ClientConfig {
        name: name.to_string(),
        address: normalize_address(address),
        ..defaults.clone()
      });
    }

    Ok(configs)
  }
}

fn normalize_address(address: &str) -> String {
  if address.contains("://") {
    address.to_string()
  } else {
    format!("http://{address}")
  }
}

/// Opens and releases the connections the pool hands out.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
  type Connection: Clone + Send + Sync + 'static;

  /// One dial attempt. The pool applies the timeout and retries.
  async fn connect(&self, config: &ClientConfig) -> GrpcResult<Self::Connection>;

  /// Release a connection that is leaving the pool.
  async fn close(&self, _key: &str, _connection: Self::Connection) -> GrpcResult<()> {
    Ok(())
  }
}

/// Dials tonic channels
#[derive(Debug, Clone, Default)]
pub struct ChannelConnector;

#[async_trait]
impl Connector for ChannelConnector {
  type Connection = Channel;

  async fn connect(&self, config: &ClientConfig) -> GrpcResult<Channel> {
    create_channel_with_config(config.address.clone(), config.channel_config()).await
  }

  async fn close(&self, key: &str, connection: Channel) -> GrpcResult<()> {
    // tonic tears the connection down once the last clone is dropped
    drop(connection);
    debug!(target: "grpc_client", client = %key, "Released channel");
    Ok(())
  }
}

/// A pooled connection plus its liveness flag.
///
/// Clones share the flag, so marking one clone unavailable tells the pool to
/// replace the entry on the next `create_or_reuse`/`acquire`.
#[derive(Debug, Clone)]
pub struct ClientHandle<C> {
  name: Arc<str>,
  connection: C,
  live: Arc<AtomicBool>,
}

impl<C> ClientHandle<C> {
  fn new(name: &str, connection: C) -> Self {
    Self {
      name: Arc::from(name),
      connection,
      live: Arc::new(AtomicBool::new(true)),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn connection(&self) -> &C {
    &self.connection
  }

  pub fn is_live(&self) -> bool {
    self.live.load(Ordering::Acquire)
  }

  /// Flag the connection as broken, e.g. after an `Unavailable` status.
  pub fn mark_unavailable(&self) {
    if self.live.swap(false, Ordering::AcqRel) {
      warn!(target: "grpc_client", client = %self.name, "Client marked unavailable");
    }
  }

  /// Whether both handles refer to the same pooled connection
  pub fn same_as(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.live, &other.live)
  }
}

struct SlotState<C> {
  config: ClientConfig,
  handle: Option<ClientHandle<C>>,
  closed: bool,
}

struct Slot<C> {
  dial_lock: tokio::sync::Mutex<()>,
  state: RwLock<SlotState<C>>,
}

impl<C: Clone> Slot<C> {
  fn new(config: ClientConfig) -> Self {
    Self {
      dial_lock: tokio::sync::Mutex::new(()),
      state: RwLock::new(SlotState {
        config,
        handle: None,
        closed: false,
      }),
    }
  }

  fn live_handle(&self) -> Option<ClientHandle<C>> {
    read(&self.state)
      .handle
      .as_ref()
      .filter(|h| h.is_live())
      .cloned()
  }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
  lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
  lock.write().unwrap_or_else(PoisonError::into_inner)
}

type SlotMap<C> = HashMap<String, Arc<Slot<C>>>;

/// Thread-safe pool of outbound connections
pub struct ClientPool<K: Connector = ChannelConnector> {
  connector: K,
  slots: RwLock<SlotMap<K::Connection>>,
}

impl ClientPool<ChannelConnector> {
  pub fn new() -> Self {
    Self::with_connector(ChannelConnector)
  }
}

impl Default for ClientPool<ChannelConnector> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: Connector> ClientPool<K> {
  pub fn with_connector(connector: K) -> Self {
    Self {
      connector,
      slots: RwLock::new(HashMap::new()),
    }
  }

  fn slot(&self, key: &str) -> Option<Arc<Slot<K::Connection>>> {
    read(&self.slots).get(key).cloned()
  }

  fn slot_or_insert(&self, config: &ClientConfig) -> Arc<Slot<K::Connection>> {
    if let Some(slot) = self.slot(&config.name) {
      return slot;
    }
    write(&self.slots)
      .entry(config.name.clone())
      .or_insert_with(|| Arc::new(Slot::new(config.clone())))
      .clone()
  }

  /// Return the live connection for `config.name`, dialing if there is none.
  ///
  /// A dead entry is closed and replaced. Concurrent calls for the same key
  /// perform at most one dial; calls for other keys proceed independently.
  /// A failed dial is not remembered, so the next call dials again.
  pub async fn create_or_reuse(
    &self,
    config: &ClientConfig,
  ) -> PoolResult<ClientHandle<K::Connection>> {
    loop {
      let slot = self.slot_or_insert(config);
      let _dial_guard = slot.dial_lock.lock().await;

      let stale = {
        let mut state = write(&slot.state);
        if state.closed {
          // closed while we waited; start over with a fresh entry
          continue;
        }
        if let Some(handle) = state.handle.as_ref().filter(|h| h.is_live()) {
          return Ok(handle.clone());
        }
        state.config = config.clone();
        state.handle.take()
      };

      if let Some(stale) = stale {
        info!(target: "grpc_client", client = %config.name, "Replacing unavailable client");
        if let Err(e) = self.connector.close(&config.name, stale.connection).await {
          warn!(target: "grpc_client", client = %config.name, error = %e, "Failed to close stale client");
        }
      }

      return match self.dial(config).await {
        Ok(connection) => {
          let handle = ClientHandle::new(&config.name, connection);
          write(&slot.state).handle = Some(handle.clone());
          info!(
            target: "grpc_client",
            client = %config.name,
            addr = %config.address,
            "Client connected"
          );
          Ok(handle)
        }
        Err(source) => Err(PoolError::DialFailed {
          key: config.name.clone(),
          source,
        }),
      };
    }
  }

  async fn dial(&self, config: &ClientConfig) -> GrpcResult<K::Connection> {
    let timeout = config.dial_timeout;

    retry_with_backoff(
      || async move {
        match tokio::time::timeout(timeout, self.connector.connect(config)).await {
          Ok(result) => result,
          Err(_) => Err(GrpcError::ConnectionTimeout(timeout)),
        }
      },
      config.retry_config(),
      GrpcError::is_retryable,
    )
    .await
  }

  /// Non-blocking lookup of a live handle. Never dials; `None` for keys that
  /// were never created or whose connection is down.
  pub fn get(&self, key: &str) -> Option<ClientHandle<K::Connection>> {
    self.slot(key)?.live_handle()
  }

  /// Like [`get`](Self::get), but re-dials a registered endpoint whose
  /// connection is down using its stored config.
  pub async fn acquire(&self, key: &str) -> PoolResult<ClientHandle<K::Connection>> {
    let slot = self
      .slot(key)
      .ok_or_else(|| PoolError::EndpointUnconfigured(key.to_string()))?;

    if let Some(handle) = slot.live_handle() {
      return Ok(handle);
    }

    let config = read(&slot.state).config.clone();
    self.create_or_reuse(&config).await
  }

  /// Register and dial every config concurrently. Failures are returned, not
  /// fatal: the entries stay registered so `acquire` can retry them later.
  pub async fn warm_up(&self, configs: &[ClientConfig]) -> Vec<PoolError> {
    let results = futures::future::join_all(configs.iter().map(|c| self.create_or_reuse(c))).await;

    results.into_iter().filter_map(Result::err).collect()
  }

  async fn close_slot(&self, key: &str, slot: &Slot<K::Connection>) -> GrpcResult<()> {
    let _dial_guard = slot.dial_lock.lock().await;

    let handle = {
      let mut state = write(&slot.state);
      state.closed = true;
      state.handle.take()
    };

    match handle {
      Some(handle) => {
        handle.live.store(false, Ordering::Release);
        self.connector.close(key, handle.connection).await
      }
      None => Ok(()),
    }
  }

  /// Remove and release one entry. Closing an unknown key is a no-op.
  pub async fn close(&self, key: &str) -> PoolResult<()> {
    let Some(slot) = write(&self.slots).remove(key) else {
      return Ok(());
    };

    self
      .close_slot(key, &slot)
      .await
      .map_err(|e| PoolError::CloseFailed(vec![(key.to_string(), e)]))?;

    debug!(target: "grpc_client", client = %key, "Client closed");
    Ok(())
  }

  /// Remove and release every entry. Individual failures are collected;
  /// the pool is empty afterwards either way.
  pub async fn close_all(&self) -> PoolResult<()> {
    let slots: Vec<(String, Arc<Slot<K::Connection>>)> = write(&self.slots).drain().collect();
    let mut failures = Vec::new();

    for (key, slot) in slots {
      if let Err(e) = self.close_slot(&key, &slot).await {
        warn!(target: "grpc_client", client = %key, error = %e, "Failed to close client");
        failures.push((key, e));
      }
    }

    if failures.is_empty() {
      Ok(())
    } else {
      Err(PoolError::CloseFailed(failures))
    }
  }

  /// Point-in-time liveness per registered key
  pub fn health(&self) -> HashMap<String, bool> {
    read(&self.slots)
      .iter()
      .map(|(key, slot)| (key.clone(), slot.live_handle().is_some()))
      .collect()
  }

  /// Registered keys, sorted
  pub fn list(&self) -> Vec<String> {
    let mut keys: Vec<String> = read(&self.slots).keys().cloned().collect();
    keys.sort();
    keys
  }
}
