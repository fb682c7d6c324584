//! Tuner handles and tuner enumeration.

use std::fmt;
use std::future::Future;

use hdhr_core::error::Result;
use hdhr_core::transport::Transport;
use hdhr_transport::TcpTransport;

use crate::client::{Client, nul_str};
use crate::status::TunerDebug;

/// One tuner of a device, addressed by index.
///
/// Queries go through the owning [`Client`] under the tuner's
/// `/tunerN/` namespace.
pub struct Tuner<'a, T: Transport = TcpTransport> {
    client: &'a Client<T>,
    index: usize,
}

impl<'a, T: Transport> Tuner<'a, T> {
    pub(crate) fn new(client: &'a Client<T>, index: usize) -> Self {
        Tuner { client, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Query `/tunerN/<name>`.
    pub async fn query(&self, name: &str) -> Result<Vec<u8>> {
        self.client.query(&self.path(name)).await
    }

    /// Query and parse the tuner's `debug` status.
    pub async fn debug(&self) -> Result<TunerDebug> {
        let value = self.query("debug").await?;
        TunerDebug::parse(&nul_str(&value))
    }

    fn path(&self, name: &str) -> String {
        format!("/tuner{}/{}", self.index, name.trim_start_matches('/'))
    }
}

impl<T: Transport> Clone for Tuner<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Transport> Copy for Tuner<'_, T> {}

impl<T: Transport> fmt::Debug for Tuner<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuner").field("index", &self.index).finish()
    }
}

impl<T: Transport> Client<T> {
    /// Call `visit` for every tuner the device has, in index order.
    ///
    /// There is no up-front tuner count: each index is probed with a
    /// `debug` query until the device answers "unknown getset variable",
    /// which ends the walk successfully. Any other query error, or an
    /// error from `visit`, stops the walk and is returned.
    pub async fn for_each_tuner<'a, F, Fut>(&'a self, mut visit: F) -> Result<()>
    where
        F: FnMut(Tuner<'a, T>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        for index in 0.. {
            let tuner = self.tuner(index);

            if let Err(e) = tuner.debug().await {
                if e.is_not_exist() {
                    tracing::debug!(tuners = index, "Tuner enumeration complete");
                    return Ok(());
                }
                return Err(e);
            }

            visit(tuner).await?;
        }

        Ok(())
    }
}
