use std::{path::Path, time::Duration};

use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Leave the destination alone if it already holds the whole file.
    pub skip_if_complete: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transferred {
    Written,
    AlreadyComplete,
}

/// Moves the bytes behind `url` into `destination`.
#[async_trait::async_trait]
pub trait Transfer: std::fmt::Debug + Send + Sync {
    async fn transfer(
        &self,
        url: &Url,
        destination: &Path,
        options: TransferOptions,
    ) -> anyhow::Result<Transferred>;
}
