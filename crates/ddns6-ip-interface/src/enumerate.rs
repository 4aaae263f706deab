// Local interface enumeration

use ddns6_core::{Error, Result};
use std::net::IpAddr;

/// Lists every address configured on the host's interfaces
pub trait InterfaceEnumerator: Send + Sync {
    fn addresses(&self) -> Result<Vec<IpAddr>>;
}

/// Enumerates the host's interfaces through `if-addrs`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceEnumerator for SystemInterfaces {
    fn addresses(&self) -> Result<Vec<IpAddr>> {
        let interfaces = if_addrs::get_if_addrs()
            .map_err(|e| Error::discovery(format!("interface enumeration: {}", e)))?;

        Ok(interfaces.iter().map(|interface| interface.ip()).collect())
    }
}
