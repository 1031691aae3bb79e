//! Device descriptor sent with login requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::Storage;

const DEVICE_ID_KEY: &str = "device_uuid";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub user_agent: String,
}

pub struct DeviceInfoProvider {
    storage: Arc<Storage>,
}

impl DeviceInfoProvider {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Stable per-install identifier, minted on first use.
    pub fn device_id(&self) -> String {
        if let Ok(Some(id)) = self.storage.get::<String>(DEVICE_ID_KEY) {
            return id;
        }
        let id = Uuid::new_v4().to_string();
        let _ = self.storage.put(DEVICE_ID_KEY, &id);
        id
    }

    pub fn user_agent(&self) -> String {
        format!(
            "Keyhold {} {}",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS
        )
    }

    pub fn info(&self) -> DeviceInfo {
        let name = sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string());
        DeviceInfo {
            device_id: self.device_id(),
            name,
            device_type: "1".to_string(),
            user_agent: self.user_agent(),
        }
    }
}
